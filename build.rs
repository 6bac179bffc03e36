use std::{env, path::PathBuf, process::Command};

const KERNEL: &str = "src/cuda/kernels/stereo_bm.cu";

fn find_nvcc() -> Option<PathBuf> {
    if let Ok(cuda) = env::var("CUDA_PATH") {
        let candidate = PathBuf::from(cuda).join("bin").join("nvcc");
        if candidate.exists() {
            return Some(candidate);
        }
    }
    let default = PathBuf::from("/usr/local/cuda/bin/nvcc");
    if default.exists() {
        return Some(default);
    }
    // Fall back to whatever is on PATH.
    Command::new("nvcc")
        .arg("--version")
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|_| PathBuf::from("nvcc"))
}

fn main() {
    println!("cargo::rustc-check-cfg=cfg(stereo_ptx)");
    println!("cargo:rerun-if-changed=src/cuda");
    println!("cargo:rerun-if-env-changed=CUDA_PATH");

    let Some(nvcc) = find_nvcc() else {
        println!("cargo:warning=nvcc not found, the block matching kernel will be compiled with NVRTC at runtime");
        return;
    };

    let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from) else {
        println!("cargo:warning=OUT_DIR not set, skipping PTX build");
        return;
    };
    let ptx_file = out_dir.join("stereo_bm.ptx");

    let status = Command::new(&nvcc)
        .arg("-ptx")
        .arg("-O3")
        .arg("-o")
        .arg(&ptx_file)
        .arg(KERNEL)
        .status();

    match status {
        Ok(status) if status.success() => println!("cargo:rustc-cfg=stereo_ptx"),
        Ok(status) => println!("cargo:warning=nvcc failed on {KERNEL} ({status}), using NVRTC at runtime"),
        Err(e) => println!("cargo:warning=could not run {}: {e}, using NVRTC at runtime", nvcc.display()),
    }
}
