use std::io::Write;

use crate::stereo_pipeline::common::error::Result;
use crate::stereo_pipeline::disparity::DisparityMap;

pub trait DisparityWriter {
    fn write_disparity(&self, map: &DisparityMap, output: &mut dyn Write) -> Result<()>;
}

impl<W: DisparityWriter + ?Sized> DisparityWriter for Box<W> {
    fn write_disparity(&self, map: &DisparityMap, output: &mut dyn Write) -> Result<()> {
        (**self).write_disparity(map, output)
    }
}
