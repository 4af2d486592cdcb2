use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use nescaster_core::{FRAME_SIZE, NES_HEIGHT, NES_WIDTH};

/// Writes one 256x240 RGBA frame as a PNG.
pub fn write_png(path: &Path, rgba: &[u8]) -> io::Result<()> {
    if rgba.len() != FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("expected {FRAME_SIZE} bytes of RGBA, got {}", rgba.len()),
        ));
    }

    let file = File::create(path)?;
    let w = BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, NES_WIDTH as u32, NES_HEIGHT as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(io::Error::other)?;
    writer.write_image_data(rgba).map_err(io::Error::other)?;
    writer.finish().map_err(io::Error::other)
}
