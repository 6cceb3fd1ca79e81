use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage, RgbaImage};

use crate::capture::domain::image_writer::ImageWriter;
use crate::shared::constants::DEFAULT_JPEG_QUALITY;
use crate::shared::frame::{Frame, Rotation};

/// Writes frames to disk with the `image` crate.
///
/// The frame is rotated upright first. `.jpg`/`.jpeg` paths are encoded at
/// the configured quality; any other extension uses the format `image`
/// infers from it.
pub struct ImageFileWriter {
    jpeg_quality: u8,
}

impl ImageFileWriter {
    pub fn new() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let img = upright(to_image(frame)?, frame.rotation());

        if let Err(e) = self.encode(path, img) {
            // A truncated capture must not be left behind.
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
            return Err(e);
        }
        Ok(())
    }
}

impl ImageFileWriter {
    fn encode(&self, path: &Path, img: DynamicImage) -> Result<(), Box<dyn std::error::Error>> {
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg"));

        if is_jpeg {
            let mut out = BufWriter::new(File::create(path)?);
            let encoder = JpegEncoder::new_with_quality(&mut out, self.jpeg_quality);
            // JPEG has no alpha channel.
            img.into_rgb8().write_with_encoder(encoder)?;
            out.flush()?;
        } else {
            img.save(path)?;
        }
        Ok(())
    }
}

fn to_image(frame: &Frame) -> Result<DynamicImage, Box<dyn std::error::Error>> {
    let (w, h) = (frame.width(), frame.height());
    let data = frame.data().to_vec();
    match frame.channels() {
        3 => RgbImage::from_raw(w, h, data)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "Failed to create image from frame data".into()),
        4 => RgbaImage::from_raw(w, h, data)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| "Failed to create image from frame data".into()),
        n => Err(format!("Unsupported channel count: {n}").into()),
    }
}

fn upright(img: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::Deg0 => img,
        Rotation::Deg90 => img.rotate90(),
        Rotation::Deg180 => img.rotate180(),
        Rotation::Deg270 => img.rotate270(),
    }
}
