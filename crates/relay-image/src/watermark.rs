//! Watermark rendering
//!
//! Two stacked text layers: a black shadow offset by (+2, +2), then a white
//! foreground, both translucent. Output is always JPEG at quality 95. The
//! face comes from whatever bold sans-serif the host system provides; with
//! no face available, rendering reports [`ImageError::NoFont`] and the
//! caller keeps the original image.

use std::io::Cursor;

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size, Blend};

use crate::error::ImageError;

/// Well-known bold sans-serif locations, tried in order
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 80]);
const FOREGROUND: Rgba<u8> = Rgba([255, 255, 255, 100]);

pub(crate) struct WatermarkRenderer {
    font: Option<FontVec>,
}

impl WatermarkRenderer {
    /// Load the best available face from the host system
    pub(crate) fn discover() -> Self {
        for path in FONT_CANDIDATES {
            let Ok(bytes) = std::fs::read(path) else {
                continue;
            };
            match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    tracing::info!(path, "watermark font loaded");
                    return Self { font: Some(font) };
                }
                Err(err) => {
                    tracing::warn!(path, error = %err, "skipping unreadable font");
                }
            }
        }
        tracing::warn!("no watermark font found; watermarking disabled");
        Self { font: None }
    }

    #[cfg(test)]
    pub(crate) fn without_font() -> Self {
        Self { font: None }
    }

    pub(crate) fn is_available(&self) -> bool {
        self.font.is_some()
    }

    /// Render `text` onto the image in `bytes`, returning new JPEG bytes
    pub(crate) fn render(&self, bytes: &[u8], text: &str) -> Result<Vec<u8>, ImageError> {
        let Some(font) = &self.font else {
            return Err(ImageError::NoFont);
        };

        let img = image::load_from_memory(bytes).map_err(ImageError::Decode)?;
        let (width, height) = (img.width(), img.height());

        let size = (0.07 * width as f32).round().max(12.0);
        let scale = PxScale::from(size);

        let (text_w, _) = text_size(scale, font, text);
        let x = width.saturating_sub(text_w as u32) / 2;

        // Vertical placement: baseline at 60% of image height.
        let ascent = font.as_scaled(scale).ascent();
        let baseline = 0.6 * height as f32;
        let y = (baseline - ascent).max(0.0) as i32;

        let mut canvas = Blend(img.to_rgba8());
        draw_text_mut(&mut canvas, SHADOW, x as i32 + 2, y + 2, scale, font, text);
        draw_text_mut(&mut canvas, FOREGROUND, x as i32, y, scale, font, text);

        encode_jpeg(canvas.0)
    }
}

fn encode_jpeg(canvas: RgbaImage) -> Result<Vec<u8>, ImageError> {
    let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), 95);
    rgb.write_with_encoder(encoder).map_err(ImageError::Encode)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgb([40, 80, 120]));
        let mut buf = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buf);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn test_no_font_reports_no_font() {
        let renderer = WatermarkRenderer::without_font();
        assert!(!renderer.is_available());
        assert!(matches!(
            renderer.render(&png_bytes(100, 100), "PREMIUM"),
            Err(ImageError::NoFont)
        ));
    }

    #[test]
    fn test_render_when_font_present() {
        let renderer = WatermarkRenderer::discover();
        if !renderer.is_available() {
            // Host has no fonts installed; the NoFont path is covered above.
            return;
        }

        let out = renderer.render(&png_bytes(300, 200), "PREMIUM").unwrap();
        // Output is a decodable JPEG of the same dimensions
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 200));
        assert_eq!(
            image::guess_format(&out).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_render_rejects_garbage() {
        let renderer = WatermarkRenderer::discover();
        if !renderer.is_available() {
            return;
        }
        assert!(matches!(
            renderer.render(b"not an image", "X"),
            Err(ImageError::Decode(_))
        ));
    }
}
