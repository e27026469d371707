//! Internal utility functions.
//!
//! Pixel-data copying, luma conversion, frame naming and JPEG output shared
//! by the segmenter, the fingerprinting code and the card detector.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use ffmpeg_next::{Rational, frame::Video as VideoFrame};
use image::{DynamicImage, GrayImage, RgbImage, codecs::jpeg::JpegEncoder};

use crate::error::SceneCardError;

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer.
///
/// `bytes_per_pixel` is 3 for RGB24.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// Rescale a PTS value from stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// ITU-R 601 luma, `(299 R + 587 G + 114 B) / 1000`.
pub(crate) fn luma_601(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000;
        image::Luma([luma as u8])
    })
}

/// File name for the scene frame with 1-based sequence `index`.
pub fn frame_file_name(index: u64) -> String {
    format!("frame_{index:04}.jpg")
}

/// Recover the sequence index from a `frame_NNNN.*` file name.
pub fn sequence_index(path: &Path) -> Option<u64> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("frame_")?
        .parse()
        .ok()
}

/// Load a frame image, reporting an absent file as
/// [`SceneCardError::MissingInput`] and anything else as
/// [`SceneCardError::ImageRead`].
pub(crate) fn open_frame(path: &Path) -> Result<DynamicImage, SceneCardError> {
    if !path.exists() {
        return Err(SceneCardError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    image::open(path).map_err(|error| SceneCardError::image_read(path, error))
}

/// Encode `image` as a JPEG at `path` with the given quality (1–100).
pub(crate) fn save_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<(), SceneCardError> {
    let mut writer = BufWriter::new(File::create(path)?);
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
    image.write_with_encoder(encoder)?;
    writer.flush()?;
    Ok(())
}
