//! In-place finishing of a freshly captured photo: optional rotation and a
//! timestamp label in the bottom-right corner.

use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
};

use ab_glyph::{FontVec, PxScale};
use image::{codecs::jpeg::JpegEncoder, imageops, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_text_mut, text_size},
    geometric_transformations::{rotate_about_center, Interpolation},
};
use tracing::{debug, warn};

use super::CaptureError;

// ---

const LABEL_MARGIN: i32 = 10;
const LABEL_MIN_SIZE: u32 = 20;
const OUTLINE: Rgb<u8> = Rgb([0, 0, 0]);
const FILL: Rgb<u8> = Rgb([255, 255, 255]);

/// Monospace fonts tried in order for the label.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "/System/Library/Fonts/Monaco.ttf",
];

/// Rotate (when `rotation` is non-zero) and label the photo at `path`.
///
/// A missing font leaves the photo unlabeled; that is logged, not an error.
/// Errors are returned only when the photo cannot be decoded or rewritten,
/// in which case the file on disk is left as captured.
pub fn finalize(path: &Path, rotation: i32, quality: u8, label: &str) -> Result<(), CaptureError> {
    // ---
    let mut image = image::open(path)?.to_rgb8();

    if rotation.rem_euclid(360) != 0 {
        image = rotate_expanded(&image, rotation);
        debug!(rotation, "Rotated photo");
    }

    match load_label_font() {
        Some(font) => draw_label(&mut image, &font, label),
        None => warn!("No label font found, photo left without timestamp"),
    }

    save_jpeg(path, &image, quality)
}

/// Rotate counter-clockwise by `degrees`, growing the canvas so no corner
/// is cropped. Uncovered areas are black.
pub fn rotate_expanded(image: &RgbImage, degrees: i32) -> RgbImage {
    // ---
    match degrees.rem_euclid(360) {
        0 => image.clone(),
        90 => imageops::rotate270(image),
        180 => imageops::rotate180(image),
        270 => imageops::rotate90(image),
        deg => {
            let theta = (deg as f32).to_radians();
            let (sin, cos) = theta.sin_cos();
            let (w, h) = (image.width() as f32, image.height() as f32);
            let new_w = (w * cos.abs() + h * sin.abs()).ceil() as u32;
            let new_h = (w * sin.abs() + h * cos.abs()).ceil() as u32;

            let mut canvas = RgbImage::new(new_w.max(1), new_h.max(1));
            let x = (i64::from(canvas.width()) - i64::from(image.width())) / 2;
            let y = (i64::from(canvas.height()) - i64::from(image.height())) / 2;
            imageops::overlay(&mut canvas, image, x, y);

            // imageproc turns clockwise for positive angles.
            rotate_about_center(&canvas, -theta, Interpolation::Bilinear, OUTLINE)
        }
    }
}

fn load_label_font() -> Option<FontVec> {
    // ---
    FONT_CANDIDATES.iter().find_map(|candidate| {
        let bytes = fs::read(candidate).ok()?;
        FontVec::try_from_vec(bytes).ok()
    })
}

/// Draw `label` bottom-right, white over a one-pixel black outline.
pub fn draw_label(image: &mut RgbImage, font: &FontVec, label: &str) {
    // ---
    let scale = PxScale::from((image.width() / 60).max(LABEL_MIN_SIZE) as f32);
    let (text_w, text_h) = text_size(scale, font, label);
    let x = image.width() as i32 - text_w as i32 - LABEL_MARGIN;
    let y = image.height() as i32 - text_h as i32 - LABEL_MARGIN;

    for dx in -1..=1 {
        for dy in -1..=1 {
            if dx != 0 || dy != 0 {
                draw_text_mut(image, OUTLINE, x + dx, y + dy, scale, font, label);
            }
        }
    }
    draw_text_mut(image, FILL, x, y, scale, font, label);
}

/// Re-encode to a sibling temp file, then swap it in.
fn save_jpeg(path: &Path, image: &RgbImage, quality: u8) -> Result<(), CaptureError> {
    // ---
    let tmp = path.with_extension("jpg.tmp");
    let written = (|| -> Result<(), CaptureError> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        JpegEncoder::new_with_quality(&mut writer, quality).encode_image(image)?;
        Ok(())
    })();
    match written {
        Ok(()) => {
            fs::rename(&tmp, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}
