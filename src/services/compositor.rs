//! Background compositing.
//!
//! Pastes segmented people (RGBA cut-outs) onto a background photo. The
//! person is scaled by a ratio of its own size, bottom-aligned by default,
//! and alpha-blended into the region it covers.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage, RgbaImage};

use crate::Result;

/// Smallest scale a person is ever drawn at.
const MIN_RATIO: f64 = 0.1;

/// Where and how large a person is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Scale relative to the person image's own size.
    pub ratio: f64,
    /// Top-left corner as `(row, col)`. `None` centres the person at a quarter
    /// of the background width, standing on the bottom edge.
    pub pos: Option<(u32, u32)>,
    /// Replace the row of `pos` so the person stands on the bottom edge.
    pub align_bottom: bool,
}

/// First person of a pair: half size, towards the right.
pub const FIRST_PERSON: Placement = Placement {
    ratio: 0.5,
    pos: Some((50, 230)),
    align_bottom: true,
};

/// Second person of a pair: larger, towards the left, drawn on top.
pub const SECOND_PERSON: Placement = Placement {
    ratio: 0.7,
    pos: Some((50, 80)),
    align_bottom: true,
};

/// Clamp a requested ratio so the scaled person fits the background height.
fn clamp_ratio(ratio: f64, person_height: u32, background_height: u32) -> f64 {
    let max_ratio = background_height as f64 / person_height as f64;
    let mut ratio = ratio;

    if ratio > max_ratio {
        let rounded = (max_ratio * 10.0).round() / 10.0;
        tracing::warn!(
            requested = ratio,
            used = rounded,
            "Ratio too large for background, using maximum"
        );
        ratio = rounded;
    }
    if ratio < MIN_RATIO {
        tracing::warn!(requested = ratio, "Ratio below minimum, using {}", MIN_RATIO);
        ratio = MIN_RATIO;
    }

    ratio
}

/// Blend `person` onto a copy of `background` according to `placement`.
pub fn blend_onto(background: &RgbImage, person: &RgbaImage, placement: Placement) -> RgbImage {
    let mut out = background.clone();
    let (wf, hf) = person.dimensions();
    let (wb, hb) = background.dimensions();

    if wf == 0 || hf == 0 || wb == 0 || hb == 0 {
        return out;
    }

    let ratio = clamp_ratio(placement.ratio, hf, hb);
    let scaled_h = (ratio * hf as f64) as i64;
    let scaled_w = (ratio * wf as f64) as i64;
    let bottom_row = (hb as i64 - scaled_h).max(0);

    let (row, col) = match placement.pos {
        None => (bottom_row, (wb / 4) as i64),
        Some((_, col)) if placement.align_bottom => (bottom_row, col as i64),
        Some((row, col)) => (row as i64, col as i64),
    };

    // Region of interest, clipped to the background.
    let roi_h = scaled_h.min(hb as i64 - row).max(0) as u32;
    let roi_w = scaled_w.min(wb as i64 - col).max(0) as u32;
    if roi_h == 0 || roi_w == 0 {
        return out;
    }

    let resized = imageops::resize(person, roi_w, roi_h, FilterType::CatmullRom);
    let (row, col) = (row as u32, col as u32);

    for (x, y, fg) in resized.enumerate_pixels() {
        let bg = out.get_pixel_mut(col + x, row + y);
        let alpha = fg[3] as f64 / 255.0;
        for c in 0..3 {
            let blended = alpha * fg[c] as f64 + (1.0 - alpha) * bg[c] as f64;
            bg[c] = blended as u8;
        }
    }

    out
}

/// Composite two people onto a background, the second drawn over the first.
pub fn composite_pair(background: &RgbImage, first: &RgbaImage, second: &RgbaImage) -> RgbImage {
    let with_first = blend_onto(background, first, FIRST_PERSON);
    blend_onto(&with_first, second, SECOND_PERSON)
}

/// Encode an RGB image as PNG bytes.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
