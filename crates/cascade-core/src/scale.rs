//! Scale enumeration and per-scale window geometry.
//!
//! Scales start at 1.0 and grow geometrically by `DetectParams::scale_factor`
//! (in `f32`, so the sequence is reproducible bit for bit). A scale is counted
//! while the scaled canonical window stays below `image - MIN_SCALE_MARGIN` on
//! both axes. Each admissible scale yields a [`ScanWindow`].

use crate::{DetectParams, MIN_SCALE_MARGIN};

/// Inset rectangle used to estimate window mean and spread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EqualizedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl EqualizedRect {
    fn at_scale(window: (u32, u32), scale: f32) -> Self {
        let inset = scale.round() as u32;
        Self {
            x: inset,
            y: inset,
            width: ((window.0 - 2) as f32 * scale).round() as u32,
            height: ((window.1 - 2) as f32 * scale).round() as u32,
        }
    }

    #[inline]
    pub fn area(&self) -> u32 {
        self.width * self.height
    }
}

/// Geometry of the sliding window at one scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanWindow {
    /// Position of this scale in the full (unfiltered) scale sequence.
    pub index: usize,
    pub scale: f32,
    /// Scaled window width in pixels.
    pub width: u32,
    /// Scaled window height in pixels.
    pub height: u32,
    /// Grid step in pixels on both axes, `max(2, scale)`.
    pub step: f64,
    pub equalized: EqualizedRect,
    /// Grid columns (window origins per row).
    pub cols: usize,
    /// Grid rows.
    pub rows: usize,
}

impl ScanWindow {
    /// Pixel origin of grid cell `(col, row)`.
    #[inline]
    pub fn position(&self, col: usize, row: usize) -> (usize, usize) {
        (
            (col as f64 * self.step).round() as usize,
            (row as f64 * self.step).round() as usize,
        )
    }

    /// Windows on the step grid at this scale.
    #[inline]
    pub fn grid_len(&self) -> usize {
        self.cols * self.rows
    }
}

/// Number of scales evaluated for `window` on an image of `image` pixels.
///
/// Returns 0 for a non-growing factor, which would never terminate.
pub fn scale_count(window: (u32, u32), image: (usize, usize), factor: f32) -> usize {
    if !(factor > 1.0) {
        return 0;
    }
    let limit_w = (image.0 as i64 - MIN_SCALE_MARGIN as i64) as f32;
    let limit_h = (image.1 as i64 - MIN_SCALE_MARGIN as i64) as f32;

    let mut count = 0;
    let mut scale = 1.0f32;
    while scale * (window.0 as f32) < limit_w && scale * (window.1 as f32) < limit_h {
        count += 1;
        scale *= factor;
    }
    count
}

/// Iterator over the admissible scan windows, smallest scale first.
#[derive(Clone, Debug)]
pub struct ScanWindows {
    window: (u32, u32),
    image: (usize, usize),
    min_size: (u32, u32),
    max_size: (u32, u32),
    factor: f32,
    scale: f32,
    index: usize,
    count: usize,
}

/// Enumerate the scan windows for `window` on an `image`-sized input.
pub fn scan_windows(window: (u32, u32), image: (usize, usize), params: &DetectParams) -> ScanWindows {
    ScanWindows {
        window,
        image,
        min_size: params.min_size,
        max_size: params.max_size,
        factor: params.scale_factor,
        scale: 1.0,
        index: 0,
        count: scale_count(window, image, params.scale_factor),
    }
}

impl Iterator for ScanWindows {
    type Item = ScanWindow;

    fn next(&mut self) -> Option<ScanWindow> {
        while self.index < self.count {
            let index = self.index;
            let scale = self.scale;
            self.index += 1;
            self.scale *= self.factor;

            let width = (self.window.0 as f32 * scale).round() as u32;
            let height = (self.window.1 as f32 * scale).round() as u32;

            if width < self.min_size.0 || height < self.min_size.1 {
                continue;
            }
            if self.max_size.0 != 0 && width > self.max_size.0 {
                continue;
            }
            if self.max_size.1 != 0 && height > self.max_size.1 {
                continue;
            }
            // windows only grow from here on
            if width as usize > self.image.0 || height as usize > self.image.1 {
                self.index = self.count;
                return None;
            }

            let step = f64::max(2.0, scale as f64);
            let cols = ((self.image.0 - width as usize) as f64 / step).round_ties_even() as usize;
            let rows = ((self.image.1 - height as usize) as f64 / step).round_ties_even() as usize;

            return Some(ScanWindow {
                index,
                scale,
                width,
                height,
                step,
                equalized: EqualizedRect::at_scale(self.window, scale),
                cols,
                rows,
            });
        }
        None
    }
}
