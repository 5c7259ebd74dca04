//! Reference cascade scanner.
//!
//! Every window on every admissible scale is normalized by the intensity
//! spread of its equalized rectangle and pushed through the stages in order.
//! A stage whose summed classifier responses fall below its threshold rejects
//! the window immediately. This evaluator rescales feature geometry for each
//! window; [`crate::precompute`] produces the same candidates with the
//! geometry resolved once per scale.

use crate::integral::IntegralSums;
use crate::model::{CascadeModel, HaarFeature};
use crate::scale::{scan_windows, ScanWindow};
use crate::{reserve, DetectError, DetectParams, WeightedRect, MAX_FEATURE_RECTS};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::{debug, instrument, warn};

/// Outcome of running the cascade on one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowVerdict {
    Accepted,
    /// Rejected by the stage at this index.
    Rejected { stage: usize },
}

/// Feature rectangle in window pixels with its area-normalized weight.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScaledRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub weight: f32,
}

/// Active rectangles of a feature at one scale.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScaledFeature {
    rects: [ScaledRect; MAX_FEATURE_RECTS],
    len: usize,
}

impl ScaledFeature {
    #[inline]
    pub fn rects(&self) -> &[ScaledRect] {
        &self.rects[..self.len]
    }
}

/// Scale a feature's rectangles and normalize their weights.
///
/// Each weight is divided by the equalized `area`. The first rectangle's weight
/// is then replaced by `-(Σ_{i>0} w_i · area_i) / area_0`, which makes the
/// feature respond with zero on a flat patch at any scale.
pub fn scale_feature(feature: &HaarFeature, scale: f32, area: u32) -> ScaledFeature {
    let mut out = ScaledFeature::default();
    let mut first_area = 0.0f32;
    let mut rest = 0.0f32;

    for (slot, r) in feature.active_rects() {
        let rect = ScaledRect {
            x: (r.x as f32 * scale).round() as usize,
            y: (r.y as f32 * scale).round() as usize,
            width: (r.width as f32 * scale).round() as usize,
            height: (r.height as f32 * scale).round() as usize,
            weight: r.weight / area as f32,
        };
        if slot == 0 {
            first_area = (rect.width * rect.height) as f32;
        } else {
            rest += rect.weight * rect.width as f32 * rect.height as f32;
        }
        out.rects[out.len] = rect;
        out.len += 1;
    }

    out.rects[0].weight = -rest / first_area;
    out
}

/// Intensity spread of the window at `(x, y)` over its equalized rectangle.
///
/// Computes `E[x²] - E[x]²` in `f32`. A positive value yields its square
/// root; zero or negative (rounding noise on flat patches) yields exactly 1.
#[inline]
pub fn window_variance(sums: &IntegralSums<'_>, win: &ScanWindow, x: usize, y: usize) -> f32 {
    let eq = &win.equalized;
    let area = eq.area() as f32;
    let ex = x + eq.x as usize;
    let ey = y + eq.y as usize;
    let (ew, eh) = (eq.width as usize, eq.height as usize);

    let mean = sums.rect_sum(ex, ey, ew, eh) as f32 / area;
    let variance = sums.rect_sq_sum(ex, ey, ew, eh) as f32 / area - mean * mean;
    if variance > 0.0 {
        variance.sqrt()
    } else {
        1.0
    }
}

/// Run the full cascade on the window at `(x, y)`.
pub fn evaluate_window(
    sums: &IntegralSums<'_>,
    model: &CascadeModel,
    win: &ScanWindow,
    x: usize,
    y: usize,
) -> WindowVerdict {
    let norm = window_variance(sums, win, x, y);
    let area = win.equalized.area();

    for (stage_idx, stage) in model.stages.iter().enumerate() {
        let mut stage_sum = 0.0f32;
        for c in &stage.classifiers {
            let norm_threshold = c.threshold * norm;
            let feature = scale_feature(&c.feature, win.scale, area);

            let mut response = 0.0f32;
            for r in feature.rects() {
                response += sums.rect_sum(x + r.x, y + r.y, r.width, r.height) as f32 * r.weight;
            }
            stage_sum += c.alpha[(response >= norm_threshold) as usize];
        }
        if stage_sum < stage.threshold {
            return WindowVerdict::Rejected { stage: stage_idx };
        }
    }
    WindowVerdict::Accepted
}

/// Collect every window that survives all stages.
///
/// Candidates carry their pixel origin and scaled size with `weight == 0`,
/// ordered by scale, then row, then column.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "debug",
        skip(sums, model, params),
        fields(w = sums.width, h = sums.height, stages = model.stages.len())
    )
)]
pub fn scan_candidates(
    sums: &IntegralSums<'_>,
    model: &CascadeModel,
    params: &DetectParams,
) -> Result<Vec<WeightedRect>, DetectError> {
    let mut out = Vec::new();
    if !is_scannable(model) {
        return Ok(out);
    }

    for win in scan_windows(model.window, (sums.width, sums.height), params) {
        scan_grid(&win, params.first_stage_skip, &mut out, |x, y| {
            evaluate_window(sums, model, &win, x, y)
        })?;
    }
    Ok(out)
}

/// Models that cannot be scanned degrade to an empty result.
pub(crate) fn is_scannable(model: &CascadeModel) -> bool {
    match model.validate() {
        Ok(()) => true,
        Err(_err) => {
            #[cfg(feature = "tracing")]
            warn!(error = %_err, "cascade cannot be scanned; returning no candidates");
            false
        }
    }
}

/// Drive `eval` over the step grid of one scale, appending accepted windows.
pub(crate) fn scan_grid<F>(
    win: &ScanWindow,
    first_stage_skip: bool,
    out: &mut Vec<WeightedRect>,
    eval: F,
) -> Result<(), DetectError>
where
    F: Fn(usize, usize) -> WindowVerdict + Sync,
{
    #[cfg(feature = "tracing")]
    let before = out.len();

    #[cfg(feature = "rayon")]
    {
        let rows: Vec<Vec<WeightedRect>> = (0..win.rows)
            .into_par_iter()
            .map(|row| scan_row(win, row, first_stage_skip, &eval))
            .collect();
        reserve(out, rows.iter().map(Vec::len).sum())?;
        for hits in rows {
            out.extend(hits);
        }
    }

    #[cfg(not(feature = "rayon"))]
    for row in 0..win.rows {
        let hits = scan_row(win, row, first_stage_skip, &eval);
        reserve(out, hits.len())?;
        out.extend(hits);
    }

    #[cfg(feature = "tracing")]
    debug!(
        scale = win.scale,
        width = win.width,
        height = win.height,
        step = win.step,
        windows = win.grid_len(),
        accepted = out.len() - before,
        "scanned scale"
    );
    Ok(())
}

fn scan_row<F>(win: &ScanWindow, row: usize, first_stage_skip: bool, eval: &F) -> Vec<WeightedRect>
where
    F: Fn(usize, usize) -> WindowVerdict,
{
    let mut hits = Vec::new();
    let mut col = 0;
    while col < win.cols {
        let (x, y) = win.position(col, row);
        match eval(x, y) {
            WindowVerdict::Accepted => hits.push(WeightedRect::new(
                x as i32,
                y as i32,
                win.width as i32,
                win.height as i32,
            )),
            // a first-stage miss also rules out the neighbouring column
            WindowVerdict::Rejected { stage: 0 } if first_stage_skip => col += 1,
            WindowVerdict::Rejected { .. } => {}
        }
        col += 1;
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integral::IntegralImage;
    use crate::model::{FeatureRect, Stage, StumpClassifier};

    fn pass_all_model(window: (u32, u32)) -> CascadeModel {
        CascadeModel::new(
            window,
            vec![Stage {
                threshold: 0.5,
                classifiers: vec![StumpClassifier {
                    feature: HaarFeature::two(
                        FeatureRect::new(0, 0, window.0, window.1, -1.0),
                        FeatureRect::default(),
                    ),
                    threshold: -1.0,
                    alpha: [0.0, 1.0],
                }],
            }],
        )
    }

    #[test]
    fn flat_window_spread_is_exactly_one() {
        for value in [0u8, 77, 255] {
            let img = vec![value; 40 * 40];
            let ii = IntegralImage::from_gray(&img, 40, 40);
            let sums = ii.as_sums();
            let win = scan_windows((20, 20), (40, 40), &DetectParams::default())
                .next()
                .expect("one scale");
            for (x, y) in [(0, 0), (4, 6), (10, 10)] {
                assert_eq!(window_variance(&sums, &win, x, y), 1.0);
            }
        }
    }

    #[test]
    fn spread_matches_standard_deviation() {
        // alternating 0/100 columns: mean 50, std 50
        let img: Vec<u8> = (0..40 * 40)
            .map(|i| if (i % 40) % 2 == 0 { 0 } else { 100 })
            .collect();
        let ii = IntegralImage::from_gray(&img, 40, 40);
        let win = scan_windows((20, 20), (40, 40), &DetectParams::default())
            .next()
            .expect("one scale");
        assert_eq!(window_variance(&ii.as_sums(), &win, 0, 0), 50.0);
    }

    #[test]
    fn scaled_feature_has_zero_mean_weights() {
        let feature = HaarFeature::three(
            FeatureRect::new(0, 0, 12, 12, -1.0),
            FeatureRect::new(4, 0, 4, 12, 3.0),
            FeatureRect::new(0, 4, 12, 2, 1.5),
        );
        for scale in [1.0f32, 1.1, 1.771561, 3.0] {
            let f = scale_feature(&feature, scale, 100);
            assert_eq!(f.rects().len(), 3);
            let weighted_area: f32 = f
                .rects()
                .iter()
                .map(|r| r.weight * (r.width * r.height) as f32)
                .sum();
            assert!(weighted_area.abs() < 1e-4, "scale {scale}: {weighted_area}");
        }
    }

    #[test]
    fn single_rect_feature_gets_negative_zero_weight() {
        let feature = HaarFeature::two(FeatureRect::new(0, 0, 10, 10, 5.0), FeatureRect::default());
        let f = scale_feature(&feature, 1.0, 64);
        assert_eq!(f.rects().len(), 1);
        assert_eq!(f.rects()[0].weight, 0.0);
    }

    #[test]
    fn blank_image_accepts_every_window_of_pass_all_cascade() {
        let img = vec![0u8; 64 * 64];
        let ii = IntegralImage::from_gray(&img, 64, 64);
        let sums = ii.as_sums();
        let model = pass_all_model((20, 20));
        let params = DetectParams::default().with_min_size(20, 20);

        let candidates = scan_candidates(&sums, &model, &params).expect("scan");
        let expected: usize = scan_windows(model.window, (64, 64), &params)
            .map(|w| w.grid_len())
            .sum();
        assert!(!candidates.is_empty());
        assert_eq!(candidates.len(), expected);
        for r in &candidates {
            assert!(r.width >= 20 && r.height >= 20);
            assert!(r.x >= 0 && r.y >= 0);
            assert!(r.right() <= 64 && r.bottom() <= 64);
            assert_eq!(r.weight, 0);
        }
    }

    #[test]
    fn first_stage_rejection_skips_next_column() {
        let win = scan_windows((20, 20), (64, 64), &DetectParams::default())
            .next()
            .expect("one scale");

        let calls = std::sync::atomic::AtomicUsize::new(0);
        let mut out = Vec::new();
        scan_grid(&win, true, &mut out, |_, _| {
            calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            WindowVerdict::Rejected { stage: 0 }
        })
        .expect("scan");
        assert!(out.is_empty());
        assert_eq!(calls.into_inner(), win.cols.div_ceil(2) * win.rows);

        let calls = std::sync::atomic::AtomicUsize::new(0);
        scan_grid(&win, true, &mut out, |_, _| {
            calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            WindowVerdict::Rejected { stage: 1 }
        })
        .expect("scan");
        assert_eq!(calls.into_inner(), win.grid_len());
    }

    #[test]
    fn unscannable_models_yield_nothing() {
        let img = vec![0u8; 64 * 64];
        let ii = IntegralImage::from_gray(&img, 64, 64);
        let sums = ii.as_sums();
        let params = DetectParams::default();

        let no_stages = CascadeModel::new((20, 20), Vec::new());
        assert!(scan_candidates(&sums, &no_stages, &params)
            .expect("scan")
            .is_empty());

        let too_big = pass_all_model((60, 60));
        assert!(scan_candidates(&sums, &too_big, &params)
            .expect("scan")
            .is_empty());
    }
}
