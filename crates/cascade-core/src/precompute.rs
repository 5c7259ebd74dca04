//! Cascade scanner with feature geometry resolved once per scale.
//!
//! For each scale, every active feature rectangle is turned into four linear
//! indices into the sum table, relative to the window origin. A window at
//! `(x, y)` then reads `sum[corner + offset(x, y)]`, so the inner loop does
//! no rounding or scaling. Weights and rectangle geometry come from
//! [`scale_feature`], which keeps the candidates identical to
//! [`crate::scan::scan_candidates`].

use crate::integral::{corner_sum, IntegralSums};
use crate::model::CascadeModel;
use crate::scale::{scan_windows, ScanWindow};
use crate::scan::{is_scannable, scale_feature, scan_grid, window_variance, WindowVerdict};
use crate::{reserve, DetectError, DetectParams, WeightedRect, MAX_FEATURE_RECTS};
#[cfg(feature = "tracing")]
use tracing::{instrument, warn};

/// Sum-table corners of one rectangle plus its normalized weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OffsetRect {
    /// `[top_left, top_right, bottom_left, bottom_right]`, relative to the
    /// window origin.
    pub corners: [usize; 4],
    pub weight: f32,
}

/// Flattened offset rectangles for every classifier in stage order.
#[derive(Clone, Debug, Default)]
pub struct OffsetTable {
    rects: Vec<OffsetRect>,
    /// `(start, len)` into `rects` per classifier.
    spans: Vec<(usize, usize)>,
}

impl OffsetTable {
    /// Resolve all classifiers of `model` for the scale described by `win`.
    ///
    /// `classifiers_per_stage` only sizes the initial reservation; stages with
    /// more classifiers are still resolved in full.
    pub fn build(
        sums: &IntegralSums<'_>,
        model: &CascadeModel,
        win: &ScanWindow,
        classifiers_per_stage: usize,
    ) -> Result<Self, DetectError> {
        let classifiers = model.classifier_count();
        let hint = classifiers.min(model.stages.len() * classifiers_per_stage);

        #[cfg(feature = "tracing")]
        if model.max_stage_len() > classifiers_per_stage {
            warn!(
                longest = model.max_stage_len(),
                limit = classifiers_per_stage,
                "stage exceeds the configured classifier capacity"
            );
        }

        let mut table = Self::default();
        reserve(&mut table.rects, hint * MAX_FEATURE_RECTS)?;
        reserve(&mut table.spans, classifiers)?;

        let area = win.equalized.area();
        for stage in &model.stages {
            for c in &stage.classifiers {
                let start = table.rects.len();
                let feature = scale_feature(&c.feature, win.scale, area);
                for r in feature.rects() {
                    let (x1, y1) = (r.x + r.width, r.y + r.height);
                    reserve(&mut table.rects, 1)?;
                    table.rects.push(OffsetRect {
                        corners: [
                            sums.offset(r.x, r.y),
                            sums.offset(x1, r.y),
                            sums.offset(r.x, y1),
                            sums.offset(x1, y1),
                        ],
                        weight: r.weight,
                    });
                }
                table.spans.push((start, table.rects.len() - start));
            }
        }
        Ok(table)
    }

    /// Offset rectangles of the classifier at flat index `idx`.
    #[inline]
    pub fn classifier_rects(&self, idx: usize) -> &[OffsetRect] {
        let (start, len) = self.spans[idx];
        &self.rects[start..start + len]
    }

    /// Number of classifiers covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// Run the full cascade on the window at `(x, y)` using a resolved table.
pub fn evaluate_window_precomputed(
    sums: &IntegralSums<'_>,
    model: &CascadeModel,
    table: &OffsetTable,
    win: &ScanWindow,
    x: usize,
    y: usize,
) -> WindowVerdict {
    let norm = window_variance(sums, win, x, y);
    let base = sums.offset(x, y);
    let sum = sums.sum_table();

    let mut flat = 0;
    for (stage_idx, stage) in model.stages.iter().enumerate() {
        let mut stage_sum = 0.0f32;
        for c in &stage.classifiers {
            let norm_threshold = c.threshold * norm;

            let mut response = 0.0f32;
            for r in table.classifier_rects(flat) {
                let [tl, tr, bl, br] = r.corners;
                response +=
                    corner_sum(sum, tl + base, tr + base, bl + base, br + base) as f32 * r.weight;
            }
            flat += 1;
            stage_sum += c.alpha[(response >= norm_threshold) as usize];
        }
        if stage_sum < stage.threshold {
            return WindowVerdict::Rejected { stage: stage_idx };
        }
    }
    WindowVerdict::Accepted
}

/// Same contract and output as [`crate::scan::scan_candidates`].
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "debug",
        skip(sums, model, params),
        fields(w = sums.width, h = sums.height, stages = model.stages.len())
    )
)]
pub fn scan_candidates_precomputed(
    sums: &IntegralSums<'_>,
    model: &CascadeModel,
    params: &DetectParams,
) -> Result<Vec<WeightedRect>, DetectError> {
    let mut out = Vec::new();
    if !is_scannable(model) {
        return Ok(out);
    }

    for win in scan_windows(model.window, (sums.width, sums.height), params) {
        let table = OffsetTable::build(sums, model, &win, params.max_classifiers_per_stage)?;
        scan_grid(&win, params.first_stage_skip, &mut out, |x, y| {
            evaluate_window_precomputed(sums, model, &table, &win, x, y)
        })?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integral::IntegralImage;
    use crate::model::{FeatureRect, HaarFeature, Stage, StumpClassifier};
    use crate::scan::evaluate_window;

    fn gradient(w: usize, h: usize) -> Vec<u8> {
        (0..w * h)
            .map(|i| (((i % w) * 3 + (i / w) * 5) % 256) as u8)
            .collect()
    }

    fn model() -> CascadeModel {
        let edge = StumpClassifier {
            feature: HaarFeature::two(
                FeatureRect::new(0, 0, 12, 12, -1.0),
                FeatureRect::new(6, 0, 6, 12, 2.0),
            ),
            threshold: 0.01,
            alpha: [-0.5, 0.8],
        };
        let line = StumpClassifier {
            feature: HaarFeature::three(
                FeatureRect::new(0, 0, 12, 12, -1.0),
                FeatureRect::new(0, 4, 12, 4, 3.0),
                FeatureRect::new(2, 2, 4, 4, 1.0),
            ),
            threshold: -0.02,
            alpha: [0.3, -0.4],
        };
        CascadeModel::new(
            (12, 12),
            vec![
                Stage {
                    threshold: -0.6,
                    classifiers: vec![edge.clone(), line.clone()],
                },
                Stage {
                    threshold: 0.1,
                    classifiers: vec![line, edge],
                },
            ],
        )
    }

    #[test]
    fn table_spans_follow_active_rects() {
        let img = gradient(48, 40);
        let ii = IntegralImage::from_gray(&img, 48, 40);
        let sums = ii.as_sums();
        let model = model();
        let win = scan_windows(model.window, (48, 40), &DetectParams::default())
            .next()
            .expect("one scale");

        let table = OffsetTable::build(&sums, &model, &win, 1).expect("table");
        assert_eq!(table.len(), 4);
        let lens: Vec<usize> = (0..table.len())
            .map(|i| table.classifier_rects(i).len())
            .collect();
        assert_eq!(lens, vec![2, 3, 3, 2]);

        // corners of the first rect at scale 1: (0,0) .. (12,12), stride 49
        assert_eq!(table.classifier_rects(0)[0].corners, [0, 12, 12 * 49, 12 * 49 + 12]);
    }

    #[test]
    fn verdicts_match_reference_evaluator_on_every_window() {
        let (w, h) = (64usize, 56usize);
        let img = gradient(w, h);
        let ii = IntegralImage::from_gray(&img, w, h);
        let sums = ii.as_sums();
        let model = model();
        let params = DetectParams::default();

        for win in scan_windows(model.window, (w, h), &params) {
            let table = OffsetTable::build(&sums, &model, &win, params.max_classifiers_per_stage)
                .expect("table");
            for row in 0..win.rows {
                for col in 0..win.cols {
                    let (x, y) = win.position(col, row);
                    assert_eq!(
                        evaluate_window(&sums, &model, &win, x, y),
                        evaluate_window_precomputed(&sums, &model, &table, &win, x, y),
                        "scale {} at ({x}, {y})",
                        win.scale
                    );
                }
            }
        }
    }
}
