//! Detection entry points: scan, then group.
use crate::cluster::group_rectangles;
use crate::integral::IntegralSums;
use crate::model::CascadeModel;
use crate::precompute::scan_candidates_precomputed;
use crate::scan::scan_candidates;
use crate::{DetectError, DetectParams, WeightedRect};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "tracing")]
use tracing::{debug, instrument};

/// Which cascade evaluator produces the raw candidates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ScanMode {
    /// Rescale feature geometry for every window.
    #[default]
    Naive,
    /// Resolve feature geometry into sum-table offsets once per scale.
    Precomputed,
}

/// Final detections of one call.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Detections {
    /// Grouped rectangles (raw candidates when grouping is disabled).
    pub rects: Vec<WeightedRect>,
    /// Windows that passed every stage, before grouping.
    pub raw_count: usize,
}

impl Detections {
    #[inline]
    pub fn count(&self) -> usize {
        self.rects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
}

/// Detect objects with the reference evaluator.
///
/// Scans every admissible scale, then groups the surviving windows with
/// threshold `max(min_neighbors, 1)`. With `min_neighbors == 0` the raw
/// candidates are returned as-is. Raw candidates lie inside the image; grouped
/// rectangles are rounded averages and are not clipped.
pub fn detect_objects(
    sums: &IntegralSums<'_>,
    model: &CascadeModel,
    params: &DetectParams,
) -> Result<Detections, DetectError> {
    detect_with_mode(sums, model, params, ScanMode::Naive)
}

/// Detect objects with the per-scale offset table. Results are identical to
/// [`detect_objects`].
pub fn detect_objects_precomputed(
    sums: &IntegralSums<'_>,
    model: &CascadeModel,
    params: &DetectParams,
) -> Result<Detections, DetectError> {
    detect_with_mode(sums, model, params, ScanMode::Precomputed)
}

#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(sums, model, params),
        fields(w = sums.width, h = sums.height, min_neighbors = params.min_neighbors)
    )
)]
pub fn detect_with_mode(
    sums: &IntegralSums<'_>,
    model: &CascadeModel,
    params: &DetectParams,
    mode: ScanMode,
) -> Result<Detections, DetectError> {
    let raw = match mode {
        ScanMode::Naive => scan_candidates(sums, model, params)?,
        ScanMode::Precomputed => scan_candidates_precomputed(sums, model, params)?,
    };
    let raw_count = raw.len();

    let rects = if params.min_neighbors == 0 {
        raw
    } else {
        group_rectangles(&raw, params.min_neighbors.max(1), params.group_eps)?
    };

    #[cfg(feature = "tracing")]
    debug!(raw = raw_count, grouped = rects.len(), "detection finished");

    Ok(Detections { rects, raw_count })
}
