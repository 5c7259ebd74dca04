//! Core primitives for Haar cascade object detection on integral images.
//!
//! # Overview
//!
//! This crate exposes two main building blocks:
//!
//! - [`scan`] / [`precompute`] – multi-scale sliding-window evaluation of a
//!   staged rejection cascade against an [`IntegralSums`] view. Both evaluators
//!   share the same contract and produce identical candidates; the precomputed
//!   one resolves feature geometry into sum-table offsets once per scale.
//! - [`cluster`] – union-find grouping of overlapping candidates into averaged
//!   rectangles, with a minimum-support filter and containment suppression.
//!
//! [`detect`] wires both together. Scales come from [`scale`], the model types
//! live in [`model`], and [`integral`] holds the cumulative sum tables.
//!
//! # Features
//!
//! - `rayon` – scans the window rows of each scale in parallel. Rows are
//!   concatenated in order, so the candidate list is identical to the
//!   single-threaded path.
//! - `tracing` – spans on the public entry points and per-scale debug events.
//! - `serde` – `Serialize`/`Deserialize` on the model and result types.

pub mod cluster;
pub mod detect;
pub mod integral;
pub mod model;
pub mod precompute;
pub mod scale;
pub mod scan;

pub use crate::detect::{
    detect_objects, detect_objects_precomputed, detect_with_mode, Detections, ScanMode,
};
pub use crate::integral::{IntegralImage, IntegralSums};
pub use crate::model::{CascadeModel, FeatureRect, HaarFeature, ModelError, Stage, StumpClassifier};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Multiplicative growth between consecutive scan scales.
pub const DEFAULT_SCALE_FACTOR: f32 = 1.1;
/// Relative tolerance used when grouping candidate rectangles.
pub const DEFAULT_GROUP_EPS: f32 = 0.2;
/// Rectangles per Haar feature.
pub const MAX_FEATURE_RECTS: usize = 3;
/// Classifier count per stage the offset table is sized for up front.
pub const MAX_CLASSIFIERS_PER_STAGE: usize = 200;
/// Scales stop once the scaled window reaches `image - MIN_SCALE_MARGIN`.
pub const MIN_SCALE_MARGIN: u32 = 10;

/// Tunable parameters for window scanning and detection grouping.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectParams {
    /// Smallest scaled window `(width, height)` that is scanned.
    pub min_size: (u32, u32),
    /// Largest scaled window `(width, height)`; `0` leaves an axis unbounded.
    pub max_size: (u32, u32),
    /// Groups need strictly more members than this to survive. `0` disables
    /// grouping and returns the raw candidates.
    pub min_neighbors: u32,
    /// Scale growth per step; must be greater than 1.
    pub scale_factor: f32,
    /// Similarity tolerance for grouping and containment suppression.
    pub group_eps: f32,
    /// Capacity hint for the per-scale offset table.
    pub max_classifiers_per_stage: usize,
    /// Skip the next grid column after a window fails the first stage.
    pub first_stage_skip: bool,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            min_size: (0, 0),
            max_size: (0, 0),
            min_neighbors: 3,
            scale_factor: DEFAULT_SCALE_FACTOR,
            group_eps: DEFAULT_GROUP_EPS,
            max_classifiers_per_stage: MAX_CLASSIFIERS_PER_STAGE,
            first_stage_skip: true,
        }
    }
}

impl DetectParams {
    /// Create a new parameter set with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_size(mut self, width: u32, height: u32) -> Self {
        self.min_size = (width, height);
        self
    }

    pub fn with_max_size(mut self, width: u32, height: u32) -> Self {
        self.max_size = (width, height);
        self
    }

    pub fn with_min_neighbors(mut self, min_neighbors: u32) -> Self {
        self.min_neighbors = min_neighbors;
        self
    }

    pub fn with_scale_factor(mut self, scale_factor: f32) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_group_eps(mut self, group_eps: f32) -> Self {
        self.group_eps = group_eps;
        self
    }

    pub fn with_first_stage_skip(mut self, enabled: bool) -> Self {
        self.first_stage_skip = enabled;
        self
    }
}

/// Axis-aligned rectangle in image pixels plus a support count.
///
/// The scanner emits candidates with `weight == 0`; grouping sets the weight to
/// the number of raw candidates merged into the rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeightedRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub weight: u32,
}

impl WeightedRect {
    #[inline]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            weight: 0,
        }
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

/// Failure while scanning or grouping.
///
/// Malformed inputs never produce an error; they degrade to an empty result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    /// A working buffer could not be reserved.
    OutOfMemory { requested: usize },
}

impl std::fmt::Display for DetectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory reserving {} working entries", requested)
            }
        }
    }
}

impl std::error::Error for DetectError {}

/// Reserve `additional` slots in `buf`, mapping failure to [`DetectError`].
#[inline]
pub(crate) fn reserve<T>(buf: &mut Vec<T>, additional: usize) -> Result<(), DetectError> {
    buf.try_reserve(additional)
        .map_err(|_| DetectError::OutOfMemory {
            requested: additional,
        })
}
