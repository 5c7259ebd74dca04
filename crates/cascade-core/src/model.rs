//! In-memory cascade model: stages of stump classifiers over Haar features.
//!
//! Geometry is expressed in the canonical window (`CascadeModel::window`) and
//! is scaled at scan time.

use crate::MAX_FEATURE_RECTS;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One weighted rectangle of a Haar feature, relative to the canonical window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

impl FeatureRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32, weight: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            weight,
        }
    }

    /// A zero weight marks an unused slot.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.weight != 0.0
    }
}

/// Up to three weighted rectangles. The first rectangle is always evaluated;
/// its weight is re-derived per scale so the feature has zero mean.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HaarFeature {
    pub rects: [FeatureRect; MAX_FEATURE_RECTS],
}

impl HaarFeature {
    /// Two-rectangle feature; the remaining slot stays inactive.
    pub fn two(first: FeatureRect, second: FeatureRect) -> Self {
        Self {
            rects: [first, second, FeatureRect::default()],
        }
    }

    pub fn three(first: FeatureRect, second: FeatureRect, third: FeatureRect) -> Self {
        Self {
            rects: [first, second, third],
        }
    }

    /// Rectangles evaluated at scan time, with their slot index.
    pub fn active_rects(&self) -> impl Iterator<Item = (usize, &FeatureRect)> {
        self.rects
            .iter()
            .enumerate()
            .filter(|(i, r)| *i == 0 || r.is_active())
    }
}

/// Single-feature classifier choosing between two responses.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StumpClassifier {
    pub feature: HaarFeature,
    /// Feature threshold, multiplied by the window's intensity spread.
    pub threshold: f32,
    /// `alpha[0]` below threshold, `alpha[1]` at or above.
    pub alpha: [f32; 2],
}

/// Classifiers summed and compared against a rejection threshold.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stage {
    pub threshold: f32,
    pub classifiers: Vec<StumpClassifier>,
}

/// Ordered stages plus the canonical window size they were trained on.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CascadeModel {
    /// Canonical window `(width, height)`.
    pub window: (u32, u32),
    pub stages: Vec<Stage>,
}

/// Structural problem that prevents a model from being scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    NoStages,
    WindowTooSmall { width: u32, height: u32 },
    EmptyFirstRect { stage: usize, classifier: usize },
    RectOutsideWindow { stage: usize, classifier: usize, rect: usize },
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoStages => write!(f, "cascade has no stages"),
            Self::WindowTooSmall { width, height } => {
                write!(f, "canonical window {}x{} is smaller than 3x3", width, height)
            }
            Self::EmptyFirstRect { stage, classifier } => write!(
                f,
                "stage {} classifier {}: first rectangle has zero area",
                stage, classifier
            ),
            Self::RectOutsideWindow {
                stage,
                classifier,
                rect,
            } => write!(
                f,
                "stage {} classifier {}: rectangle {} exceeds the canonical window",
                stage, classifier, rect
            ),
        }
    }
}

impl std::error::Error for ModelError {}

impl CascadeModel {
    pub fn new(window: (u32, u32), stages: Vec<Stage>) -> Self {
        Self { window, stages }
    }

    /// Total classifier count across all stages.
    pub fn classifier_count(&self) -> usize {
        self.stages.iter().map(|s| s.classifiers.len()).sum()
    }

    /// Largest classifier count of any single stage.
    pub fn max_stage_len(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.classifiers.len())
            .max()
            .unwrap_or(0)
    }

    /// Check that every active rectangle lies inside the canonical window.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.stages.is_empty() {
            return Err(ModelError::NoStages);
        }
        let (w0, h0) = self.window;
        // the equalized variance rect is the window inset by one on each side
        if w0 < 3 || h0 < 3 {
            return Err(ModelError::WindowTooSmall {
                width: w0,
                height: h0,
            });
        }

        for (si, stage) in self.stages.iter().enumerate() {
            for (ci, c) in stage.classifiers.iter().enumerate() {
                let first = &c.feature.rects[0];
                if first.width == 0 || first.height == 0 {
                    return Err(ModelError::EmptyFirstRect {
                        stage: si,
                        classifier: ci,
                    });
                }
                for (ri, r) in c.feature.active_rects() {
                    let inside = r.x as u64 + r.width as u64 <= w0 as u64
                        && r.y as u64 + r.height as u64 <= h0 as u64;
                    if !inside {
                        return Err(ModelError::RectOutsideWindow {
                            stage: si,
                            classifier: ci,
                            rect: ri,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
