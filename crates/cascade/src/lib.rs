//! Ergonomic wrappers over `cascade-core` that accept `image` inputs.
//!
//! This crate is organized into a few focused modules:
//! - [`image`] – grayscale conversion, integral tables and detection on
//!   `image::GrayImage` / `image::DynamicImage`.
//! - [`model_io`] – loading and saving cascade models as JSON.
//! - [`app`] – JSON-configured detection runs shared by the examples.

pub mod app;
pub mod image;
pub mod model_io;

// Re-export a focused subset of core types for convenience. Consumers that
// need the evaluators or the clusterer directly are encouraged to depend on
// `cascade-core`.
pub use cascade_core::{
    CascadeModel, DetectError, DetectParams, Detections, FeatureRect, HaarFeature, ModelError,
    ScanMode, Stage, StumpClassifier, WeightedRect,
};

pub use crate::image::{detect_objects_dynamic, detect_objects_image, integral_image};
pub use crate::model_io::{load_model, save_model};
