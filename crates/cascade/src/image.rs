//! Image helpers for the cascade detector.
//!
//! These wrappers expose the `cascade-core` integral tables and detection
//! entry points in terms of `image::GrayImage`, which is convenient for most
//! downstream consumers.

use cascade_core::{
    detect_with_mode, CascadeModel, DetectError, DetectParams, Detections, IntegralImage,
    ScanMode,
};
use image::{DynamicImage, GrayImage};

/// Build sum and squared-sum tables for an `image::GrayImage`.
#[inline]
pub fn integral_image(img: &GrayImage) -> IntegralImage {
    IntegralImage::from_gray(img.as_raw(), img.width() as usize, img.height() as usize)
}

/// Detect objects in an `image::GrayImage` with the reference evaluator.
#[inline]
pub fn detect_objects_image(
    img: &GrayImage,
    model: &CascadeModel,
    params: &DetectParams,
) -> Result<Detections, DetectError> {
    detect_objects_image_with_mode(img, model, params, ScanMode::Naive)
}

/// Detect objects in an `image::GrayImage` with an explicit evaluator.
pub fn detect_objects_image_with_mode(
    img: &GrayImage,
    model: &CascadeModel,
    params: &DetectParams,
    mode: ScanMode,
) -> Result<Detections, DetectError> {
    let ii = integral_image(img);
    detect_with_mode(&ii.as_sums(), model, params, mode)
}

/// Convert any decoded image to 8-bit luma, then detect.
pub fn detect_objects_dynamic(
    img: &DynamicImage,
    model: &CascadeModel,
    params: &DetectParams,
    mode: ScanMode,
) -> Result<Detections, DetectError> {
    let gray = img.to_luma8();
    detect_objects_image_with_mode(&gray, model, params, mode)
}
