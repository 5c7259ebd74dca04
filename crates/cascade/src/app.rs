//! Shared application-level helpers for the examples.
//!
//! These functions wire up I/O (load image and model, JSON/PNG output) around
//! the `cascade` detection APIs so every entry point shares the same behavior.

use crate::model_io::load_model;
use anyhow::{Context, Result};
use cascade_core::{DetectParams, ScanMode, WeightedRect};
use image::{GrayImage, ImageReader, Luma};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Write, path::Path, path::PathBuf, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    Naive,
    Precomputed,
}

impl FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "naive" | "reference" => Ok(DetectionMode::Naive),
            "precomputed" | "fast" => Ok(DetectionMode::Precomputed),
            other => Err(format!(
                "invalid mode '{other}', expected naive|precomputed"
            )),
        }
    }
}

impl From<DetectionMode> for ScanMode {
    fn from(mode: DetectionMode) -> Self {
        match mode {
            DetectionMode::Naive => ScanMode::Naive,
            DetectionMode::Precomputed => ScanMode::Precomputed,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    pub image: PathBuf,
    pub model: PathBuf,
    pub mode: Option<DetectionMode>,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub min_neighbors: Option<u32>,
    pub scale_factor: Option<f32>,
    pub group_eps: Option<f32>,
    pub first_stage_skip: Option<bool>,
    pub output_json: Option<PathBuf>,
    pub output_png: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl DetectionConfig {
    /// Config with only the required paths set.
    pub fn new(image: impl Into<PathBuf>, model: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            model: model.into(),
            mode: None,
            min_width: None,
            min_height: None,
            max_width: None,
            max_height: None,
            min_neighbors: None,
            scale_factor: None,
            group_eps: None,
            first_stage_skip: None,
            output_json: None,
            output_png: None,
            log_level: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DetectionDump {
    pub image: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub mode: DetectionMode,
    pub min_size: (u32, u32),
    pub max_size: (u32, u32),
    pub min_neighbors: u32,
    pub scale_factor: f32,
    pub raw_candidates: usize,
    pub detections: Vec<WeightedRect>,
}

/// Run one detection described by `cfg` and write the JSON and PNG outputs.
pub fn run_detection(cfg: DetectionConfig) -> Result<DetectionDump> {
    let mode = cfg.mode.unwrap_or(DetectionMode::Naive);

    let mut params = DetectParams::default();
    apply_params_overrides(&mut params, &cfg)?;

    let model = load_model(&cfg.model)?;
    let img = ImageReader::open(&cfg.image)
        .with_context(|| format!("opening image {}", cfg.image.display()))?
        .decode()?
        .to_luma8();

    let det = crate::image::detect_objects_image_with_mode(&img, &model, &params, mode.into())?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        raw = det.raw_count,
        detections = det.count(),
        ?mode,
        "detection finished"
    );

    let dump = DetectionDump {
        image: cfg.image.to_string_lossy().into_owned(),
        model: cfg.model.to_string_lossy().into_owned(),
        width: img.width(),
        height: img.height(),
        mode,
        min_size: params.min_size,
        max_size: params.max_size,
        min_neighbors: params.min_neighbors,
        scale_factor: params.scale_factor,
        raw_candidates: det.raw_count,
        detections: det.rects,
    };

    let json_out = cfg
        .output_json
        .unwrap_or_else(|| cfg.image.with_extension("detections.json"));
    write_json(&json_out, &dump)?;

    let png_out = cfg
        .output_png
        .unwrap_or_else(|| cfg.image.with_extension("detections.png"));
    let mut vis = img;
    draw_rects(&mut vis, &dump.detections);
    vis.save(&png_out)
        .with_context(|| format!("saving {}", png_out.display()))?;

    Ok(dump)
}

/// Copy the set fields of `cfg` onto `params`, rejecting unusable values.
pub fn apply_params_overrides(params: &mut DetectParams, cfg: &DetectionConfig) -> Result<()> {
    if let Some(w) = cfg.min_width {
        params.min_size.0 = w;
    }
    if let Some(h) = cfg.min_height {
        params.min_size.1 = h;
    }
    if let Some(w) = cfg.max_width {
        params.max_size.0 = w;
    }
    if let Some(h) = cfg.max_height {
        params.max_size.1 = h;
    }
    if let Some(n) = cfg.min_neighbors {
        params.min_neighbors = n;
    }
    if let Some(f) = cfg.scale_factor {
        if !(f > 1.0) {
            anyhow::bail!("scale factor must be > 1");
        }
        params.scale_factor = f;
    }
    if let Some(eps) = cfg.group_eps {
        if !(eps >= 0.0) {
            anyhow::bail!("group eps must be >= 0");
        }
        params.group_eps = eps;
    }
    if let Some(skip) = cfg.first_stage_skip {
        params.first_stage_skip = skip;
    }
    Ok(())
}

/// Outline each rectangle in white, clipped to the image.
pub fn draw_rects(vis: &mut GrayImage, rects: &[WeightedRect]) {
    let (w, h) = (vis.width() as i64, vis.height() as i64);
    let mut plot = |x: i64, y: i64| {
        if x >= 0 && y >= 0 && x < w && y < h {
            vis.put_pixel(x as u32, y as u32, Luma([255u8]));
        }
    };
    for r in rects {
        if r.width <= 0 || r.height <= 0 {
            continue;
        }
        let (x0, y0) = (r.x as i64, r.y as i64);
        let (x1, y1) = (x0 + r.width as i64 - 1, y0 + r.height as i64 - 1);
        for x in x0..=x1 {
            plot(x, y0);
            plot(x, y1);
        }
        for y in y0..=y1 {
            plot(x0, y);
            plot(x1, y);
        }
    }
}

pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut json_file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(&mut json_file, value)?;
    json_file.write_all(b"\n")?;
    Ok(())
}

pub fn load_config(path: &Path) -> Result<DetectionConfig> {
    let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
    let cfg: DetectionConfig = serde_json::from_reader(file)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}
