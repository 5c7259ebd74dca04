use anyhow::Context;
use cascade::app::{draw_rects, write_json, DetectionMode};
use cascade::{detect_objects_dynamic, load_model, DetectParams, WeightedRect};
use image::ImageReader;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Serialize)]
struct DetectionsDump {
    image: String,
    width: u32,
    height: u32,
    mode: DetectionMode,
    raw_candidates: usize,
    detections: Vec<WeightedRect>,
}

fn parse_size(v: &str) -> anyhow::Result<(u32, u32)> {
    let (w, h) = v
        .split_once(['x', 'X'])
        .with_context(|| format!("expected WxH, got '{v}'"))?;
    Ok((w.parse()?, h.parse()?))
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let usage = "usage: dump_detections <image> <model.json> [--mode naive|precomputed] \
                 [--min-size WxH] [--max-size WxH] [--min-neighbors N] [--scale F]";
    let input: PathBuf = args.next().context(usage)?.into();
    let model_path: PathBuf = args.next().context(usage)?.into();

    let mut mode = DetectionMode::Naive;
    let mut params = DetectParams::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => {
                let v = args.next().context("expected a mode after --mode")?;
                mode = v.parse().map_err(anyhow::Error::msg)?;
            }
            "--min-size" => {
                let v = args.next().context("expected WxH after --min-size")?;
                let (w, h) = parse_size(&v)?;
                params = params.with_min_size(w, h);
            }
            "--max-size" => {
                let v = args.next().context("expected WxH after --max-size")?;
                let (w, h) = parse_size(&v)?;
                params = params.with_max_size(w, h);
            }
            "--min-neighbors" => {
                let v = args
                    .next()
                    .context("expected an integer after --min-neighbors")?;
                params.min_neighbors = v.parse().context("could not parse min-neighbors")?;
            }
            "--scale" => {
                let v = args.next().context("expected a factor after --scale")?;
                params.scale_factor = v.parse().context("could not parse scale factor")?;
                if params.scale_factor <= 1.0 {
                    anyhow::bail!("scale factor must be > 1");
                }
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    let model = load_model(&model_path)?;
    let img = ImageReader::open(&input)?.decode()?;

    let started = Instant::now();
    let det = detect_objects_dynamic(&img, &model, &params, mode.into())?;
    let detect_ms = started.elapsed().as_secs_f64() * 1000.0;

    println!("image {}x{} pixels", img.width(), img.height());
    println!(
        "model {}x{} window, {} stages, {} classifiers",
        model.window.0,
        model.window.1,
        model.stages.len(),
        model.classifier_count()
    );
    println!("detect ({mode:?}): {detect_ms:5.2} ms");
    println!(
        "{} raw candidates, {} detections",
        det.raw_count,
        det.count()
    );

    let json_out = input.with_extension("detections.json");
    let dump = DetectionsDump {
        image: input.to_string_lossy().into_owned(),
        width: img.width(),
        height: img.height(),
        mode,
        raw_candidates: det.raw_count,
        detections: det.rects,
    };
    write_json(&json_out, &dump)?;
    println!("Saved JSON dump to {}", json_out.display());

    let mut vis = img.to_luma8();
    draw_rects(&mut vis, &dump.detections);
    let out = input.with_extension("detections.png");
    vis.save(&out)?;
    println!("Saved visualization to {}", out.display());

    Ok(())
}
