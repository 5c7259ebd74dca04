use anyhow::Context;
use cascade::app::{load_config, run_detection};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let path: PathBuf = std::env::args()
        .nth(1)
        .context("usage: detect_from_config <config.json>")?
        .into();
    let cfg = load_config(&path)?;

    #[cfg(feature = "tracing")]
    {
        let level = cfg.log_level.clone().unwrap_or_else(|| "info".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
            )
            .init();
    }

    let dump = run_detection(cfg)?;
    println!(
        "{}: {} detections from {} raw candidates",
        dump.image,
        dump.detections.len(),
        dump.raw_candidates
    );
    for r in &dump.detections {
        println!(
            "  x={} y={} w={} h={} support={}",
            r.x, r.y, r.width, r.height, r.weight
        );
    }
    Ok(())
}
