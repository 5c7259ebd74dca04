//! JSON persistence for cascade models.

use anyhow::{Context, Result};
use cascade_core::CascadeModel;
use std::{fs::File, io::BufReader, io::Write, path::Path};

/// Load a cascade model and check that it can be scanned.
pub fn load_model(path: &Path) -> Result<CascadeModel> {
    let file = File::open(path).with_context(|| format!("opening model {}", path.display()))?;
    let model = parse_model(BufReader::new(file))
        .with_context(|| format!("loading model {}", path.display()))?;
    Ok(model)
}

/// Parse and validate a model from any JSON reader.
pub fn parse_model<R: std::io::Read>(reader: R) -> Result<CascadeModel> {
    let model: CascadeModel = serde_json::from_reader(reader).context("parsing model json")?;
    model.validate().context("invalid cascade model")?;
    Ok(model)
}

pub fn save_model(path: &Path, model: &CascadeModel) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("creating model {}", path.display()))?;
    serde_json::to_writer_pretty(&mut file, model)?;
    file.write_all(b"\n")?;
    Ok(())
}
