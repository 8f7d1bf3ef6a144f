//! Utility functions for CLI commands.

use std::path::Path;
use std::sync::Arc;

use facematch_catalog::RedbCatalog;
use facematch_faceid::{Config, FaceIndex};

use crate::Cli;

/// Loads the index config, falling back to defaults.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let cfg = match cli.config.as_deref() {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str::<Config>(&content)?
        }
        None => Config::default(),
    };
    Ok(cfg.with_defaults())
}

/// Opens the index and its redb catalog.
pub fn open_index(cli: &Cli) -> anyhow::Result<(FaceIndex, Arc<RedbCatalog>)> {
    let cfg = load_config(cli)?;
    print_verbose(
        cli,
        &format!(
            "index: {}, catalog: {}",
            cfg.index_path.display(),
            cli.db
        ),
    );
    let catalog = Arc::new(RedbCatalog::open(&cli.db)?);
    let index = FaceIndex::open(cfg, catalog.clone(), catalog.clone())?;
    Ok((index, catalog))
}

/// Loads an embedding from a YAML or JSON file holding a list of floats.
pub fn load_vector(path: &str) -> anyhow::Result<Vec<f32>> {
    let content = std::fs::read_to_string(path)?;
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("yaml");

    let result = match ext.to_lowercase().as_str() {
        "json" => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };

    Ok(result)
}

/// Reads an optional image file.
pub fn load_image(path: Option<&str>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(p) => Ok(std::fs::read(p)?),
        None => Ok(Vec::new()),
    }
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: serde::Serialize>(
    result: &T,
    output_path: Option<&str>,
    as_json: bool,
) -> anyhow::Result<()> {
    let output = if as_json {
        serde_json::to_string_pretty(result)?
    } else {
        serde_yaml::to_string(result)?
    };

    match output_path {
        Some(path) => std::fs::write(path, output)?,
        None => print!("{}", output),
    }

    Ok(())
}

/// Prints verbose output if enabled.
pub fn print_verbose(cli: &Cli, msg: &str) {
    if cli.verbose {
        eprintln!("[verbose] {}", msg);
    }
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}
