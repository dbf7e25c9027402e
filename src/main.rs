//! Keyrelay contact extractor
//!
//! Sends every frame in the configured frames directory to Gemini, saves the
//! raw answers, then writes the unique phone numbers to CSV. With
//! `pipeline.skip_extract` set, the saved answers are reused instead.

use anyhow::{Context, Result};
use keyrelay::config::ConfigLoader;
use keyrelay::contacts::{write_csv, ContactBook};
use keyrelay::{load_records, save_records, ContactExtractor};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let loader = ConfigLoader::new().context("Failed to load configuration")?;
    let sources = loader.sources().to_vec();
    let config = loader
        .into_config()
        .context("Failed to load configuration")?;

    init_tracing(&config.log_level);
    for path in &sources {
        info!(path = %path.display(), "Loaded config file");
    }

    let pipeline = &config.pipeline;

    let records = if pipeline.skip_extract {
        info!(path = %pipeline.records_path.display(), "Reusing saved records");
        load_records(&pipeline.records_path)
            .with_context(|| format!("Failed to read {}", pipeline.records_path.display()))?
    } else {
        info!(dir = %pipeline.frames_dir.display(), "Extracting contacts from frames");
        let mut extractor =
            ContactExtractor::from_config(&config).context("Failed to set up the dispatcher")?;
        let records = extractor
            .extract_frames(&pipeline.frames_dir)
            .context("Contact extraction failed")?;
        save_records(&records, &pipeline.records_path)
            .with_context(|| format!("Failed to write {}", pipeline.records_path.display()))?;
        records
    };

    let book = ContactBook::from_records(&records, &pipeline.country_code);
    write_csv(&book, &pipeline.output_csv)
        .with_context(|| format!("Failed to write {}", pipeline.output_csv.display()))?;

    info!(
        frames = records.len(),
        unique_phones = book.len(),
        output = %pipeline.output_csv.display(),
        "Pipeline complete"
    );

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
