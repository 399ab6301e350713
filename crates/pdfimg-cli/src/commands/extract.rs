//! Extract command - recover every image of a single PDF.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use pdfimg_core::{PdfImgConfig, ReconstructionPolicy, extract_pdf};

use super::config::ConfigSource;

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Root directory for extracted images (default: extracted_images)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Skip images that cannot be rebuilt instead of stopping
    #[arg(long)]
    skip_unrecoverable: bool,

    /// Quality for images re-encoded as JPEG (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: Option<u8>,
}

pub fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = ConfigSource::locate(config_path).load()?;
    apply_overrides(&mut config, &args);
    // Relative roots live under the directory pdfimg was launched from.
    config.output.anchor_root(&std::env::current_dir()?);

    // Check input file exists
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Extracting images from {}", args.input.display());

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {msg}")?
            .progress_chars("##-"),
    );

    let summary = extract_pdf(&args.input, &config, |xref, total| {
        pb.set_length(u64::from(total));
        pb.set_position(u64::from(xref));
        pb.set_message(format!("Scanning object {} of {}", xref, total));
        ControlFlow::Continue(())
    });
    pb.finish_and_clear();
    let summary = summary?;

    debug!("Scanned {} objects", summary.object_count);

    println!(
        "{} Extracted {} images to {}. Job took {:.2} seconds",
        style("✓").green(),
        summary.image_count,
        summary.output_dir.display(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Command-line flags take precedence over the config file.
fn apply_overrides(config: &mut PdfImgConfig, args: &ExtractArgs) {
    if let Some(dir) = &args.output_dir {
        config.output.root_dir = dir.clone();
    }
    if args.skip_unrecoverable {
        config.extraction.on_reconstruction_error = ReconstructionPolicy::Skip;
    }
    if let Some(quality) = args.jpeg_quality {
        config.extraction.jpeg_quality = quality;
    }
}
