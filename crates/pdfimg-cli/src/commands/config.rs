//! Config command and config file lookup shared by the other commands.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};
use console::style;
use tracing::debug;

use pdfimg_core::PdfImgConfig;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the configuration an extraction would use
    Show,

    /// Write a configuration file with default values
    Init(InitArgs),

    /// Print which configuration file is read
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Where to write the file (default: the --config path, else the user config dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

/// Where the configuration comes from.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigSource {
    /// Given with `--config`.
    Explicit(PathBuf),
    /// Found at [`default_config_path`].
    UserFile(PathBuf),
    /// No file, built-in values.
    Defaults,
}

impl ConfigSource {
    /// `--config` wins; otherwise the user file is used when it exists.
    pub fn locate(config_path: Option<&str>) -> Self {
        match config_path {
            Some(path) => Self::Explicit(PathBuf::from(path)),
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::UserFile(path),
                _ => Self::Defaults,
            },
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Explicit(path) | Self::UserFile(path) => Some(path),
            Self::Defaults => None,
        }
    }

    pub fn load(&self) -> anyhow::Result<PdfImgConfig> {
        match self.path() {
            Some(path) => {
                debug!("Reading config from {}", path.display());
                PdfImgConfig::from_file(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))
            }
            None => Ok(PdfImgConfig::default()),
        }
    }
}

/// `<user config dir>/pdfimg/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pdfimg").join("config.json"))
}

pub fn run(args: ConfigArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let source = ConfigSource::locate(config_path);
    match args.command {
        ConfigCommand::Show => show_config(&source),
        ConfigCommand::Init(init_args) => init_config(init_args, config_path),
        ConfigCommand::Path => show_path(&source),
    }
}

fn show_config(source: &ConfigSource) -> anyhow::Result<()> {
    let config = source.load()?;
    match source.path() {
        Some(path) => eprintln!("{} Using {}", style("ℹ").blue(), path.display()),
        None => eprintln!("{} No config file found, showing defaults.", style("ℹ").blue()),
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn init_config(args: InitArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let output_path = args
        .output
        .or_else(|| config_path.map(PathBuf::from))
        .or_else(default_config_path)
        .context("no config directory on this system, pass --output")?;

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    PdfImgConfig::default().save(&output_path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );
    Ok(())
}

fn show_path(source: &ConfigSource) -> anyhow::Result<()> {
    match source {
        ConfigSource::Explicit(path) => {
            println!("Configuration file: {} (from --config)", path.display());
            if !path.is_file() {
                println!("Status: {}", style("missing").red());
            }
        }
        ConfigSource::UserFile(path) => {
            println!("Configuration file: {}", path.display());
            println!("Status: {}", style("exists").green());
        }
        ConfigSource::Defaults => {
            match default_config_path() {
                Some(path) => println!("Configuration file: {}", path.display()),
                None => println!("Configuration file: none"),
            }
            println!("Status: {}", style("not created").yellow());
            println!();
            println!("Run 'pdfimg config init' to create a configuration file.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let source = ConfigSource::locate(Some("custom.json"));
        assert_eq!(source, ConfigSource::Explicit(PathBuf::from("custom.json")));
        assert_eq!(source.path(), Some(Path::new("custom.json")));
    }

    #[test]
    fn test_defaults_load_without_file() {
        let config = ConfigSource::Defaults.load().unwrap();
        assert_eq!(config.output.file_prefix, "img_");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = ConfigSource::Explicit(dir.path().join("absent.json"));
        let err = source.load().unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
