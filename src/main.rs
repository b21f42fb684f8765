use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use storefront_panel::{run, FeaturizeConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = parse_args(env::args().skip(1).collect())?;
    run_featurize(&config)
}

/// `featurize [--config <file.json>] [panel_dir] [output_dir]`
fn parse_args(args: Vec<String>) -> Result<FeaturizeConfig> {
    let mut config_path: Option<PathBuf> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => match iter.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => bail!("--config requires a path"),
            },
            "-h" | "--help" => {
                println!("Usage: featurize [--config <file.json>] [panel_dir] [output_dir]");
                std::process::exit(0);
            }
            _ => positional.push(arg),
        }
    }

    let mut config = match config_path {
        Some(path) => FeaturizeConfig::from_file(path)?,
        None => FeaturizeConfig::default(),
    };

    let mut positional = positional.into_iter();
    if let Some(panel_dir) = positional.next() {
        config.panel_dir = PathBuf::from(panel_dir);
    }
    if let Some(output_dir) = positional.next() {
        config.output_dir = PathBuf::from(output_dir);
    }

    Ok(config)
}

fn run_featurize(config: &FeaturizeConfig) -> Result<()> {
    println!("🌿 Storefront Panel Featurization");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📂 Panels:  {:?}", config.panel_dir);
    println!("📜 License: {:?}", config.license_dir);

    let summary = run(config)?;

    println!("\n✓ Tagged {} waves ({} with license data)", summary.waves, summary.licensed_waves);
    println!("✓ {} tags: {}", summary.tag_schema.len(), summary.tag_schema.join(", "));
    for (path, companies) in summary.company_files.iter().zip(&summary.companies_per_wave) {
        println!("  {:?} → {} companies", path.file_name().unwrap_or_default(), companies);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Outputs written to {:?}", config.output_dir);

    Ok(())
}
