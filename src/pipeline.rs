// 🚀 Featurize Pipeline
// WaveStore → license join → TemporalTagger → EntityResolver → OutputAssembler

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::FeaturizeConfig;
use crate::entity_resolution::{CompanyMapping, EntityResolver};
use crate::license::{join_waves, LicenseRegistry, ScrapeLicenses};
use crate::output::{write_company_mapping, OutputAssembler};
use crate::tags::WaveTags;
use crate::temporal::TemporalTagger;
use crate::wave::{csv_files_in, load_waves, WaveSeries};

/// Core results, index i belonging to wave i
#[derive(Debug, Clone, Default)]
pub struct Featurized {
    pub tags: Vec<WaveTags>,
    pub companies: Vec<CompanyMapping>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub waves: usize,
    pub licensed_waves: usize,
    pub tag_schema: Vec<String>,
    pub tagged_files: Vec<PathBuf>,
    pub company_files: Vec<PathBuf>,
    pub companies_per_wave: Vec<usize>,
}

fn has_csv(dir: &Path) -> bool {
    dir.is_dir() && csv_files_in(dir).map_or(false, |files| !files.is_empty())
}

/// Load panels and, when the registry directory has files, join licenses
pub fn load_inputs(config: &FeaturizeConfig) -> Result<(WaveSeries, usize)> {
    let mut series = load_waves(&config.panel_dir)
        .with_context(|| format!("Failed to load panels from {:?}", config.panel_dir))?;
    if series.is_empty() {
        bail!("no panel files found in {:?}", config.panel_dir);
    }

    if !has_csv(&config.license_dir) {
        warn!(dir = ?config.license_dir, "no license registry, skipping license tags");
        return Ok((series, 0));
    }

    let registry = LicenseRegistry::load_dir(&config.license_dir)?;
    let scrapes = if has_csv(&config.scrape_dir) {
        Some(ScrapeLicenses::load_dir(&config.scrape_dir)?)
    } else {
        None
    };

    let licensed = join_waves(&mut series, scrapes.as_ref(), &registry);
    Ok((series, licensed))
}

/// Tag every wave, then resolve companies per wave in parallel
pub fn featurize(series: &WaveSeries, config: &FeaturizeConfig) -> Featurized {
    let tags = TemporalTagger::new(series, config).run();

    let resolver = EntityResolver::new(config.null_keys);
    let companies: Vec<CompanyMapping> = series
        .waves()
        .par_iter()
        .map(|wave| resolver.resolve(wave))
        .collect();

    Featurized { tags, companies }
}

pub fn write_outputs(
    series: &WaveSeries,
    featurized: &Featurized,
    config: &FeaturizeConfig,
) -> Result<RunSummary> {
    let assembler = OutputAssembler::new(series, &featurized.tags);
    let panel_dir = config.tagged_panel_dir();
    let company_dir = config.company_dir();

    let mut summary = RunSummary {
        waves: series.len(),
        tag_schema: assembler.schema().to_vec(),
        ..RunSummary::default()
    };

    for (i, wave) in series.waves().iter().enumerate() {
        summary.tagged_files.push(assembler.write_tagged(i, &panel_dir)?);

        if let Some(mapping) = featurized.companies.get(i) {
            summary
                .company_files
                .push(write_company_mapping(&wave.label, mapping, &company_dir)?);
            summary.companies_per_wave.push(mapping.company_count());
        }
    }

    Ok(summary)
}

/// Full batch run
pub fn run(config: &FeaturizeConfig) -> Result<RunSummary> {
    config.validate()?;

    let (series, licensed) = load_inputs(config)?;
    let featurized = featurize(&series, config);

    let mut summary = write_outputs(&series, &featurized, config)?;
    summary.licensed_waves = licensed;

    info!(
        waves = summary.waves,
        tags = summary.tag_schema.len(),
        output = ?config.output_dir,
        "featurization complete"
    );
    Ok(summary)
}
