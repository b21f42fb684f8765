// 📤 Output Assembler - Tags merged back onto the untrimmed panel rows
// One tagged panel and one company mapping per wave.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::entity_resolution::CompanyMapping;
use crate::license::JOINED_COLUMNS;
use crate::tags::{unified_tag_schema, WaveTags};
use crate::wave::{Wave, WaveSeries, LICENSE_COLUMN, SLUG_COLUMN};

/// In-memory tagged panel, ready to write
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedPanel {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub struct OutputAssembler<'a> {
    series: &'a WaveSeries,
    tags: &'a [WaveTags],
    /// Union of tag names over all waves
    schema: Vec<String>,
    /// Registry columns written for every wave once any wave carries them
    joined: Vec<&'static str>,
}

impl<'a> OutputAssembler<'a> {
    /// `tags[i]` belongs to wave i
    pub fn new(series: &'a WaveSeries, tags: &'a [WaveTags]) -> Self {
        let joined = if series.waves().iter().any(Wave::has_license) {
            JOINED_COLUMNS.to_vec()
        } else {
            Vec::new()
        };

        OutputAssembler {
            series,
            tags,
            schema: unified_tag_schema(tags),
            joined,
        }
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    /// Original columns, slug, registry columns, then every tag. Cells of tags
    /// not computed for this wave hold the not-applicable marker.
    pub fn tagged_panel(&self, i: usize) -> TaggedPanel {
        let wave = &self.series.waves()[i];
        let empty = WaveTags::default();
        let tags = self.tags.get(i).unwrap_or(&empty);

        let original = &wave.table.headers;
        let slug_missing = !original.iter().any(|h| h == SLUG_COLUMN);
        let joined: Vec<&str> = self
            .joined
            .iter()
            .copied()
            .filter(|c| !original.iter().any(|h| h == c))
            .collect();

        let mut headers = original.clone();
        if slug_missing {
            headers.push(SLUG_COLUMN.to_string());
        }
        headers.extend(joined.iter().map(|c| c.to_string()));
        headers.extend(self.schema.iter().cloned());

        let rows = wave
            .table
            .rows
            .iter()
            .map(|row| {
                let mut values = row.values.clone();
                values.resize(original.len(), String::new());
                if slug_missing {
                    values.push(row.slug.clone());
                }

                let record = wave.get(&row.slug);
                for column in &joined {
                    let value = record.and_then(|r| {
                        if *column == LICENSE_COLUMN {
                            r.license.as_deref()
                        } else {
                            r.license_record.as_ref().and_then(|lr| lr.column(column))
                        }
                    });
                    values.push(value.unwrap_or_default().to_string());
                }

                for tag in &self.schema {
                    values.push(tags.value(tag, &row.slug).to_string());
                }
                values
            })
            .collect();

        TaggedPanel { headers, rows }
    }

    /// `<dir>/<label>_tagged.csv`
    pub fn write_tagged(&self, i: usize, dir: &Path) -> Result<PathBuf> {
        let wave = &self.series.waves()[i];
        let panel = self.tagged_panel(i);
        let path = dir.join(format!("{}_tagged.csv", wave.label));

        write_rows(&path, &panel.headers, &panel.rows)?;
        debug!(wave = %wave.label, rows = panel.rows.len(), path = ?path, "wrote tagged panel");
        Ok(path)
    }
}

/// `<dir>/<label>_company_mapping.csv` with `slug,company_id`
pub fn write_company_mapping(label: &str, mapping: &CompanyMapping, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(format!("{}_company_mapping.csv", label));
    let rows: Vec<Vec<String>> = mapping
        .iter()
        .map(|(slug, company)| vec![slug.clone(), company.clone()])
        .collect();

    write_rows(&path, &[SLUG_COLUMN.to_string(), "company_id".to_string()], &rows)?;
    debug!(wave = label, companies = mapping.company_count(), "wrote company mapping");
    Ok(path)
}

fn write_rows(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }

    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output file: {:?}", path))?;
    wtr.write_record(headers)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to flush output file: {:?}", path))?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
