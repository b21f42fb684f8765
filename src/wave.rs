// 🌊 Wave Store - Dated panel snapshots loaded from CSV
// One panel file per wave; rows collapse to one ListingRecord per slug.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::FeaturizeError;
use crate::license::LicenseRecord;

pub type Slug = String;

pub const URL_COLUMN: &str = "url";
pub const SLUG_COLUMN: &str = "slug";
pub const PHONE_COLUMN: &str = "phone";
pub const STD_PHONE_COLUMN: &str = "stdrd_phone";
pub const EMAIL_COLUMN: &str = "email";
pub const NAME_COLUMN: &str = "dispensary_name";
pub const ADDRESS_COLUMN: &str = "address";
pub const PRODUCT_COLUMN: &str = "product_name";
pub const LICENSE_COLUMN: &str = "license";
pub const ACCESS_DATE_COLUMN: &str = "access_date";

/// Wave labels are the first six characters of the panel file name
pub const LABEL_LEN: usize = 6;
const LABEL_DATE_FORMAT: &str = "%y%m%d";

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Slug = last path segment of the listing URL
pub fn slug_from_url(url: &str) -> Option<Slug> {
    let url = url.trim();
    if !url.contains('/') {
        return None;
    }
    let slug = url.rsplit('/').next()?;
    if slug.is_empty() {
        None
    } else {
        Some(slug.to_string())
    }
}

/// Standardize to `1##########`; None when the number is unusable
pub fn standardize_phone(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let first = raw.chars().next()?;
    if !(first.is_ascii_digit() || first == '(') {
        return None;
    }

    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    // North American area codes never start with 0 or 1
    let with_country = if digits.starts_with('1') {
        digits
    } else {
        format!("1{}", digits)
    };
    let standardized: String = with_country.chars().take(11).collect();

    if standardized.len() != 11 || standardized.contains("000000") {
        return None;
    }
    Some(standardized)
}

pub fn label_from_file_name(name: &str) -> String {
    name.chars().take(LABEL_LEN).collect()
}

pub fn date_from_label(label: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(label, LABEL_DATE_FORMAT).ok()
}

// ============================================================================
// LISTING RECORD
// ============================================================================

/// One storefront in one wave, collapsed from every row sharing its slug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub slug: Slug,
    pub url: String,

    /// First non-empty value per column across the slug's rows
    pub fields: BTreeMap<String, String>,

    /// Every product offered under this slug
    pub product_names: BTreeSet<String>,

    /// License number, from the panel itself or a matching scrape
    pub license: Option<String>,

    /// Registry entry for `license`, when one matched
    pub license_record: Option<LicenseRecord>,
}

impl ListingRecord {
    pub fn new(slug: &str, url: &str) -> Self {
        ListingRecord {
            slug: slug.to_string(),
            url: url.to_string(),
            fields: BTreeMap::new(),
            product_names: BTreeSet::new(),
            license: None,
            license_record: None,
        }
    }

    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.field(EMAIL_COLUMN)
    }

    pub fn phone(&self) -> Option<&str> {
        self.field(STD_PHONE_COLUMN)
    }

    pub fn access_date(&self) -> Option<&str> {
        self.field(ACCESS_DATE_COLUMN)
    }

    fn absorb_row(&mut self, headers: &[String], values: &[String]) {
        for (column, value) in headers.iter().zip(values) {
            if value.is_empty() {
                continue;
            }
            if column == PRODUCT_COLUMN {
                self.product_names.insert(value.clone());
            }
            self.fields
                .entry(column.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

// ============================================================================
// PANEL TABLE (untrimmed rows, kept for output)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelTable {
    pub headers: Vec<String>,
    pub rows: Vec<PanelRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub slug: Slug,
    /// Aligned with `PanelTable::headers`
    pub values: Vec<String>,
}

// ============================================================================
// WAVE
// ============================================================================

#[derive(Debug, Clone)]
pub struct Wave {
    pub index: usize,
    pub label: String,
    pub date: Option<NaiveDate>,
    /// Schema of the wave after cleaning and any license join
    pub columns: BTreeSet<String>,
    pub records: BTreeMap<Slug, ListingRecord>,
    pub table: PanelTable,
    /// Set by the registry join; a raw `license` column alone does not count
    pub licensed: bool,
}

impl Wave {
    /// Clean raw panel rows and collapse them to one record per slug.
    ///
    /// Rows without a usable URL are dropped. A `phone` column gains a
    /// standardized `stdrd_phone` companion; `dispensary_name` is lowercased
    /// and trimmed.
    pub fn from_rows(
        index: usize,
        label: &str,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> std::result::Result<Wave, FeaturizeError> {
        let url_idx = headers
            .iter()
            .position(|h| h == URL_COLUMN)
            .ok_or_else(|| FeaturizeError::MissingRequiredSchema {
                wave: label.to_string(),
                column: URL_COLUMN.to_string(),
            })?;
        let phone_idx = headers.iter().position(|h| h == PHONE_COLUMN);
        let name_idx = headers.iter().position(|h| h == NAME_COLUMN);

        let mut headers = headers;
        if phone_idx.is_some() {
            headers.push(STD_PHONE_COLUMN.to_string());
        }

        let mut table_rows = Vec::with_capacity(rows.len());
        let mut dropped = 0usize;

        for mut values in rows {
            values.resize(headers.len() - usize::from(phone_idx.is_some()), String::new());
            let slug = match slug_from_url(&values[url_idx]) {
                Some(slug) => slug,
                None => {
                    dropped += 1;
                    continue;
                }
            };

            if let Some(idx) = name_idx {
                values[idx] = values[idx].trim().to_lowercase();
            }
            if let Some(idx) = phone_idx {
                let standardized = standardize_phone(&values[idx]).unwrap_or_default();
                values.push(standardized);
            }

            table_rows.push(PanelRow { slug, values });
        }

        if dropped > 0 {
            debug!(wave = label, dropped, "dropped rows without a usable url");
        }

        let mut records: BTreeMap<Slug, ListingRecord> = BTreeMap::new();
        for row in &table_rows {
            let record = records.entry(row.slug.clone()).or_insert_with(|| {
                ListingRecord::new(&row.slug, &row.values[url_idx])
            });
            record.absorb_row(&headers, &row.values);
        }

        for record in records.values_mut() {
            record.license = record
                .field(LICENSE_COLUMN)
                .and_then(crate::license::normalize_license_number);
        }

        let mut columns: BTreeSet<String> = headers.iter().cloned().collect();
        columns.insert(SLUG_COLUMN.to_string());

        Ok(Wave {
            index,
            label: label.to_string(),
            date: date_from_label(label),
            columns,
            records,
            table: PanelTable {
                headers,
                rows: table_rows,
            },
            licensed: false,
        })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// True once license numbers were joined against the registry
    pub fn has_license(&self) -> bool {
        self.licensed
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.records.contains_key(slug)
    }

    pub fn get(&self, slug: &str) -> Option<&ListingRecord> {
        self.records.get(slug)
    }

    pub fn slugs(&self) -> BTreeSet<Slug> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// WAVE SERIES
// ============================================================================

/// Immutable, date-ordered context handed to every core operation
#[derive(Debug, Clone, Default)]
pub struct WaveSeries {
    waves: Vec<Wave>,
}

impl WaveSeries {
    /// Waves are re-indexed in the order given
    pub fn new(mut waves: Vec<Wave>) -> Self {
        for (i, wave) in waves.iter_mut().enumerate() {
            wave.index = i;
        }
        WaveSeries { waves }
    }

    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    pub fn waves_mut(&mut self) -> &mut [Wave] {
        &mut self.waves
    }

    pub fn get(&self, i: usize) -> Option<&Wave> {
        self.waves.get(i)
    }

    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    pub fn index_of_date(&self, date: NaiveDate) -> Option<usize> {
        self.waves.iter().position(|w| w.date == Some(date))
    }

    pub fn index_of_label(&self, label: &str) -> Option<usize> {
        self.waves.iter().position(|w| w.label == label)
    }
}

// ============================================================================
// CSV LOADING
// ============================================================================

/// CSV files in a directory, sorted by name
pub fn csv_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Headers plus raw string rows; short rows are padded later
pub fn read_table(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;

    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("Failed to read row in {:?}", path))?;
        rows.push(record.iter().map(|v| v.trim().to_string()).collect());
    }

    Ok((headers, rows))
}

/// Load every panel in `dir` as a date-ordered wave series
pub fn load_waves(dir: &Path) -> Result<WaveSeries> {
    let files = csv_files_in(dir)?;
    let mut waves = Vec::with_capacity(files.len());

    for (index, path) in files.iter().enumerate() {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let label = label_from_file_name(&file_name);

        let (headers, rows) = read_table(path)?;
        let wave = Wave::from_rows(index, &label, headers, rows)
            .with_context(|| format!("Failed to load panel {:?}", path))?;

        debug!(wave = %wave.label, rows = wave.table.rows.len(), slugs = wave.len(), "loaded panel");
        waves.push(wave);
    }

    info!(waves = waves.len(), dir = ?dir, "loaded wave series");
    Ok(WaveSeries::new(waves))
}

// ============================================================================
// TESTS
// ============================================================================
