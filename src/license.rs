// 📜 License Registry - State license lookup + scrape license join
// Registry CSVs are normalized once; waves pick up license numbers from
// storefront scrapes and registry entries by license number.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::FeaturizeError;
use crate::wave::{
    csv_files_in, label_from_file_name, read_table, slug_from_url, Slug, WaveSeries,
    LICENSE_COLUMN, URL_COLUMN,
};

/// Registry columns kept, by their raw header
pub const REGISTRY_FIELDS: [&str; 6] = [
    "License Number",
    "License Type",
    "Status",
    "Status Date",
    "Issue Date",
    "Adult-Use/Medicinal",
];

pub const BUSINESS_TYPE_COLUMN: &str = "license_business_type";
pub const STATUS_COLUMN: &str = "status";
pub const STATUS_DATE_COLUMN: &str = "status_date";
pub const ISSUE_DATE_COLUMN: &str = "issue_date";
pub const USE_COLUMN: &str = "adult_use/medicinal";

/// Columns a license-bearing wave gains from the registry join, output order
pub const JOINED_COLUMNS: [&str; 6] = [
    LICENSE_COLUMN,
    BUSINESS_TYPE_COLUMN,
    STATUS_COLUMN,
    STATUS_DATE_COLUMN,
    ISSUE_DATE_COLUMN,
    USE_COLUMN,
];

/// Scrape column holding the storefront's first state license number
pub const SCRAPE_LICENSE_COLUMN: &str = "state_license_number_1";

const REGISTRY_DATE_FORMAT: &str = "%m/%d/%Y";
const ACCESS_DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Trimmed, lowercased license number; placeholder values count as absent
pub fn normalize_license_number(raw: &str) -> Option<String> {
    let license = raw.trim().to_lowercase();
    match license.as_str() {
        "" | "n/a" | "na" => None,
        _ => Some(license),
    }
}

/// `License Type` → `license_type`, `Adult-Use/Medicinal` → `adult_use/medicinal`
pub fn snake_case_column(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' || c == '.' { '_' } else { c })
        .collect()
}

pub fn parse_registry_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), REGISTRY_DATE_FORMAT).ok()
}

pub fn parse_access_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), ACCESS_DATE_FORMAT).ok()
}

// ============================================================================
// LICENSE RECORD
// ============================================================================

/// Normalized registry entry; all text lowercased
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub license: String,
    pub business_type: Option<String>,
    /// Free text, may hold several status words ("active, pending renewal")
    pub status: Option<String>,
    pub status_date: Option<String>,
    pub issue_date: Option<String>,
    pub adult_use_medicinal: Option<String>,
}

impl LicenseRecord {
    pub fn new(license: &str) -> Self {
        LicenseRecord {
            license: license.to_string(),
            business_type: None,
            status: None,
            status_date: None,
            issue_date: None,
            adult_use_medicinal: None,
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_lowercase());
        self
    }

    pub fn with_issue_date(mut self, issue_date: &str) -> Self {
        self.issue_date = Some(issue_date.to_string());
        self
    }

    /// Joined column value by output column name
    pub fn column(&self, column: &str) -> Option<&str> {
        match column {
            LICENSE_COLUMN => Some(self.license.as_str()),
            BUSINESS_TYPE_COLUMN => self.business_type.as_deref(),
            STATUS_COLUMN => self.status.as_deref(),
            STATUS_DATE_COLUMN => self.status_date.as_deref(),
            ISSUE_DATE_COLUMN => self.issue_date.as_deref(),
            USE_COLUMN => self.adult_use_medicinal.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// LICENSE REGISTRY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct LicenseRegistry {
    records: HashMap<String, LicenseRecord>,
}

impl LicenseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<I: IntoIterator<Item = LicenseRecord>>(records: I) -> Self {
        let mut registry = LicenseRegistry::new();
        for record in records {
            registry.insert(record);
        }
        registry
    }

    /// First entry per license number wins
    pub fn insert(&mut self, mut record: LicenseRecord) {
        if let Some(key) = normalize_license_number(&record.license) {
            record.license = key.clone();
            self.records.entry(key).or_insert(record);
        }
    }

    /// Load and concatenate every registry CSV in `dir`
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut registry = LicenseRegistry::new();
        let mut dropped = 0usize;

        for path in csv_files_in(dir)? {
            let (headers, rows) = read_table(&path)?;
            dropped += registry
                .absorb_table(&headers, rows)
                .map_err(|e| match e {
                    FeaturizeError::MissingRegistryColumn { column, .. } => {
                        FeaturizeError::MissingRegistryColumn {
                            path: path.clone(),
                            column,
                        }
                    }
                    other => other,
                })
                .with_context(|| format!("Failed to load license registry {:?}", path))?;
        }

        if dropped > 0 {
            debug!(dropped, "dropped registry rows without a dated issue date");
        }
        info!(licenses = registry.len(), "loaded license registry");
        Ok(registry)
    }

    /// Add one registry table; returns the number of rows dropped for lacking
    /// a `/`-dated issue date
    pub fn absorb_table(
        &mut self,
        headers: &[String],
        rows: Vec<Vec<String>>,
    ) -> std::result::Result<usize, FeaturizeError> {
        let position = |raw: &str| headers.iter().position(|h| h.trim() == raw);

        let license_idx =
            position(REGISTRY_FIELDS[0]).ok_or_else(|| FeaturizeError::MissingRegistryColumn {
                path: Default::default(),
                column: REGISTRY_FIELDS[0].to_string(),
            })?;

        let mut column_idx: HashMap<String, usize> = HashMap::new();
        for raw in REGISTRY_FIELDS.iter().skip(1) {
            if let Some(idx) = position(raw) {
                let column = match snake_case_column(raw).as_str() {
                    "license_type" => BUSINESS_TYPE_COLUMN.to_string(),
                    other => other.to_string(),
                };
                column_idx.insert(column, idx);
            }
        }

        let cell = |row: &[String], column: &str| -> Option<String> {
            let value = row.get(*column_idx.get(column)?)?.trim().to_lowercase();
            if value.is_empty() {
                None
            } else {
                Some(value)
            }
        };

        let mut dropped = 0;
        for row in rows {
            let license = match row.get(license_idx) {
                Some(license) => license.clone(),
                None => continue,
            };
            let issue_date = cell(&row, ISSUE_DATE_COLUMN);
            if column_idx.contains_key(ISSUE_DATE_COLUMN)
                && !issue_date.as_deref().map_or(false, |d| d.contains('/'))
            {
                dropped += 1;
                continue;
            }

            self.insert(LicenseRecord {
                license,
                business_type: cell(&row, BUSINESS_TYPE_COLUMN),
                status: cell(&row, STATUS_COLUMN),
                status_date: cell(&row, STATUS_DATE_COLUMN),
                issue_date,
                adult_use_medicinal: cell(&row, USE_COLUMN),
            });
        }

        Ok(dropped)
    }

    /// Case- and whitespace-insensitive lookup
    pub fn lookup(&self, license: &str) -> Option<&LicenseRecord> {
        self.records.get(&normalize_license_number(license)?)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// SCRAPE LICENSES
// ============================================================================

/// License numbers found in raw storefront scrapes, by wave label then slug
#[derive(Debug, Clone, Default)]
pub struct ScrapeLicenses {
    by_label: BTreeMap<String, BTreeMap<Slug, Option<String>>>,
}

impl ScrapeLicenses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: &str, slug: &str, license: Option<String>) {
        self.by_label
            .entry(label.to_string())
            .or_default()
            .entry(slug.to_string())
            .or_insert(license);
    }

    /// Scrapes without a license column are skipped
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut scrapes = ScrapeLicenses::new();

        for path in csv_files_in(dir)? {
            let (headers, rows) = read_table(&path)?;
            let url_idx = headers.iter().position(|h| h == URL_COLUMN);
            let license_idx = headers.iter().position(|h| h == SCRAPE_LICENSE_COLUMN);

            let (url_idx, license_idx) = match (url_idx, license_idx) {
                (Some(u), Some(l)) => (u, l),
                _ => {
                    debug!(file = ?path, "scrape has no license column, skipping");
                    continue;
                }
            };

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let label = label_from_file_name(&file_name);

            for row in rows {
                let slug = match row.get(url_idx).and_then(|url| slug_from_url(url)) {
                    Some(slug) => slug,
                    None => continue,
                };
                let license = row
                    .get(license_idx)
                    .and_then(|l| normalize_license_number(l));
                scrapes.insert(&label, &slug, license);
            }
        }

        info!(scrapes = scrapes.by_label.len(), "loaded license scrapes");
        Ok(scrapes)
    }

    pub fn for_label(&self, label: &str) -> Option<&BTreeMap<Slug, Option<String>>> {
        self.by_label.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.by_label.keys().map(String::as_str)
    }
}

// ============================================================================
// JOIN
// ============================================================================

/// Attach scrape license numbers and registry entries to every wave.
///
/// A scrape replaces the wave's license numbers (slugs missing from the
/// scrape end up unlicensed). Waves with a license column afterwards gain the
/// registry columns and are marked licensed. Returns the number of
/// license-bearing waves.
pub fn join_waves(
    series: &mut WaveSeries,
    scrapes: Option<&ScrapeLicenses>,
    registry: &LicenseRegistry,
) -> usize {
    if let Some(scrapes) = scrapes {
        for label in scrapes.labels() {
            if series.index_of_label(label).is_none() {
                warn!(scrape = label, "license scrape matches no panel wave");
            }
        }
    }

    let mut licensed = 0;
    for wave in series.waves_mut() {
        if let Some(scraped) = scrapes.and_then(|s| s.for_label(&wave.label)) {
            for (slug, record) in wave.records.iter_mut() {
                record.license = scraped.get(slug).cloned().flatten();
            }
            wave.columns.insert(LICENSE_COLUMN.to_string());
        }

        if !wave.has_column(LICENSE_COLUMN) {
            continue;
        }

        let mut matched = 0usize;
        for record in wave.records.values_mut() {
            record.license_record = record
                .license
                .as_deref()
                .and_then(|license| registry.lookup(license))
                .cloned();
            if record.license_record.is_some() {
                matched += 1;
            }
        }
        for column in JOINED_COLUMNS {
            wave.columns.insert(column.to_string());
        }
        wave.licensed = true;

        debug!(wave = %wave.label, matched, "joined license registry");
        licensed += 1;
    }

    licensed
}

// ============================================================================
// TESTS
// ============================================================================
