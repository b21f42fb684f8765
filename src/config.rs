// ⚙️ Featurize Configuration - Config as Data
// Directories, monitored fields, purge window anchors and resolution policy

use anyhow::{Context as AnyhowContext, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::entity_resolution::NullKeyPolicy;
use crate::error::FeaturizeError;

pub const DEFAULT_PANEL_DIR: &str = "input/panel";
pub const DEFAULT_LICENSE_DIR: &str = "input/license";
pub const DEFAULT_SCRAPE_DIR: &str = "input/scrapes";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

pub const DEFAULT_DISPENSARY_MARKER: &str = "weedmaps.com/dispensaries/";
pub const DEFAULT_DELIVERY_MARKER: &str = "weedmaps.com/deliveries/";

// ============================================================================
// PURGE WINDOW
// ============================================================================

/// Two wave dates bracketing a known marketplace purge.
///
/// Listings present at `first` but gone at `second` are tagged `illegal_1912`;
/// listings seen only before `first` and gone at `second` are `illegal_other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeWindow {
    pub first: NaiveDate,
    pub second: NaiveDate,
}

impl Default for PurgeWindow {
    fn default() -> Self {
        PurgeWindow {
            first: NaiveDate::from_ymd_opt(2019, 12, 21).unwrap_or_default(),
            second: NaiveDate::from_ymd_opt(2020, 1, 12).unwrap_or_default(),
        }
    }
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturizeConfig {
    /// Directory of dated panel CSVs (`YYMMDD*.csv`)
    pub panel_dir: PathBuf,

    /// Directory of license registry CSVs
    pub license_dir: PathBuf,

    /// Directory of raw storefront scrapes carrying license numbers
    pub scrape_dir: PathBuf,

    /// Root for `panel/` and `company/` outputs
    pub output_dir: PathBuf,

    /// Columns watched for `changed_<field>` tags
    pub monitored_fields: Vec<String>,

    /// None disables illegal-storefront tagging
    pub purge_window: Option<PurgeWindow>,

    /// Stop checking the remaining monitored fields of a wave as soon as one
    /// is missing from the schema
    pub short_circuit_missing_fields: bool,

    /// Whether missing email/phone/products act as a shared bucket key
    pub null_keys: NullKeyPolicy,

    pub dispensary_marker: String,
    pub delivery_marker: String,
}

impl Default for FeaturizeConfig {
    fn default() -> Self {
        FeaturizeConfig {
            panel_dir: PathBuf::from(DEFAULT_PANEL_DIR),
            license_dir: PathBuf::from(DEFAULT_LICENSE_DIR),
            scrape_dir: PathBuf::from(DEFAULT_SCRAPE_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            monitored_fields: vec![
                "address".to_string(),
                "dispensary_name".to_string(),
                "email".to_string(),
            ],
            purge_window: Some(PurgeWindow::default()),
            short_circuit_missing_fields: true,
            null_keys: NullKeyPolicy::default(),
            dispensary_marker: DEFAULT_DISPENSARY_MARKER.to_string(),
            delivery_marker: DEFAULT_DELIVERY_MARKER.to_string(),
        }
    }
}

impl FeaturizeConfig {
    /// Load config from JSON file; absent keys take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: FeaturizeConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), FeaturizeError> {
        if let Some(field) = self.monitored_fields.iter().find(|f| f.trim().is_empty()) {
            return Err(FeaturizeError::InvalidConfig(format!(
                "monitored field name must not be blank: {:?}",
                field
            )));
        }

        if let Some(window) = self.purge_window {
            if window.first >= window.second {
                return Err(FeaturizeError::InvalidConfig(format!(
                    "purge window first anchor {} must precede second anchor {}",
                    window.first, window.second
                )));
            }
        }

        if self.dispensary_marker.is_empty() || self.delivery_marker.is_empty() {
            return Err(FeaturizeError::InvalidConfig(
                "listing type markers must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn tagged_panel_dir(&self) -> PathBuf {
        self.output_dir.join("panel")
    }

    pub fn company_dir(&self) -> PathBuf {
        self.output_dir.join("company")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = FeaturizeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitored_fields.len(), 3);
        assert!(config.short_circuit_missing_fields);
        assert_eq!(config.null_keys, NullKeyPolicy::ExcludeMissing);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"output_dir": "out", "purge_window": {{"first": "2020-03-01", "second": "2020-04-01"}}, "null_keys": "union_missing"}}"#
        )
        .unwrap();

        let config = FeaturizeConfig::from_file(file.path()).unwrap();

        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.panel_dir, PathBuf::from(DEFAULT_PANEL_DIR));
        assert_eq!(config.null_keys, NullKeyPolicy::UnionMissing);
        assert_eq!(
            config.purge_window.unwrap().first,
            NaiveDate::from_ymd_opt(2020, 3, 1).unwrap()
        );
    }

    #[test]
    fn test_inverted_purge_window_rejected() {
        let config = FeaturizeConfig {
            purge_window: Some(PurgeWindow {
                first: NaiveDate::from_ymd_opt(2020, 1, 12).unwrap(),
                second: NaiveDate::from_ymd_opt(2019, 12, 21).unwrap(),
            }),
            ..FeaturizeConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(FeaturizeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_blank_monitored_field_rejected() {
        let config = FeaturizeConfig {
            monitored_fields: vec!["address".to_string(), " ".to_string()],
            ..FeaturizeConfig::default()
        };

        assert!(config.validate().is_err());
    }
}
