// Storefront Panel - Core Library
// Cross-wave tagging and per-wave company resolution for storefront panels

pub mod config;
pub mod entity_resolution;
pub mod error;
pub mod license;
pub mod output;
pub mod pipeline;
pub mod tags;
pub mod temporal;
pub mod union_find;
pub mod wave;

// Re-export commonly used types
pub use config::{FeaturizeConfig, PurgeWindow};
pub use entity_resolution::{CompanyId, CompanyKeys, CompanyMapping, EntityResolver, NullKeyPolicy};
pub use error::FeaturizeError;
pub use license::{join_waves, LicenseRecord, LicenseRegistry, ScrapeLicenses};
pub use output::{write_company_mapping, OutputAssembler, TaggedPanel};
pub use pipeline::{featurize, load_inputs, run, write_outputs, Featurized, RunSummary};
pub use tags::{TagValue, WaveTags};
pub use temporal::{IllegalSets, SeriesIndex, TemporalTagger};
pub use union_find::DisjointSet;
pub use wave::{load_waves, ListingRecord, Slug, Wave, WaveSeries};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
