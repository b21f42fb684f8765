// ⏰ Temporal Tagger - Lifecycle, change and license tags across waves
//
// Pass 0 (parallel): license status per wave
// Pass 1 (sequential): prefix slug unions, suffix active-license unions
// Pass 2 (parallel): every remaining per-wave tag
//
// Each wave's tags are a fresh WaveTags table; nothing is written back onto
// the series.

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::config::FeaturizeConfig;
use crate::license::{parse_access_date, parse_registry_date};
use crate::tags::{
    changed_tag, license_status_tag, WaveTags, ACTIVE_LICENSE, ASSUMED_LICENSE, CONTINUED,
    DISAPPEARED, FUTURE_LICENSE_EXPLICIT, ILLEGAL_1912, ILLEGAL_OTHER, IS_DELIVERY,
    IS_DISPENSARY, LICENSE_STATUSES, POSSIBLE_LICENSE, REAPPEARED,
};
use crate::wave::{ListingRecord, Slug, Wave, WaveSeries};

pub type TagColumn = BTreeMap<Slug, bool>;

// ============================================================================
// SERIES INDEX (Pass 1)
// ============================================================================

/// Cross-wave slug sets, built once and then shared read-only
#[derive(Debug, Clone, Default)]
pub struct SeriesIndex {
    /// Slugs present in wave i
    pub slugs_at: Vec<BTreeSet<Slug>>,

    /// Slugs present in any of waves 0..=i
    pub slugs_up_to: Vec<BTreeSet<Slug>>,

    /// Slugs active-licensed in wave i; None for waves without licenses
    pub active_at: Vec<Option<BTreeSet<Slug>>>,

    /// Slugs active-licensed in any wave strictly after i
    pub active_after: Vec<BTreeSet<Slug>>,
}

impl SeriesIndex {
    /// `license_tags[i]` holds wave i's license status tags (possibly empty)
    pub fn build(series: &WaveSeries, license_tags: &[WaveTags]) -> Self {
        let slugs_at: Vec<BTreeSet<Slug>> = series.waves().iter().map(Wave::slugs).collect();

        let mut slugs_up_to: Vec<BTreeSet<Slug>> = Vec::with_capacity(slugs_at.len());
        for slugs in &slugs_at {
            let mut union = slugs_up_to.last().cloned().unwrap_or_default();
            union.extend(slugs.iter().cloned());
            slugs_up_to.push(union);
        }

        let active_at: Vec<Option<BTreeSet<Slug>>> = series
            .waves()
            .iter()
            .zip(license_tags)
            .map(|(wave, tags)| {
                if wave.has_license() {
                    Some(tags.flagged(ACTIVE_LICENSE))
                } else {
                    None
                }
            })
            .collect();

        let n = slugs_at.len();
        let mut active_after: Vec<BTreeSet<Slug>> = vec![BTreeSet::new(); n];
        for i in (0..n.saturating_sub(1)).rev() {
            let mut union = active_after[i + 1].clone();
            if let Some(Some(active)) = active_at.get(i + 1) {
                union.extend(active.iter().cloned());
            }
            active_after[i] = union;
        }

        SeriesIndex {
            slugs_at,
            slugs_up_to,
            active_at,
            active_after,
        }
    }
}

/// Slug sets for the purge-window tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IllegalSets {
    /// Wave of the second anchor; it receives no illegal tags
    pub excluded_wave: usize,
    /// Present at the first anchor, gone at the second
    pub purged: BTreeSet<Slug>,
    /// Seen only before the first anchor, gone at the second
    pub purged_earlier: BTreeSet<Slug>,
}

// ============================================================================
// TEMPORAL TAGGER
// ============================================================================

pub struct TemporalTagger<'a> {
    series: &'a WaveSeries,
    config: &'a FeaturizeConfig,
}

impl<'a> TemporalTagger<'a> {
    pub fn new(series: &'a WaveSeries, config: &'a FeaturizeConfig) -> Self {
        TemporalTagger { series, config }
    }

    /// Tag every wave. Index i of the result belongs to wave i.
    pub fn run(&self) -> Vec<WaveTags> {
        let n = self.series.len();

        let license_tags: Vec<WaveTags> = (0..n)
            .into_par_iter()
            .map(|i| self.license_status(i).unwrap_or_default())
            .collect();

        let index = SeriesIndex::build(self.series, &license_tags);
        let illegal = self.illegal_sets(&index);
        let any_license = self.series.waves().iter().any(Wave::has_license);

        let tagged: Vec<WaveTags> = license_tags
            .into_par_iter()
            .enumerate()
            .map(|(i, license)| {
                let mut tags = self.tag_wave(i, &index, illegal.as_ref(), any_license);
                tags.merge(license);
                tags
            })
            .collect();

        info!(
            waves = n,
            licensed = index.active_at.iter().filter(|a| a.is_some()).count(),
            "tagged wave series"
        );
        tagged
    }

    /// All Pass-2 tags of one wave (license status excluded)
    pub fn tag_wave(
        &self,
        i: usize,
        index: &SeriesIndex,
        illegal: Option<&IllegalSets>,
        any_license: bool,
    ) -> WaveTags {
        let mut tags = WaveTags::new();

        if let Some(continued) = self.continuity(i) {
            tags.merge(self.adjacent_changes(i, &continued));
            tags.insert(CONTINUED, continued);
        }

        if let Some(disappeared) = self.disappearance(i) {
            tags.insert(DISAPPEARED, disappeared);
        }

        if let Some(reappeared) = self.reappearance(i, index) {
            self.apply_reappearance_changes(i, &reappeared, &mut tags);
            tags.insert(REAPPEARED, reappeared);
        }

        if any_license {
            tags.insert(ASSUMED_LICENSE, self.assumed_license(i, index));
        }

        if let Some(sets) = illegal {
            tags.merge(self.illegal_storefronts(i, sets));
        }

        tags.merge(self.listing_type(i));

        debug!(wave = i, tags = tags.len(), "tagged wave");
        tags
    }

    fn wave(&self, i: usize) -> &'a Wave {
        &self.series.waves()[i]
    }

    fn column_by<F>(&self, wave: &Wave, mut flag: F) -> TagColumn
    where
        F: FnMut(&Slug, &ListingRecord) -> bool,
    {
        wave.records
            .iter()
            .map(|(slug, record)| (slug.clone(), flag(slug, record)))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// `continued`: present in the previous wave. None for wave 0.
    pub fn continuity(&self, i: usize) -> Option<TagColumn> {
        if i == 0 || i >= self.series.len() {
            return None;
        }
        let prev = self.wave(i - 1);
        Some(self.column_by(self.wave(i), |slug, _| prev.contains(slug)))
    }

    /// `disappeared`: absent from the next wave. None for the last wave.
    pub fn disappearance(&self, i: usize) -> Option<TagColumn> {
        if i + 1 >= self.series.len() {
            return None;
        }
        let next = self.wave(i + 1);
        Some(self.column_by(self.wave(i), |slug, _| !next.contains(slug)))
    }

    /// `reappeared`: seen two or more waves back, absent from the previous
    /// wave. None before wave 2.
    pub fn reappearance(&self, i: usize, index: &SeriesIndex) -> Option<TagColumn> {
        if i < 2 || i >= self.series.len() {
            return None;
        }
        let seen_before = &index.slugs_up_to[i - 2];
        let prev = self.wave(i - 1);
        Some(self.column_by(self.wave(i), |slug, _| {
            seen_before.contains(slug) && !prev.contains(slug)
        }))
    }

    // ------------------------------------------------------------------------
    // Field changes
    // ------------------------------------------------------------------------

    /// `changed_<field>` between wave i-1 and wave i, only for continued slugs.
    ///
    /// A field missing from either schema stops the remaining fields when
    /// `short_circuit_missing_fields` is on; otherwise only that field is skipped.
    pub fn adjacent_changes(&self, i: usize, continued: &TagColumn) -> WaveTags {
        let mut tags = WaveTags::new();
        if i == 0 || i >= self.series.len() {
            return tags;
        }
        let prev = self.wave(i - 1);
        let curr = self.wave(i);

        for field in &self.config.monitored_fields {
            if !(prev.has_column(field) && curr.has_column(field)) {
                debug!(wave = i, field = %field, "field missing, skipping change tag");
                if self.config.short_circuit_missing_fields {
                    break;
                }
                continue;
            }

            let column = self.column_by(curr, |slug, record| {
                continued.get(slug).copied().unwrap_or(false)
                    && prev.get(slug).and_then(|p| p.field(field)) != record.field(field)
            });
            tags.insert(changed_tag(field), column);
        }

        tags
    }

    /// Override `changed_<field>` for reappeared slugs by comparing against the
    /// slug's most recent appearance in waves 0..=i-2
    pub fn apply_reappearance_changes(&self, i: usize, reappeared: &TagColumn, tags: &mut WaveTags) {
        if i < 2 || i >= self.series.len() {
            return;
        }
        let curr = self.wave(i);

        for field in &self.config.monitored_fields {
            if self.config.short_circuit_missing_fields {
                if !(0..=i).all(|k| self.wave(k).has_column(field)) {
                    break;
                }
            } else if !curr.has_column(field) {
                continue;
            }

            let column = match tags.column_mut(&changed_tag(field)) {
                Some(column) => column,
                None => continue,
            };

            for (slug, _) in reappeared.iter().filter(|(_, flag)| **flag) {
                let last = match self.last_appearance(slug, i - 2) {
                    Some(last) => last,
                    None => continue,
                };
                if !last.has_column(field) {
                    continue;
                }
                let before = last.get(slug).and_then(|r| r.field(field));
                let now = curr.get(slug).and_then(|r| r.field(field));
                column.insert(slug.clone(), before != now);
            }
        }
    }

    /// Latest wave in 0..=max_wave containing the slug
    pub fn last_appearance(&self, slug: &str, max_wave: usize) -> Option<&'a Wave> {
        (0..=max_wave.min(self.series.len().saturating_sub(1)))
            .rev()
            .map(|k| self.wave(k))
            .find(|wave| wave.contains(slug))
    }

    // ------------------------------------------------------------------------
    // Licenses
    // ------------------------------------------------------------------------

    /// Status category tags plus `possible_license` / `future_license_explicit`.
    /// None for waves without a license column.
    pub fn license_status(&self, i: usize) -> Option<WaveTags> {
        let wave = self.series.get(i)?;
        if !wave.has_license() {
            return None;
        }

        let mut tags = WaveTags::new();
        let evaluated: BTreeMap<&Slug, LicenseEvaluation> = wave
            .records
            .iter()
            .map(|(slug, record)| (slug, LicenseEvaluation::of(record, wave)))
            .collect();

        for status in LICENSE_STATUSES {
            let column = evaluated
                .iter()
                .map(|(slug, eval)| ((*slug).clone(), eval.has_status(status)))
                .collect();
            tags.insert(license_status_tag(status), column);
        }

        tags.insert(
            POSSIBLE_LICENSE,
            evaluated
                .iter()
                .map(|(slug, eval)| ((*slug).clone(), eval.licensed && eval.issue_date.is_none()))
                .collect(),
        );
        tags.insert(
            FUTURE_LICENSE_EXPLICIT,
            evaluated
                .iter()
                .map(|(slug, eval)| ((*slug).clone(), eval.issued_after_access()))
                .collect(),
        );

        Some(tags)
    }

    /// `assumed_license`: active-licensed in some later wave but not in this one
    pub fn assumed_license(&self, i: usize, index: &SeriesIndex) -> TagColumn {
        let empty = BTreeSet::new();
        let active_later = index.active_after.get(i).unwrap_or(&empty);
        let active_now = index
            .active_at
            .get(i)
            .and_then(Option::as_ref)
            .unwrap_or(&empty);

        self.column_by(self.wave(i), |slug, _| {
            active_later.contains(slug) && !active_now.contains(slug)
        })
    }

    // ------------------------------------------------------------------------
    // Purge window
    // ------------------------------------------------------------------------

    /// None when no purge window is configured or either anchor wave is absent
    pub fn illegal_sets(&self, index: &SeriesIndex) -> Option<IllegalSets> {
        let window = self.config.purge_window?;

        let first = self.series.index_of_date(window.first);
        let second = self.series.index_of_date(window.second);
        let (first, second) = match (first, second) {
            (Some(first), Some(second)) => (first, second),
            _ => {
                warn!(
                    first = %window.first,
                    second = %window.second,
                    "purge window anchor wave absent, skipping illegal storefront tags"
                );
                return None;
            }
        };

        let at_first = &index.slugs_at[first];
        let at_second = &index.slugs_at[second];

        let purged: BTreeSet<Slug> = at_first.difference(at_second).cloned().collect();
        let purged_earlier: BTreeSet<Slug> = if first == 0 {
            BTreeSet::new()
        } else {
            index.slugs_up_to[first - 1]
                .iter()
                .filter(|slug| !at_second.contains(*slug) && !at_first.contains(*slug))
                .cloned()
                .collect()
        };

        Some(IllegalSets {
            excluded_wave: second,
            purged,
            purged_earlier,
        })
    }

    pub fn illegal_storefronts(&self, i: usize, sets: &IllegalSets) -> WaveTags {
        let mut tags = WaveTags::new();
        if i == sets.excluded_wave {
            return tags;
        }
        let wave = self.wave(i);
        tags.insert(ILLEGAL_1912, self.column_by(wave, |slug, _| sets.purged.contains(slug)));
        tags.insert(
            ILLEGAL_OTHER,
            self.column_by(wave, |slug, _| sets.purged_earlier.contains(slug)),
        );
        tags
    }

    // ------------------------------------------------------------------------
    // Listing type
    // ------------------------------------------------------------------------

    pub fn listing_type(&self, i: usize) -> WaveTags {
        let mut tags = WaveTags::new();
        let wave = self.wave(i);
        let dispensary = self.config.dispensary_marker.as_str();
        let delivery = self.config.delivery_marker.as_str();

        tags.insert(
            IS_DISPENSARY,
            self.column_by(wave, |_, record| record.url.contains(dispensary)),
        );
        tags.insert(
            IS_DELIVERY,
            self.column_by(wave, |_, record| record.url.contains(delivery)),
        );
        tags
    }
}

// ============================================================================
// LICENSE EVALUATION
// ============================================================================

/// License facts for one record; unparseable dates never match
#[derive(Debug, Clone)]
struct LicenseEvaluation<'r> {
    licensed: bool,
    issue_date: Option<&'r str>,
    status: Option<&'r str>,
    issued: Option<chrono::NaiveDate>,
    accessed: Option<chrono::NaiveDate>,
}

impl<'r> LicenseEvaluation<'r> {
    fn of(record: &'r ListingRecord, wave: &Wave) -> Self {
        let registry = record.license_record.as_ref();
        let issue_date = registry.and_then(|r| r.issue_date.as_deref());

        LicenseEvaluation {
            licensed: record.license.is_some(),
            issue_date,
            status: registry.and_then(|r| r.status.as_deref()),
            issued: issue_date.and_then(parse_registry_date),
            accessed: match record.access_date() {
                Some(raw) => parse_access_date(raw),
                None => wave.date,
            },
        }
    }

    fn issued_by_access(&self) -> bool {
        matches!((self.issued, self.accessed), (Some(issued), Some(accessed)) if issued <= accessed)
    }

    fn issued_after_access(&self) -> bool {
        self.licensed
            && self.issue_date.is_some()
            && matches!((self.issued, self.accessed), (Some(issued), Some(accessed)) if issued > accessed)
    }

    fn has_status(&self, status: &str) -> bool {
        self.licensed
            && self.issue_date.is_some()
            && self.issued_by_access()
            && self.status.map_or(false, |s| s.contains(status))
    }
}

// ============================================================================
// TESTS
// ============================================================================
