// 🏢 Entity Resolution - Storefronts → companies, one wave at a time
// Storefronts sharing a product offering, an email or a phone belong to the
// same company. Company ids are fresh per call and never stable across waves.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use tracing::debug;
use uuid::Uuid;

use crate::union_find::DisjointSet;
use crate::wave::{ListingRecord, Slug, Wave, PHONE_COLUMN};

pub type CompanyId = String;

// ============================================================================
// NULL KEY POLICY
// ============================================================================

/// How storefronts with no email / phone / products are bucketed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKeyPolicy {
    /// The missing value is itself a key: every storefront lacking an email
    /// lands in one company
    UnionMissing,

    /// Missing values never link storefronts
    #[default]
    ExcludeMissing,
}

// ============================================================================
// COMPANY KEYS
// ============================================================================

/// Per-slug attributes used for resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyKeys {
    pub slug: Slug,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub products: BTreeSet<String>,
}

impl CompanyKeys {
    pub fn from_record(record: &ListingRecord) -> Self {
        CompanyKeys {
            slug: record.slug.clone(),
            email: record.email().map(str::to_string),
            phone: record.phone().map(str::to_string),
            products: record.product_names.clone(),
        }
    }
}

// ============================================================================
// COMPANY MAPPING
// ============================================================================

/// Slug → company id for one wave
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyMapping {
    assignments: BTreeMap<Slug, CompanyId>,
}

impl CompanyMapping {
    pub fn company_of(&self, slug: &str) -> Option<&str> {
        self.assignments.get(slug).map(String::as_str)
    }

    pub fn same_company(&self, a: &str, b: &str) -> bool {
        match (self.company_of(a), self.company_of(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Slug, &CompanyId)> {
        self.assignments.iter()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn company_count(&self) -> usize {
        self.assignments.values().collect::<BTreeSet<_>>().len()
    }

    /// Grouping of slugs, independent of the generated ids
    pub fn partition(&self) -> BTreeSet<BTreeSet<Slug>> {
        let mut groups: HashMap<&CompanyId, BTreeSet<Slug>> = HashMap::new();
        for (slug, company) in &self.assignments {
            groups.entry(company).or_default().insert(slug.clone());
        }
        groups.into_values().collect()
    }
}

// ============================================================================
// ENTITY RESOLVER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct EntityResolver {
    policy: NullKeyPolicy,
}

impl EntityResolver {
    pub fn new(policy: NullKeyPolicy) -> Self {
        EntityResolver { policy }
    }

    /// Resolve one wave; phones only link storefronts when the wave has a
    /// phone column
    pub fn resolve(&self, wave: &Wave) -> CompanyMapping {
        let keys: Vec<CompanyKeys> = wave.records.values().map(CompanyKeys::from_record).collect();
        let mapping = self.resolve_keys(&keys, wave.has_column(PHONE_COLUMN));

        debug!(
            wave = %wave.label,
            storefronts = mapping.len(),
            companies = mapping.company_count(),
            "resolved companies"
        );
        mapping
    }

    pub fn resolve_keys(&self, keys: &[CompanyKeys], with_phone: bool) -> CompanyMapping {
        let mut ds = DisjointSet::from_items(keys.iter().map(|k| k.slug.clone()));

        let exclude = self.policy == NullKeyPolicy::ExcludeMissing;

        let by_products = bucket(keys, |k| {
            if exclude && k.products.is_empty() {
                None
            } else {
                Some(k.products.clone())
            }
        });
        let by_email = bucket(keys, |k| {
            if exclude && k.email.is_none() {
                None
            } else {
                Some(k.email.clone())
            }
        });

        union_buckets(&mut ds, &by_products);
        union_buckets(&mut ds, &by_email);

        if with_phone {
            let by_phone = bucket(keys, |k| {
                if exclude && k.phone.is_none() {
                    None
                } else {
                    Some(k.phone.clone())
                }
            });
            union_buckets(&mut ds, &by_phone);
        }

        let mut assignments = BTreeMap::new();
        for class in ds.classes() {
            let company: CompanyId = Uuid::new_v4().to_string();
            for slug in class {
                assignments.insert(slug, company.clone());
            }
        }

        CompanyMapping { assignments }
    }
}

/// Group slugs by key, keeping first-seen order within each bucket
fn bucket<K, F>(keys: &[CompanyKeys], key_of: F) -> Vec<Vec<Slug>>
where
    K: Eq + Hash,
    F: Fn(&CompanyKeys) -> Option<K>,
{
    let mut slots: HashMap<K, usize> = HashMap::new();
    let mut buckets: Vec<Vec<Slug>> = Vec::new();

    for k in keys {
        let key = match key_of(k) {
            Some(key) => key,
            None => continue,
        };
        let slot = *slots.entry(key).or_insert_with(|| {
            buckets.push(Vec::new());
            buckets.len() - 1
        });
        buckets[slot].push(k.slug.clone());
    }

    buckets
}

/// Chain every member of a bucket to its first member
fn union_buckets(ds: &mut DisjointSet<Slug>, buckets: &[Vec<Slug>]) {
    for members in buckets {
        if let Some((first, rest)) = members.split_first() {
            for other in rest {
                ds.union(first, other);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(slug: &str, email: Option<&str>, phone: Option<&str>, products: &[&str]) -> CompanyKeys {
        CompanyKeys {
            slug: slug.to_string(),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            products: products.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn partition(groups: &[&[&str]]) -> BTreeSet<BTreeSet<Slug>> {
        groups
            .iter()
            .map(|g| g.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_union_closure_across_attributes() {
        let input = vec![
            keys("a", Some("a@x.com"), None, &["OG Kush", "Blue Dream"]),
            keys("b", Some("shared@x.com"), None, &["OG Kush", "Blue Dream"]),
            keys("c", Some("shared@x.com"), None, &["Sour Diesel"]),
            keys("d", Some("d@x.com"), None, &["Gelato"]),
        ];

        let mapping = EntityResolver::default().resolve_keys(&input, false);

        assert!(mapping.same_company("a", "c"));
        assert!(!mapping.same_company("a", "d"));
        assert_eq!(mapping.company_count(), 2);
    }

    #[test]
    fn test_shared_products_without_contact_info() {
        let input = vec![
            keys("a", None, None, &["OG Kush"]),
            keys("b", None, None, &["OG Kush"]),
            keys("c", Some("c@x.com"), None, &["Gelato"]),
        ];

        for policy in [NullKeyPolicy::UnionMissing, NullKeyPolicy::ExcludeMissing] {
            let mapping = EntityResolver::new(policy).resolve_keys(&input, true);

            assert!(mapping.same_company("a", "b"), "{:?}", policy);
            assert!(!mapping.same_company("a", "c"), "{:?}", policy);
        }
    }

    #[test]
    fn test_null_key_policy() {
        let input = vec![
            keys("a", None, None, &["OG Kush"]),
            keys("b", None, None, &["Gelato"]),
            keys("c", Some("c@x.com"), None, &[]),
            keys("d", Some("d@x.com"), None, &[]),
        ];

        let union = EntityResolver::new(NullKeyPolicy::UnionMissing).resolve_keys(&input, false);
        assert_eq!(union.partition(), partition(&[&["a", "b"], &["c", "d"]]));

        let exclude = EntityResolver::new(NullKeyPolicy::ExcludeMissing).resolve_keys(&input, false);
        assert_eq!(exclude.company_count(), 4);
    }

    #[test]
    fn test_phone_only_used_when_wave_has_phones() {
        let input = vec![
            keys("a", Some("a@x.com"), Some("14155551234"), &["OG Kush"]),
            keys("b", Some("b@x.com"), Some("14155551234"), &["Gelato"]),
        ];
        let resolver = EntityResolver::default();

        assert!(resolver.resolve_keys(&input, true).same_company("a", "b"));
        assert!(!resolver.resolve_keys(&input, false).same_company("a", "b"));
    }

    #[test]
    fn test_partition_stable_but_ids_fresh() {
        let input = vec![
            keys("a", Some("same@x.com"), None, &["OG Kush"]),
            keys("b", Some("same@x.com"), None, &["Gelato"]),
            keys("c", Some("c@x.com"), None, &["Runtz"]),
        ];
        let resolver = EntityResolver::default();

        let first = resolver.resolve_keys(&input, false);
        let second = resolver.resolve_keys(&input, false);

        assert_eq!(first.partition(), second.partition());
        assert_ne!(first.company_of("a"), second.company_of("a"));
        assert_ne!(first.company_of("a"), first.company_of("c"));
    }

    #[test]
    fn test_resolve_wave_records() {
        let headers = ["url", "email", "phone", "product_name"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let row = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        let wave = Wave::from_rows(
            0,
            "191221",
            headers,
            vec![
                row(&["https://wm.com/dispensaries/a", "", "(415) 555-1234", "OG Kush"]),
                row(&["https://wm.com/dispensaries/a", "", "", "Gelato"]),
                row(&["https://wm.com/dispensaries/b", "", "415-555-1234", "Runtz"]),
                row(&["https://wm.com/dispensaries/c", "c@x.com", "", "OG Kush"]),
            ],
        )
        .unwrap();

        let mapping = EntityResolver::default().resolve(&wave);

        assert_eq!(mapping.len(), 3);
        assert!(mapping.same_company("a", "b"));
        assert!(!mapping.same_company("a", "c"));
    }
}
