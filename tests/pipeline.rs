use std::collections::HashMap;
use std::fs;
use std::path::Path;

use storefront_panel::{load_inputs, run, FeaturizeConfig, FeaturizeError};

const PANEL_HEADER: &str = "url,dispensary_name,address,email,product_name,access_date";

fn write(path: &Path, lines: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn panel_row(slug: &str, name: &str, address: &str, email: &str, product: &str, date: &str) -> String {
    format!(
        "https://weedmaps.com/dispensaries/{},{},{},{},{},{}",
        slug, name, address, email, product, date
    )
}

fn config_for(root: &Path) -> FeaturizeConfig {
    FeaturizeConfig {
        panel_dir: root.join("input/panel"),
        license_dir: root.join("input/license"),
        scrape_dir: root.join("input/scrapes"),
        output_dir: root.join("output"),
        ..FeaturizeConfig::default()
    }
}

fn seed_inputs(root: &Path) {
    let panels = root.join("input/panel");
    write(
        &panels.join("191221_panel.csv"),
        &[
            PANEL_HEADER,
            &panel_row("a", "Leaf", "1 Main St", "shop@x.com", "OG Kush", "2019-12-21"),
            &panel_row("a", "Leaf", "1 Main St", "shop@x.com", "Gelato", "2019-12-21"),
            &panel_row("b", "Leaf Two", "9 Side St", "shop@x.com", "Runtz", "2019-12-21"),
            &panel_row("c", "Root", "5 Oak Ave", "c@x.com", "Sour Diesel", "2019-12-21"),
        ],
    );
    write(
        &panels.join("200112_panel.csv"),
        &[
            PANEL_HEADER,
            &panel_row("a", "Leaf", "2 Main St", "shop@x.com", "OG Kush", "2020-01-12"),
            &panel_row("c", "Root", "5 Oak Ave", "c@x.com", "Sour Diesel", "2020-01-12"),
        ],
    );
    write(
        &panels.join("200209_panel.csv"),
        &[
            PANEL_HEADER,
            &panel_row("a", "Leaf", "2 Main St", "shop@x.com", "OG Kush", "2020-02-09"),
            &panel_row("b", "Leaf Two", "7 New St", "shop@x.com", "Runtz", "2020-02-09"),
            &panel_row("c", "Root", "5 Oak Ave", "c@x.com", "Sour Diesel", "2020-02-09"),
        ],
    );

    write(
        &root.join("input/license/registry.csv"),
        &[
            "License Number,License Type,Status,Status Date,Issue Date,Adult-Use/Medicinal",
            "C10-A,Retailer,Active,01/02/2019,01/01/2019,Adult-Use",
        ],
    );
    write(
        &root.join("input/scrapes/200209_scrape.csv"),
        &[
            "url,state_license_number_1",
            "https://weedmaps.com/dispensaries/a, c10-a ",
            "https://weedmaps.com/dispensaries/b,C10-UNKNOWN",
            "https://weedmaps.com/dispensaries/c,N/A",
        ],
    );
}

/// slug → (column → value), one entry per slug (first row wins)
fn read_tagged(path: &Path) -> HashMap<String, HashMap<String, String>> {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    let headers: Vec<String> = rdr.headers().unwrap().iter().map(str::to_string).collect();
    let mut by_slug = HashMap::new();
    for record in rdr.records() {
        let record = record.unwrap();
        let row: HashMap<String, String> = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        by_slug.entry(row["slug"].clone()).or_insert(row);
    }
    by_slug
}

#[test]
fn test_full_run_writes_tagged_panels_and_company_mappings() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let config = config_for(dir.path());

    let summary = run(&config).unwrap();

    assert_eq!(summary.waves, 3);
    assert_eq!(summary.licensed_waves, 1);
    assert_eq!(summary.tagged_files.len(), 3);
    assert_eq!(summary.company_files.len(), 3);

    let first = read_tagged(&config.output_dir.join("panel/191221_tagged.csv"));
    assert_eq!(first["b"]["disappeared"], "1");
    assert_eq!(first["a"]["disappeared"], "0");
    assert_eq!(first["b"]["illegal_1912"], "1");
    assert_eq!(first["a"]["illegal_1912"], "0");
    assert_eq!(first["a"]["assumed_license"], "1");
    assert_eq!(first["a"]["continued"], "");
    assert_eq!(first["a"]["active_license"], "");

    let second = read_tagged(&config.output_dir.join("panel/200112_tagged.csv"));
    assert_eq!(second["a"]["changed_address"], "1");
    assert_eq!(second["c"]["changed_address"], "0");
    assert_eq!(second["a"]["illegal_1912"], "");

    let third = read_tagged(&config.output_dir.join("panel/200209_tagged.csv"));
    assert_eq!(third["b"]["reappeared"], "1");
    assert_eq!(third["b"]["continued"], "0");
    assert_eq!(third["b"]["changed_address"], "1");
    assert_eq!(third["a"]["active_license"], "1");
    assert_eq!(third["a"]["license"], "c10-a");
    assert_eq!(third["a"]["status"], "active");
    assert_eq!(third["b"]["possible_license"], "1");
    assert_eq!(third["c"]["possible_license"], "0");
    assert_eq!(third["a"]["is_dispensary"], "1");

    let mapping = fs::read_to_string(config.output_dir.join("company/191221_company_mapping.csv")).unwrap();
    let companies: HashMap<&str, &str> = mapping
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(','))
        .collect();
    assert_eq!(companies.len(), 3);
    assert_eq!(companies["a"], companies["b"]);
    assert_ne!(companies["a"], companies["c"]);
}

#[test]
fn test_untrimmed_rows_are_preserved() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let config = config_for(dir.path());

    run(&config).unwrap();

    let mut rdr = csv::Reader::from_path(config.output_dir.join("panel/191221_tagged.csv")).unwrap();
    assert_eq!(rdr.records().count(), 4);
}

#[test]
fn test_missing_registry_skips_license_tags() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    fs::remove_dir_all(dir.path().join("input/license")).unwrap();
    let config = config_for(dir.path());

    let summary = run(&config).unwrap();

    assert_eq!(summary.licensed_waves, 0);
    assert!(!summary.tag_schema.iter().any(|t| t.ends_with("_license")));
}

#[test]
fn test_panel_without_url_aborts() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("input/panel/191221_panel.csv"),
        &["dispensary_name,email", "leaf,leaf@x.com"],
    );
    let config = config_for(dir.path());

    let err = load_inputs(&config).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<FeaturizeError>(),
        Some(FeaturizeError::MissingRequiredSchema { .. })
    ));
}

#[test]
fn test_panel_license_column_without_registry_emits_no_license_tags() {
    let dir = tempfile::tempdir().unwrap();
    let panels = dir.path().join("input/panel");
    write(
        &panels.join("191221_panel.csv"),
        &["url,license", "https://weedmaps.com/dispensaries/a,C10-A"],
    );
    write(
        &panels.join("200112_panel.csv"),
        &["url,license", "https://weedmaps.com/dispensaries/a,C10-A"],
    );
    let config = config_for(dir.path());

    let summary = run(&config).unwrap();

    assert_eq!(summary.licensed_waves, 0);
    assert!(!summary.tag_schema.iter().any(|t| t.ends_with("_license")));
    assert!(!summary.tag_schema.iter().any(|t| t == "future_license_explicit"));

    let first = read_tagged(&config.output_dir.join("panel/191221_tagged.csv"));
    assert_eq!(first["a"]["license"], "C10-A");
    assert!(!first["a"].contains_key("possible_license"));
}
