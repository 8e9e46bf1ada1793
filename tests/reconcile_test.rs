// End-to-end tests for SeriesReconciler over real files in temp directories

mod common;

use std::fs;

use common::{read_csv, write_csv, year_rows, Stores};
use teotil_report::reconcile::{
    Baseline, ColumnRenames, FailurePolicy, FilenameMapping, OverlapPolicy, ReconcileError,
    SeriesReconciler, YearWindow,
};
use teotil_report::table::TableError;

const LEGACY_HEADER: &[&str] = &["År", "Bakgrun", "Befolkning", "Jordbruk"];
const CURRENT_HEADER: &[&str] = &["År", "Bakgrunn", "Avløp", "Jordbruk"];

fn window() -> YearWindow {
    YearWindow::new(1990, 2017).unwrap()
}

fn reconciler(stores: &Stores, pairs: &[(&str, &str)]) -> SeriesReconciler {
    let mapping = FilenameMapping::from_pairs(pairs.iter().copied()).unwrap();
    SeriesReconciler::new(
        mapping,
        ColumnRenames::default(),
        window(),
        stores.table_stores(),
    )
    .unwrap()
}

/// Legacy table 1990-2019 and current table 2018-2020 for one pair
fn seed_pair(stores: &Stores, current: &str, legacy: &str) {
    write_csv(
        &stores.legacy,
        legacy,
        LEGACY_HEADER,
        &year_rows(1990..=2019, 3, 1.5),
    );
    write_csv(
        &stores.current,
        current,
        CURRENT_HEADER,
        &year_rows(2018..=2020, 3, 2.5),
    );
}

#[test]
fn test_merge_takes_window_from_legacy_and_rest_from_current() {
    let stores = Stores::new();
    seed_pair(&stores, "Glomma_p.csv", "Glomma_p.csv");

    let reconciler = reconciler(&stores, &[("Glomma_p.csv", "Glomma_p.csv")]);
    let entry = reconciler.mapping().entries()[0].clone();
    let merged = reconciler.reconcile_pair(&entry).unwrap();

    assert_eq!(merged.legacy_rows, 28);
    assert_eq!(merged.current_rows, 3);
    assert_eq!(merged.total_rows(), 31);
    assert_eq!(merged.pair, "Glomma (P)");

    let (header, rows) = read_csv(&stores.output.join("Glomma_p.csv"));
    assert_eq!(header, vec!["År", "Bakgrunn", "Avløp", "Jordbruk"]);
    assert_eq!(rows.len(), 31);

    let years: Vec<i32> = rows.iter().map(|r| r[0].parse().unwrap()).collect();
    let expected: Vec<i32> = (1990..=2017).chain(2018..=2020).collect();
    assert_eq!(years, expected);

    // 1.5 and 2.5 both round to 2 under ties-to-even
    for row in &rows {
        assert_eq!(&row[1..], &["2", "2", "2"]);
    }
}

#[test]
fn test_no_duplicate_years_in_output() {
    let stores = Stores::new();
    seed_pair(&stores, "Agder_n.csv", "Agder_n.csv");

    let summary = reconciler(&stores, &[("Agder_n.csv", "Agder_n.csv")]).reconcile_all(|_, _| {});
    assert!(summary.is_success());

    let (_, rows) = read_csv(&stores.output.join("Agder_n.csv"));
    let mut years: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    let count = years.len();
    years.dedup();
    assert_eq!(years.len(), count);
}

#[test]
fn test_non_ascii_filenames_preserved() {
    let stores = Stores::new();
    let current = "Sverige – Strømtangen fyr_p.csv";
    let legacy = "Sverige_Stromtangen fyr_p.csv";
    seed_pair(&stores, current, legacy);

    let summary = reconciler(&stores, &[(current, legacy)]).reconcile_all(|_, _| {});

    assert!(summary.is_success());
    assert!(stores.output.join(current).is_file());
    assert!(!stores.output.join(legacy).exists());
    assert_eq!(summary.merged[0].pair, "Sverige – Strømtangen fyr (P)");
}

#[test]
fn test_current_column_order_is_kept() {
    let stores = Stores::new();
    write_csv(
        &stores.legacy,
        "Troms_p.csv",
        LEGACY_HEADER,
        &year_rows(1990..=2017, 3, 1.0),
    );
    write_csv(
        &stores.current,
        "Troms_p.csv",
        &["År", "Jordbruk", "Avløp", "Bakgrunn"],
        &[vec!["2018".into(), "7".into(), "8".into(), "9".into()]],
    );

    let summary = reconciler(&stores, &[("Troms_p.csv", "Troms_p.csv")]).reconcile_all(|_, _| {});
    assert!(summary.is_success());

    let (header, rows) = read_csv(&stores.output.join("Troms_p.csv"));
    assert_eq!(header, vec!["År", "Jordbruk", "Avløp", "Bakgrunn"]);
    assert_eq!(rows.last().unwrap(), &vec!["2018", "7", "8", "9"]);
    assert_eq!(rows[0], vec!["1990", "1", "1", "1"]);
}

#[test]
fn test_empty_cells_preserved() {
    let stores = Stores::new();
    write_csv(
        &stores.legacy,
        "Finnmark_n.csv",
        &["År", "Jordbruk"],
        &[vec!["2017".into(), "".into()]],
    );
    write_csv(
        &stores.current,
        "Finnmark_n.csv",
        &["År", "Jordbruk"],
        &[vec!["2018".into(), "3.4".into()]],
    );

    let summary =
        reconciler(&stores, &[("Finnmark_n.csv", "Finnmark_n.csv")]).reconcile_all(|_, _| {});
    assert!(summary.is_success());

    let (_, rows) = read_csv(&stores.output.join("Finnmark_n.csv"));
    assert_eq!(rows, vec![vec!["2017", ""], vec!["2018", "3"]]);
}

#[test]
fn test_missing_legacy_file_names_path_and_writes_nothing() {
    let stores = Stores::new();
    write_csv(
        &stores.current,
        "Glomma_p.csv",
        CURRENT_HEADER,
        &year_rows(2018..=2020, 3, 1.0),
    );

    let reconciler = reconciler(&stores, &[("Glomma_p.csv", "Glomma_p.csv")]);
    let entry = reconciler.mapping().entries()[0].clone();

    match reconciler.reconcile_pair(&entry) {
        Err(ReconcileError::Table(TableError::MissingInput(path))) => {
            assert_eq!(path, stores.legacy.join("Glomma_p.csv"));
        }
        other => panic!("Expected MissingInput, got {other:?}"),
    }
    assert!(!stores.output.join("Glomma_p.csv").exists());
}

#[test]
fn test_missing_current_file_names_path() {
    let stores = Stores::new();
    write_csv(
        &stores.legacy,
        "Lindesnes_Stad_n.csv",
        LEGACY_HEADER,
        &year_rows(1990..=2017, 3, 1.0),
    );

    let summary = reconciler(&stores, &[("Lindesnes – Stad_n.csv", "Lindesnes_Stad_n.csv")])
        .reconcile_all(|_, _| {});

    assert_eq!(summary.failed.len(), 1);
    let failed = &summary.failed[0];
    assert_eq!(failed.kind, "missing_input");
    assert!(failed.error.contains("Lindesnes – Stad_n.csv"));
    assert!(!stores.output.join("Lindesnes – Stad_n.csv").exists());
}

#[test]
fn test_schema_mismatch_fails_pair() {
    let stores = Stores::new();
    write_csv(
        &stores.legacy,
        "Agder_p.csv",
        &["År", "Bakgrun", "Industri"],
        &year_rows(1990..=2017, 2, 1.0),
    );
    write_csv(
        &stores.current,
        "Agder_p.csv",
        &["År", "Bakgrunn", "Akvakultur"],
        &year_rows(2018..=2018, 2, 1.0),
    );

    let reconciler = reconciler(&stores, &[("Agder_p.csv", "Agder_p.csv")]);
    let entry = reconciler.mapping().entries()[0].clone();

    match reconciler.reconcile_pair(&entry) {
        Err(ReconcileError::SchemaMismatch {
            legacy_only,
            current_only,
        }) => {
            assert_eq!(legacy_only, vec!["Industri"]);
            assert_eq!(current_only, vec!["Akvakultur"]);
        }
        other => panic!("Expected SchemaMismatch, got {other:?}"),
    }
    assert!(!stores.output.join("Agder_p.csv").exists());
}

#[test]
fn test_overlap_fails_unless_discarding() {
    let stores = Stores::new();
    write_csv(
        &stores.legacy,
        "Rogaland_p.csv",
        &["År", "Jordbruk"],
        &year_rows(1990..=2017, 1, 10.0),
    );
    write_csv(
        &stores.current,
        "Rogaland_p.csv",
        &["År", "Jordbruk"],
        &year_rows(2016..=2019, 1, 99.0),
    );
    let pairs = [("Rogaland_p.csv", "Rogaland_p.csv")];

    let summary = reconciler(&stores, &pairs).reconcile_all(|_, _| {});
    assert_eq!(summary.failed[0].kind, "year_overlap");
    assert!(!stores.output.join("Rogaland_p.csv").exists());

    let summary = reconciler(&stores, &pairs)
        .with_overlap_policy(OverlapPolicy::DiscardCurrent)
        .reconcile_all(|_, _| {});
    assert!(summary.is_success());
    assert_eq!(summary.merged[0].current_rows, 2);

    let (_, rows) = read_csv(&stores.output.join("Rogaland_p.csv"));
    assert_eq!(rows.len(), 30);
    assert_eq!(rows[27], vec!["2017", "10"]);
    assert_eq!(rows[28], vec!["2018", "99"]);
}

#[test]
fn test_continue_and_report_processes_every_pair() {
    let stores = Stores::new();
    seed_pair(&stores, "Glomma_p.csv", "Glomma_p.csv");
    seed_pair(&stores, "Agder_p.csv", "Agder_p.csv");

    let pairs = [
        ("Glomma_p.csv", "Glomma_p.csv"),
        ("Vest-Viken_p.csv", "Vest-Viken_p.csv"),
        ("Agder_p.csv", "Agder_p.csv"),
    ];

    let mut seen = Vec::new();
    let summary = reconciler(&stores, &pairs).reconcile_all(|entry, outcome| {
        seen.push((entry.current.clone(), outcome.is_ok()));
    });

    assert_eq!(
        seen,
        vec![
            ("Glomma_p.csv".to_string(), true),
            ("Vest-Viken_p.csv".to_string(), false),
            ("Agder_p.csv".to_string(), true),
        ]
    );
    assert_eq!(summary.merged.len(), 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.skipped, 0);
    assert!(!summary.is_success());
    assert!(stores.output.join("Agder_p.csv").is_file());
}

#[test]
fn test_fail_fast_stops_at_first_failure() {
    let stores = Stores::new();
    seed_pair(&stores, "Glomma_p.csv", "Glomma_p.csv");
    seed_pair(&stores, "Agder_p.csv", "Agder_p.csv");

    let pairs = [
        ("Glomma_p.csv", "Glomma_p.csv"),
        ("Vest-Viken_p.csv", "Vest-Viken_p.csv"),
        ("Agder_p.csv", "Agder_p.csv"),
    ];

    let summary = reconciler(&stores, &pairs)
        .with_failure_policy(FailurePolicy::FailFast)
        .reconcile_all(|_, _| {});

    assert_eq!(summary.merged.len(), 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.attempted(), 2);
    // Earlier outputs are kept
    assert!(stores.output.join("Glomma_p.csv").is_file());
    assert!(!stores.output.join("Agder_p.csv").exists());
}

#[test]
fn test_existing_output_is_overwritten() {
    let stores = Stores::new();
    seed_pair(&stores, "Nordland_n.csv", "Nordland_n.csv");
    fs::create_dir_all(&stores.output).unwrap();
    fs::write(stores.output.join("Nordland_n.csv"), "stale\n").unwrap();

    let summary =
        reconciler(&stores, &[("Nordland_n.csv", "Nordland_n.csv")]).reconcile_all(|_, _| {});
    assert!(summary.is_success());

    let (header, rows) = read_csv(&stores.output.join("Nordland_n.csv"));
    assert_eq!(header[0], "År");
    assert_eq!(rows.len(), 31);
}

#[test]
fn test_malformed_value_reported_with_line() {
    let stores = Stores::new();
    write_csv(
        &stores.legacy,
        "Troms_n.csv",
        &["År", "Jordbruk"],
        &[vec!["1990".into(), "1".into()], vec!["1991".into(), "n/a".into()]],
    );
    write_csv(
        &stores.current,
        "Troms_n.csv",
        &["År", "Jordbruk"],
        &[vec!["2018".into(), "1".into()]],
    );

    let reconciler = reconciler(&stores, &[("Troms_n.csv", "Troms_n.csv")]);
    let entry = reconciler.mapping().entries()[0].clone();

    match reconciler.reconcile_pair(&entry) {
        Err(ReconcileError::Table(TableError::MalformedRow {
            line,
            column,
            value,
            ..
        })) => {
            assert_eq!(line, 3);
            assert_eq!(column, "Jordbruk");
            assert_eq!(value, "n/a");
        }
        other => panic!("Expected MalformedRow, got {other:?}"),
    }
}

#[test]
fn test_current_years_before_window_kept() {
    let stores = Stores::new();
    write_csv(
        &stores.legacy,
        "Hordaland_p.csv",
        &["År", "Jordbruk"],
        &[vec!["1990".into(), "1".into()], vec!["2017".into(), "2".into()]],
    );
    write_csv(
        &stores.current,
        "Hordaland_p.csv",
        &["År", "Jordbruk"],
        &[vec!["1985".into(), "7".into()], vec!["2018".into(), "3".into()]],
    );
    let pairs = [("Hordaland_p.csv", "Hordaland_p.csv")];
    let expected = vec![
        vec!["1990", "1"],
        vec!["2017", "2"],
        vec!["1985", "7"],
        vec!["2018", "3"],
    ];

    for overlap in [OverlapPolicy::Fail, OverlapPolicy::DiscardCurrent] {
        let summary = reconciler(&stores, &pairs)
            .with_overlap_policy(overlap)
            .reconcile_all(|_, _| {});
        assert!(summary.is_success(), "{overlap:?}: {:?}", summary.failed);

        let (_, rows) = read_csv(&stores.output.join("Hordaland_p.csv"));
        assert_eq!(rows, expected);
    }
}

#[test]
fn test_legacy_rename_collision_fails_pair() {
    let stores = Stores::new();
    write_csv(
        &stores.legacy,
        "Agder_n.csv",
        &["År", "Bakgrun", "Bakgrunn"],
        &[vec!["1990".into(), "1".into(), "500".into()]],
    );
    write_csv(
        &stores.current,
        "Agder_n.csv",
        &["År", "Bakgrunn"],
        &[vec!["2018".into(), "3".into()]],
    );

    let summary = reconciler(&stores, &[("Agder_n.csv", "Agder_n.csv")]).reconcile_all(|_, _| {});

    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].kind, "duplicate_column");
    assert!(!stores.output.join("Agder_n.csv").exists());
}

#[test]
fn test_duplicate_current_header_fails_pair() {
    let stores = Stores::new();
    write_csv(
        &stores.legacy,
        "Agder_p.csv",
        &["År", "Bakgrunn"],
        &[vec!["1990".into(), "1".into()]],
    );
    write_csv(
        &stores.current,
        "Agder_p.csv",
        &["År", "Bakgrunn", "Bakgrunn"],
        &[vec!["2018".into(), "3".into(), "4".into()]],
    );

    let summary = reconciler(&stores, &[("Agder_p.csv", "Agder_p.csv")]).reconcile_all(|_, _| {});

    assert_eq!(summary.failed[0].kind, "duplicate_column");
    assert!(summary.failed[0].error.contains("Bakgrunn"));
    assert!(!stores.output.join("Agder_p.csv").exists());
}

#[test]
fn test_baseline_row_placed_first() {
    let stores = Stores::new();
    seed_pair(&stores, "Glomma_p.csv", "Glomma_p.csv");
    seed_pair(&stores, "Agder_p.csv", "Agder_p.csv");
    let baseline_path = write_csv(
        stores.root.path(),
        "data_1985.csv",
        &["section_name", "År", "Jordbruk", "Bakgrun", "Befolkning"],
        &[vec![
            "Glomma: fosfor".into(),
            "1985".into(),
            "10.5".into(),
            "".into(),
            "30".into(),
        ]],
    );
    let baseline = Baseline::read_csv(&baseline_path, "section_name", "År", 1985).unwrap();

    let summary = reconciler(
        &stores,
        &[("Glomma_p.csv", "Glomma_p.csv"), ("Agder_p.csv", "Agder_p.csv")],
    )
    .with_baseline(baseline)
    .reconcile_all(|_, _| {});
    assert!(summary.is_success());
    assert_eq!(summary.merged[0].baseline_rows, 1);
    assert_eq!(summary.merged[0].total_rows(), 32);
    // No row for Agder in the baseline file
    assert_eq!(summary.merged[1].baseline_rows, 0);

    let (header, rows) = read_csv(&stores.output.join("Glomma_p.csv"));
    assert_eq!(header, vec!["År", "Bakgrunn", "Avløp", "Jordbruk"]);
    assert_eq!(rows.len(), 32);
    assert_eq!(rows[0], vec!["1985", "", "30", "10"]);
    assert_eq!(rows[1][0], "1990");

    let (_, rows) = read_csv(&stores.output.join("Agder_p.csv"));
    assert_eq!(rows[0][0], "1990");
}
