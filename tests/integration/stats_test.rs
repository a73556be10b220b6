use std::path::{Path, PathBuf};

use school_network::config::StatsConfig;
use school_network::pipeline::{StatsInputs, run_statistics};
use school_network::stats::{
    GeoLookup, InfectionLookup, Observer, PairCategory, PairColumns, ResidenceColumns, TestColumns,
    baseline_pairs, export_report, read_member_pairs,
};
use tempfile::TempDir;

use crate::utils::{read_lines, string_batch, write_file};

const PAIR_HEADER: &str = "RINPERSOON1\tBRIN_crypt1\tBRINVEST1\tOPLNR1\tPOSTCODE1\tgemcode1\tRINPERSOON2\tBRIN_crypt2\tBRINVEST2\tOPLNR2\tPOSTCODE2\tgemcode2";

const PAIRS: [&str; 4] = [
    "p1\tS1\t00\tA\t1000AB\t0363\tp2\tS1\t00\tA\t1000AB\t0363",
    "p3\tS1\t00\tA\t1000AB\t0363\tp4\tS1\t00\tB\t1000AB\t0363",
    "p5\tS1\t00\tA\t1000AB\t0363\tp6\tS1\t01\tA\t1011CD\t0363",
    "p7\tS1\t00\tA\t1000AB\t0363\tp8\tS2\t00\tA\t3500EF\t0344",
];

const RESIDENCES: [(&str, &str, &str); 9] = [
    ("p1", "A1", "E1000N2000"),
    ("p2", "A1", "E1000N2000"),
    ("p3", "A3", "E1000N2000"),
    ("p4", "A4", "E1000N2003"),
    ("p5", "A5", "E1000N2000"),
    ("p6", "A6", "E1010N2000"),
    ("p7", "A7", "E1000N2000"),
    ("p8", "A8", "E1100N2000"),
    ("p9", "A9", "-"),
];

const TESTS: [(&str, &str, &str); 4] = [
    ("p1", "20200310", "POSITIEF"),
    ("p2", "20200315", "POSITIEF"),
    ("p3", "20200310", "NEGATIEF"),
    ("p7", "20200601", "POSITIEF"),
];

struct Inputs {
    _dir: TempDir,
    inputs: StatsInputs,
}

fn write_inputs(family: Option<&str>) -> Inputs {
    let dir = TempDir::new().unwrap();
    let pairs = write_file(dir.path(), "pairs.tsv", format!("{PAIR_HEADER}\n{}\n", PAIRS.join("\n")));

    let mut residences = "RINPERSOON\tRINOBJECTNUMMER\tVRLVIERKANT100M\n".to_string();
    for (person, address, cell) in RESIDENCES {
        residences.push_str(&format!("{person}\t{address}\t{cell}\n"));
    }
    let residences = write_file(dir.path(), "residences.tsv", residences);

    let mut tests = "RINPERSOON\tDatumMonsterafname\tTestuitslag\n".to_string();
    for (person, date, result) in TESTS {
        tests.push_str(&format!("{person}\t{date}\t{result}\n"));
    }
    let tests = write_file(dir.path(), "tests.tsv", tests);

    let family = family.map(|contents| write_file(dir.path(), "family.csv", contents));
    let output = dir.path().join("stats.tsv");

    Inputs {
        inputs: StatsInputs {
            pairs,
            residences,
            tests,
            family,
            output,
        },
        _dir: dir,
    }
}

fn line<'a>(lines: &'a [String], group: &str, scope: &str) -> &'a str {
    let prefix = format!("{group}\t{scope}\t");
    lines
        .iter()
        .find(|l| l.starts_with(&prefix))
        .unwrap_or_else(|| panic!("no row for {group} {scope}"))
}

fn lookups() -> (GeoLookup, InfectionLookup) {
    let residences = string_batch(&[
        ("RINPERSOON", RESIDENCES.iter().map(|r| r.0).collect()),
        ("RINOBJECTNUMMER", RESIDENCES.iter().map(|r| r.1).collect()),
        ("VRLVIERKANT100M", RESIDENCES.iter().map(|r| r.2).collect()),
    ]);
    let tests = string_batch(&[
        ("RINPERSOON", TESTS.iter().map(|t| t.0).collect()),
        ("DatumMonsterafname", TESTS.iter().map(|t| t.1).collect()),
        ("Testuitslag", TESTS.iter().map(|t| t.2).collect()),
    ]);
    let config = StatsConfig::default();
    (
        GeoLookup::from_batch(&residences, &ResidenceColumns::default()).unwrap(),
        InfectionLookup::from_batch(&tests, &TestColumns::default(), config.reference_date, true).unwrap(),
    )
}

fn pair_batch(rows: &[&str]) -> arrow::record_batch::RecordBatch {
    let names: Vec<&str> = PAIR_HEADER.split('\t').collect();
    let cells: Vec<Vec<&str>> = rows.iter().map(|r| r.split('\t').collect()).collect();
    let columns: Vec<(&str, Vec<&str>)> = names
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, cells.iter().map(|c| c[i]).collect()))
        .collect();
    string_batch(&columns)
}

#[test]
fn test_observe_matched_pairs() {
    let (residences, infections) = lookups();
    assert_eq!(residences.len(), 8);
    // Negative test ignored
    assert_eq!(infections.len(), 3);
    assert_eq!(infections.day("p1"), Some(69));

    let mut rows = PAIRS.to_vec();
    rows.push("p1\tS1\t00\tA\t1000AB\t0363\tp9\tS3\t00\tA\t1000AB\t0363");
    let pairs = read_member_pairs(&pair_batch(&rows), &PairColumns::default()).unwrap();
    assert_eq!(pairs.len(), 5);

    let config = StatsConfig::default();
    let observer = Observer {
        residences: &residences,
        infections: &infections,
        config: &config,
    };
    let observed = observer.observe_pairs(&pairs);
    assert_eq!(observed.without_residence, 1);

    let categories: Vec<Option<PairCategory>> = observed.pairs.iter().map(|o| o.category).collect();
    assert_eq!(
        categories,
        vec![
            Some(PairCategory::SameClass),
            Some(PairCategory::SameSchool),
            Some(PairCategory::SameInstitution),
            Some(PairCategory::DifferentSchool),
        ]
    );

    let distances: Vec<f64> = observed.pairs.iter().map(|o| o.distance).collect();
    assert_eq!(distances, vec![0.0, 352.0, 1_052.0, 10_052.0]);

    assert!(observed.pairs[0].co_infected);
    assert!(!observed.pairs[1].co_infected);
    assert!(observed.pairs[1].not_infected);
    // Only one member infected
    assert!(!observed.pairs[3].co_infected);
    assert!(!observed.pairs[3].not_infected);

    assert_eq!(observed.pairs[2].same_postcode, Some(false));
    assert_eq!(observed.pairs[2].same_municipality, Some(true));
    assert_eq!(observed.pairs[3].same_municipality, Some(false));
}

#[test]
fn test_statistics_file_accumulates_and_exports() -> school_network::Result<()> {
    let run = write_inputs(None);
    let config = StatsConfig::default();

    run_statistics(&run.inputs, &config)?;
    let lines = read_lines(&run.inputs.output);
    assert_eq!(lines[0], "Group\tDistance\tN\tN_inf");
    // Four categories and the baseline, each all and infected, ten rows apiece
    assert_eq!(lines.len(), 1 + 5 * 2 * 10);

    assert_eq!(line(&lines, "same_class_all", "general"), "same_class_all\tgeneral\t1\t1");
    assert_eq!(line(&lines, "same_class_all", "-1-0"), "same_class_all\t-1-0\t1\t1");
    assert_eq!(line(&lines, "same_class_infected", "general"), "same_class_infected\tgeneral\t1\t1");
    assert_eq!(line(&lines, "same_school_all", "300-1000"), "same_school_all\t300-1000\t1\t0");
    assert_eq!(line(&lines, "same_school_infected", "general"), "same_school_infected\tgeneral\t0\t0");
    assert_eq!(
        line(&lines, "same_institution_all", "school_gemeente"),
        "same_institution_all\tschool_gemeente\t1\t0"
    );
    assert_eq!(
        line(&lines, "different_inst_infected", "general"),
        "different_inst_infected\tgeneral\t1\t0"
    );
    assert!(lines.iter().any(|l| l.starts_with("baseline_all\tgeneral\t")));

    // A second run appends under the same header
    run_statistics(&run.inputs, &config)?;
    let appended = read_lines(&run.inputs.output);
    assert_eq!(appended.len(), 1 + 2 * 5 * 2 * 10);
    assert_eq!(appended.iter().filter(|l| l.starts_with("Group\t")).count(), 1);

    let report = run.inputs.output.with_file_name("report.tsv");
    let exported = export_report(&run.inputs.output, &report, config.min_reportable)?;
    assert_eq!(exported, 200);
    let report_lines = read_lines(&report);
    assert_eq!(report_lines.len(), 201);
    assert_eq!(line(&report_lines, "same_class_all", "general"), "same_class_all\tgeneral\t\t");
    Ok(())
}

#[test]
fn test_export_suppresses_counts_independently() {
    let dir = TempDir::new().unwrap();
    let stats = write_file(
        dir.path(),
        "stats.tsv",
        "Group\tDistance\tN\tN_inf\na_all\tgeneral\t25\t3\na_all\t0-300\t10\t10\na_all\t300-1000\t9\t0\n",
    );
    let report = dir.path().join("report.tsv");

    assert_eq!(export_report(&stats, &report, 10).unwrap(), 3);
    assert_eq!(
        read_lines(&report),
        vec![
            "Group\tDistance\tN\tN_inf",
            "a_all\tgeneral\t25\t",
            "a_all\t0-300\t10\t10",
            "a_all\t300-1000\t\t",
        ]
    );
}

#[test]
fn test_family_samples() {
    let run = write_inputs(Some(
        "RINPERSOONSRC;RINPERSOONDST;linktype\np2;p1;103\np3;p9;102\np5;p7;104\np6;p8;101\n",
    ));
    run_statistics(&run.inputs, &StatsConfig::default()).unwrap();
    let lines = read_lines(&run.inputs.output);

    // Categories and baseline with twins (4 labels x 10 rows), family types (2 labels x 8 rows)
    assert_eq!(lines.len(), 1 + 5 * 4 * 10 + 3 * 2 * 8);

    // Sibling links match either direction
    assert_eq!(line(&lines, "same_class_twins", "general"), "same_class_twins\tgeneral\t1\t1");
    assert_eq!(
        line(&lines, "same_school_twins", "general"),
        "same_school_twins\tgeneral\t0\t0"
    );

    assert_eq!(line(&lines, "Siblings-103_all", "general"), "Siblings-103_all\tgeneral\t1\t1");
    // p9 has no known residence
    assert_eq!(line(&lines, "Co-Parents-102_all", "general"), "Co-Parents-102_all\tgeneral\t0\t0");
    assert_eq!(
        line(&lines, "Parent-child-104_infected", "general"),
        "Parent-child-104_infected\tgeneral\t1\t0"
    );
    assert!(!lines.iter().any(|l| l.starts_with("Siblings-103_all\tschool_postcode")));
}

#[test]
fn test_baseline_pairs_are_reproducible() {
    let pairs = read_member_pairs(&pair_batch(&PAIRS), &PairColumns::default()).unwrap();
    let first = baseline_pairs(&pairs, 7);
    let second = baseline_pairs(&pairs, 7);
    assert_eq!(first, second);
    for pair in &first {
        assert_ne!(pair.first.school, pair.second.school);
        assert!(
            !pairs
                .iter()
                .any(|p| p.first.person == pair.first.person && p.second.person == pair.second.person)
        );
    }
}

#[test]
fn test_missing_pair_column_fails() {
    let run = write_inputs(None);
    let broken: PathBuf = write_file(
        run.inputs.pairs.parent().unwrap_or(Path::new(".")),
        "broken.tsv",
        "RINPERSOON1\tRINPERSOON2\np1\tp2\n",
    );
    let inputs = StatsInputs {
        pairs: broken,
        ..run.inputs.clone()
    };
    assert!(run_statistics(&inputs, &StatsConfig::default()).is_err());
    assert!(!inputs.output.exists());
}
