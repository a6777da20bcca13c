//! End-to-end runs of the learn workflow against files on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use seqlearn_core::{ErrorKind, SeqlearnError};
use seqlearn_trainer::{
    CrfModel, DataSource, LearnConfig, LearnReport, ParamOverride, TrainerRegistry, learn,
};

const TRAIN: &str = "\
B-NP\tw=He\tpos=PRP
B-VP\tw=reckons\tpos=VBZ
B-NP\tw=the\tpos=DT
I-NP\tw=deficit\tpos=NN

B-NP\tw=The\tpos=DT
I-NP\tw=market\tpos=NN
B-VP\tw=fell\tpos=VBD
";

const MORE: &str = "\
B-NP\tw=She\tpos=PRP
B-VP\tw=expects\tpos=VBZ
B-NP\tw=a\tpos=DT
I-NP\tw=rise\tpos=NN
";

const HELD: &str = "\
B-NP\tw=He\tpos=PRP
B-VP\tw=expects\tpos=VBZ
B-NP\tw=the\tpos=DT
I-NP\tw=rise\tpos=NN

B-NP\tw=The\tpos=DT
I-NP\tw=deficit\tpos=NN
B-VP\tw=fell\tpos=VBD
";

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn config(dir: &Path, sources: &[&PathBuf], params: &[&str]) -> LearnConfig {
    LearnConfig {
        model_path: dir.join("out.model"),
        params: params.iter().map(|p| ParamOverride::parse(p)).collect(),
        sources: sources
            .iter()
            .map(|p| DataSource::Path(p.to_path_buf()))
            .collect(),
        ..LearnConfig::default()
    }
}

fn run(config: &LearnConfig) -> (Result<LearnReport, SeqlearnError>, String) {
    let out = Arc::new(Mutex::new(Vec::new()));
    let result = learn(config, &TrainerRegistry::default(), Arc::clone(&out));
    let text = String::from_utf8(out.lock().unwrap().clone()).unwrap();
    (result, text)
}

#[test]
fn test_two_sources_are_read_and_model_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let train = write(dir.path(), "train.txt", TRAIN);
    let more = write(dir.path(), "more.txt", MORE);
    let config = config(dir.path(), &[&train, &more], &["maxiterations=5"]);

    let (result, text) = run(&config);
    let report = result.unwrap();

    assert_eq!(report.instances, 3);
    assert_eq!(report.items, 11);
    assert_eq!(report.labels, 3);
    assert_eq!(report.attributes, 16);
    assert!(report.summary.iterations <= 5);
    assert_eq!(report.summary.holdout_instances, 0);

    assert!(text.starts_with("Start time of the training: "));
    assert!(text.contains(&format!("1 - {}\n", train.display())));
    assert!(text.contains(&format!("2 - {}\n", more.display())));
    assert!(text.contains("Number of instances: 3\n"));
    assert!(text.contains("Total number of items: 11\n"));
    assert!(text.contains("End time of the training: "));

    let model = CrfModel::load(&config.model_path).unwrap();
    assert_eq!(model.labels, vec!["B-NP", "B-VP", "I-NP"]);
}

#[test]
fn test_missing_source_aborts_without_model() {
    let dir = tempfile::tempdir().unwrap();
    let train = write(dir.path(), "train.txt", TRAIN);
    let missing = dir.path().join("missing.txt");
    let config = config(dir.path(), &[&train, &missing], &[]);

    let (result, text) = run(&config);
    let err = result.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Resource);
    match &err {
        SeqlearnError::SourceOpen { source_name, .. } => {
            assert_eq!(source_name, &missing.display().to_string());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(text.contains("1 - "));
    assert!(!text.contains("End time of the training"));
    assert!(!config.model_path.exists());
}

#[test]
fn test_unknown_parameter_fails_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let train = write(dir.path(), "train.txt", TRAIN);
    let config = config(dir.path(), &[&train], &["bogus=1"]);

    let (result, text) = run(&config);
    let err = result.unwrap_err();

    assert!(matches!(err, SeqlearnError::UnknownParameter { ref name } if name == "bogus"));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!text.contains("Reading the data set"));
    assert!(!config.model_path.exists());
}

#[test]
fn test_invalid_parameter_value_fails_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let train = write(dir.path(), "train.txt", TRAIN);
    let config = config(dir.path(), &[&train], &["c2=-1"]);

    let (result, text) = run(&config);
    assert!(matches!(result, Err(SeqlearnError::InvalidParameter { .. })));
    assert!(text.is_empty());
}

#[test]
fn test_holdout_group_is_excluded_from_fitting() {
    let dir = tempfile::tempdir().unwrap();
    let train = write(dir.path(), "train.txt", TRAIN);
    let held = write(dir.path(), "held.txt", HELD);
    let more = write(dir.path(), "more.txt", MORE);
    let mut config = config(dir.path(), &[&train, &held, &more], &["c2=0.1"]);
    config.holdout = Some(1);

    let (result, text) = run(&config);
    let report = result.unwrap();

    assert_eq!(report.instances, 5);
    assert_eq!(report.summary.holdout_instances, 2);
    let evaluation = report.summary.evaluation.unwrap();
    assert_eq!(evaluation.instances, 2);
    assert_eq!(evaluation.items, 7);
    assert!(text.contains("Item accuracy: "));
}

#[test]
fn test_absent_holdout_group_warns_and_trains_on_everything() {
    let dir = tempfile::tempdir().unwrap();
    let train = write(dir.path(), "train.txt", TRAIN);
    let mut config = config(dir.path(), &[&train], &["maxiterations=3"]);
    config.holdout = Some(4);

    let (result, text) = run(&config);
    let report = result.unwrap();

    assert_eq!(report.summary.holdout_instances, 0);
    assert!(report.summary.evaluation.is_none());
    assert!(text.contains("WARNING: holdout group 5 matches no instance"));
    assert!(config.model_path.exists());
}

#[test]
fn test_perceptron_backend_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let train = write(dir.path(), "train.txt", TRAIN);
    let mut config = config(dir.path(), &[&train], &["maxiterations=20", "shuffle.seed=1"]);
    config.algorithm = "ap".to_string();

    let (result, text) = run(&config);
    let report = result.unwrap();

    assert!(report.summary.iterations >= 1);
    assert!(text.contains("***** Epoch #1 *****"));
    assert!(CrfModel::load(&config.model_path).is_ok());
}

#[test]
fn test_malformed_lines_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let data = format!("{}\n\tw=orphan\n", TRAIN);
    let train = write(dir.path(), "train.txt", &data);
    let config = config(dir.path(), &[&train], &["maxiterations=2"]);

    let (result, text) = run(&config);
    let report = result.unwrap();

    assert_eq!(report.instances, 2);
    assert!(text.contains("WARNING: 1 malformed lines skipped"));
}
