use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use amplicon_pipeline::domain::Mate;
use amplicon_pipeline::error::PipelineError;
use amplicon_pipeline::naming::{LeadingTokenConvention, OlcConvention};
use amplicon_pipeline::samples::{FileScanner, PairingIssue, SampleDictionaryBuilder};

fn utf8_dir(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

fn touch(dir: &Utf8Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name).as_std_path(), b"@read\nACGT\n+\nIIII\n").unwrap();
    }
}

#[test]
fn scanner_lists_only_compressed_reads() {
    let temp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&temp);
    touch(
        &dir,
        &[
            "2017-SEQ-1113_S1_L001_R2_001.fastq.gz",
            "2017-SEQ-1113_S1_L001_R1_001.fastq.gz",
            "notes.txt",
            "2017-SEQ-1113_S1_L001_R1_001.fastq",
        ],
    );
    fs::create_dir(dir.join("nested.fastq.gz").as_std_path()).unwrap();

    let files = FileScanner::scan(&dir).unwrap();
    let names: Vec<_> = files.iter().filter_map(|path| path.file_name()).collect();
    assert_eq!(
        names,
        vec![
            "2017-SEQ-1113_S1_L001_R1_001.fastq.gz",
            "2017-SEQ-1113_S1_L001_R2_001.fastq.gz",
        ]
    );
}

#[test]
fn scanner_accepts_empty_directory() {
    let temp = tempfile::tempdir().unwrap();
    assert!(FileScanner::scan(&utf8_dir(&temp)).unwrap().is_empty());
}

#[test]
fn dictionary_holds_only_complete_valid_pairs() {
    let temp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&temp);
    touch(
        &dir,
        &[
            "2017-SEQ-1113_S1_L001_R1_001.fastq.gz",
            "2017-SEQ-1113_S1_L001_R2_001.fastq.gz",
            "2017-SEQ-1114_S2_L001_R1_001.fastq.gz",
            "2017-SEQ-1114_S2_L001_R2_001.fastq.gz",
            "2018-SEQ-0001_S3_L001_R1_001.fastq.gz",
            "2018-SEQ-0001_S3_L001_R2_001.fastq.gz",
            "MOCK_S4_L001_R1_001.fastq.gz",
            "MOCK_S4_L001_R2_001.fastq.gz",
            "2019-SEQ-0042_S5_L001_R1_001.fastq.gz",
        ],
    );

    let dictionary = SampleDictionaryBuilder::new(&OlcConvention).build(&dir).unwrap();
    assert_eq!(dictionary.len(), 3);
    let ids: Vec<_> = dictionary
        .sample_ids()
        .iter()
        .map(|id| id.as_str().to_string())
        .collect();
    assert_eq!(ids, vec!["2017-SEQ-1113", "2017-SEQ-1114", "2018-SEQ-0001"]);
    for record in dictionary.records() {
        assert!(record.is_complete());
        assert_eq!(record.forward.mate, Mate::Forward);
        assert!(record.forward.path.is_absolute());
    }

    let invalid = dictionary
        .issues()
        .iter()
        .filter(|issue| matches!(issue, PairingIssue::InvalidId { .. }))
        .count();
    assert_eq!(invalid, 2);
    assert!(dictionary.issues().iter().any(|issue| matches!(
        issue,
        PairingIssue::MissingReverse { sample_id, .. } if sample_id.as_str() == "2019-SEQ-0042"
    )));
}

#[test]
fn invalid_token_is_reported_not_raised() {
    let temp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&temp);
    touch(&dir, &["Undetermined_S0_L001_R1_001.fastq.gz"]);

    let dictionary = SampleDictionaryBuilder::new(&OlcConvention).build(&dir).unwrap();
    assert!(dictionary.is_empty());
    assert_matches!(
        dictionary.issues(),
        [PairingIssue::InvalidId { token, .. }] if token == "Undetermined_"
    );
}

#[test]
fn leading_token_convention_pairs_free_form_names() {
    let temp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&temp);
    touch(
        &dir,
        &[
            "soil42_S3_L001_R1_001.fastq.gz",
            "soil42_S3_L001_R2_001.fastq.gz",
        ],
    );

    let dictionary = SampleDictionaryBuilder::new(&LeadingTokenConvention)
        .build(&dir)
        .unwrap();
    let record = dictionary.get("soil42").unwrap();
    assert_eq!(record.reverse.as_ref().unwrap().mate, Mate::Reverse);
}

#[test]
fn build_requires_existing_directory() {
    let temp = tempfile::tempdir().unwrap();
    let missing = utf8_dir(&temp).join("absent");
    assert_matches!(
        SampleDictionaryBuilder::new(&OlcConvention).build(&missing),
        Err(PipelineError::MissingInput(_))
    );
}
