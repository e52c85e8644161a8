use assert_matches::assert_matches;

use amplicon_pipeline::domain::{Mode, Primer, SampleId, Stage};
use amplicon_pipeline::error::PipelineError;

#[test]
fn parse_sample_id_valid() {
    let id: SampleId = " 2017-SEQ-1113 ".parse().unwrap();
    assert_eq!(id.as_str(), "2017-SEQ-1113");
}

#[test]
fn parse_sample_id_invalid() {
    let err = "".parse::<SampleId>().unwrap_err();
    assert_matches!(err, PipelineError::InvalidSampleId(_));
    assert!("soil 42".parse::<SampleId>().is_err());
}

#[test]
fn parse_primer_normalizes_case() {
    let primer: Primer = "gtgccagcmgccgcggtaa".parse().unwrap();
    assert_eq!(primer.as_str(), "GTGCCAGCMGCCGCGGTAA");
}

#[test]
fn parse_primer_invalid() {
    let err = "GTGXX".parse::<Primer>().unwrap_err();
    assert_matches!(err, PipelineError::InvalidPrimer(_));
    assert!("".parse::<Primer>().is_err());
}

#[test]
fn full_mode_covers_every_stage() {
    let stages: Vec<_> = Mode::Full.stages().collect();
    assert_eq!(stages, Stage::ALL.to_vec());
    assert!(Mode::Full.requires_classifier());
    assert!(!Mode::FilteringOnly.requires_classifier());
}

#[test]
fn filtering_only_stops_after_denoise_viz() {
    let stages: Vec<_> = Mode::FilteringOnly.stages().collect();
    assert_eq!(stages.last(), Some(&Stage::DenoiseViz));
    assert!(!stages.contains(&Stage::AlignMask));
}

#[test]
fn stage_names() {
    assert_eq!(Stage::AlignMask.as_str(), "ALIGN_MASK");
    assert_eq!(Stage::DemuxSummary.to_string(), "DEMUX_SUMMARY");
    assert_eq!(
        serde_json::to_string(&Stage::ExportTree).unwrap(),
        "\"EXPORT_TREE\""
    );
}
