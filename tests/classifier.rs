use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use amplicon_pipeline::classifier::{CLASSIFIER, ClassifierTrainer, REFERENCE_READS, TrainRequest};
use amplicon_pipeline::engine::{AnalysisEngine, Artifact, ImportRequest, Invocation};
use amplicon_pipeline::error::PipelineError;
use amplicon_pipeline::output::JsonOutput;

#[derive(Default)]
struct RecordingEngine {
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingEngine {
    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

fn write_placeholder(path: &Utf8Path) {
    fs::write(path.as_std_path(), b"placeholder").unwrap();
}

impl AnalysisEngine for RecordingEngine {
    fn import(&self, request: &ImportRequest) -> Result<Artifact, PipelineError> {
        self.calls.lock().unwrap().push(request.to_args()?);
        write_placeholder(&request.output_path);
        Ok(Artifact::new(request.kind, request.output_path.clone()))
    }

    fn invoke(&self, invocation: &Invocation) -> Result<Vec<Artifact>, PipelineError> {
        self.calls.lock().unwrap().push(invocation.to_args());
        let artifacts = invocation.artifacts();
        for artifact in &artifacts {
            write_placeholder(artifact.path());
        }
        Ok(artifacts)
    }

    fn export(&self, _artifact: &Artifact, _destination: &Utf8Path) -> Result<(), PipelineError> {
        Err(PipelineError::EngineInvocation("unexpected export".to_string()))
    }

    fn tool_info(&self) -> Option<String> {
        None
    }
}

fn setup() -> (tempfile::TempDir, TrainRequest) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    fs::write(root.join("99_otus.fasta").as_std_path(), ">1\nACGT\n").unwrap();
    fs::write(
        root.join("99_otu_taxonomy.txt").as_std_path(),
        "1\tk__Bacteria; p__Firmicutes\n",
    )
    .unwrap();
    let request = TrainRequest {
        reference_fasta: root.join("99_otus.fasta"),
        reference_taxonomy: root.join("99_otu_taxonomy.txt"),
        outdir: root.join("classifier-v4"),
        forward_primer: "GTGCCAGCMGCCGCGGTAA".to_string(),
        reverse_primer: "ggactachvgggtwtctaat".to_string(),
    };
    (temp, request)
}

#[test]
fn train_runs_imports_then_extract_then_fit() {
    let (_temp, request) = setup();
    let trainer = ClassifierTrainer::new(RecordingEngine::default());

    let report = trainer.train(&request, &JsonOutput).unwrap();

    let calls = trainer.engine().calls();
    let operations: Vec<String> = calls.iter().map(|args| args[..2].join(" ")).collect();
    assert_eq!(
        operations,
        vec![
            "tools import",
            "tools import",
            "feature-classifier extract-reads",
            "feature-classifier fit-classifier-naive-bayes",
        ]
    );
    assert!(calls[1].contains(&"HeaderlessTSVTaxonomyFormat".to_string()));
    assert!(calls[2].contains(&"GGACTACHVGGGTWTCTAAT".to_string()));

    let outdir = &request.outdir;
    assert_eq!(
        report.reference_sequences.path().as_str(),
        outdir.join("99_otus.qza").as_str()
    );
    assert_eq!(
        report.reference_taxonomy.path().as_str(),
        outdir.join("99_otu_taxonomy.qza").as_str()
    );
    assert_eq!(
        report.reference_reads.path().as_str(),
        outdir.join(REFERENCE_READS).as_str()
    );
    assert_eq!(
        report.classifier.path().as_str(),
        outdir.join(CLASSIFIER).as_str()
    );
    assert!(report.classifier.path().as_std_path().exists());
}

#[test]
fn existing_outdir_is_rejected() {
    let (_temp, request) = setup();
    fs::create_dir(request.outdir.as_std_path()).unwrap();
    let trainer = ClassifierTrainer::new(RecordingEngine::default());

    assert_matches!(
        trainer.train(&request, &JsonOutput),
        Err(PipelineError::OutputDirExists(_))
    );
    assert!(trainer.engine().calls().is_empty());
}

#[test]
fn invalid_primer_fails_before_outdir_is_created() {
    let (_temp, mut request) = setup();
    request.reverse_primer = "GGACT-ACH".to_string();
    let trainer = ClassifierTrainer::new(RecordingEngine::default());

    assert_matches!(
        trainer.train(&request, &JsonOutput),
        Err(PipelineError::InvalidPrimer(_))
    );
    assert!(!request.outdir.as_std_path().exists());
}
