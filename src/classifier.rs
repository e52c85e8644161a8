use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::info;

use crate::domain::Primer;
use crate::engine::{AnalysisEngine, Artifact, ArtifactKind, ImportRequest, Invocation};
use crate::error::PipelineError;
use crate::pipeline::{ProgressEvent, ProgressSink};
use crate::staging::StagingLayout;

pub const REFERENCE_READS: &str = "ref-seqs.qza";
pub const CLASSIFIER: &str = "classifier.qza";
const TAXONOMY_FORMAT: &str = "HeaderlessTSVTaxonomyFormat";

#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub reference_fasta: Utf8PathBuf,
    pub reference_taxonomy: Utf8PathBuf,
    pub outdir: Utf8PathBuf,
    pub forward_primer: String,
    pub reverse_primer: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    pub outdir: Utf8PathBuf,
    pub forward_primer: Primer,
    pub reverse_primer: Primer,
    pub reference_sequences: Artifact,
    pub reference_taxonomy: Artifact,
    pub reference_reads: Artifact,
    pub classifier: Artifact,
    pub elapsed_ms: u128,
}

pub struct ClassifierTrainer<E: AnalysisEngine> {
    engine: E,
}

impl<E: AnalysisEngine> ClassifierTrainer<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn train(
        &self,
        request: &TrainRequest,
        sink: &dyn ProgressSink,
    ) -> Result<TrainReport, PipelineError> {
        let forward_primer: Primer = request.forward_primer.parse()?;
        let reverse_primer: Primer = request.reverse_primer.parse()?;
        for input in [&request.reference_fasta, &request.reference_taxonomy] {
            if !input.as_std_path().is_file() {
                return Err(PipelineError::MissingInput(input.clone()));
            }
        }
        StagingLayout::ensure_absent(&request.outdir)?;
        fs::create_dir_all(request.outdir.as_std_path())
            .map_err(|err| PipelineError::Setup(format!("create {}: {err}", request.outdir)))?;

        let start = Instant::now();
        let (sequences_path, taxonomy_path) = reference_paths(request);

        progress(sink, "importing reference sequences");
        let reference_sequences = self.engine.import(&ImportRequest {
            kind: ArtifactKind::ReferenceSequences,
            input_path: request.reference_fasta.clone(),
            output_path: sequences_path,
            input_format: None,
        })?;

        progress(sink, "importing reference taxonomy");
        let reference_taxonomy = self.engine.import(&ImportRequest {
            kind: ArtifactKind::ReferenceTaxonomy,
            input_path: request.reference_taxonomy.clone(),
            output_path: taxonomy_path,
            input_format: Some(TAXONOMY_FORMAT.to_string()),
        })?;

        progress(sink, "extracting reference reads");
        let reference_reads = single(self.engine.invoke_checked(
            &Invocation::new("feature-classifier", "extract-reads")
                .input("sequences", &reference_sequences)
                .param("f-primer", &forward_primer)
                .param("r-primer", &reverse_primer)
                .output(
                    "reads",
                    ArtifactKind::ReferenceSequences,
                    request.outdir.join(REFERENCE_READS),
                ),
        )?)?;

        progress(sink, "fitting naive Bayes classifier");
        let classifier = single(self.engine.invoke_checked(
            &Invocation::new("feature-classifier", "fit-classifier-naive-bayes")
                .input("reference-reads", &reference_reads)
                .input("reference-taxonomy", &reference_taxonomy)
                .output(
                    "classifier",
                    ArtifactKind::Classifier,
                    request.outdir.join(CLASSIFIER),
                ),
        )?)?;

        let elapsed = start.elapsed();
        info!("classifier written to {}", classifier.path());
        sink.event(ProgressEvent {
            stage: None,
            message: format!("classifier saved: {}", classifier.path()),
            elapsed: Some(elapsed),
        });

        Ok(TrainReport {
            outdir: request.outdir.clone(),
            forward_primer,
            reverse_primer,
            reference_sequences,
            reference_taxonomy,
            reference_reads,
            classifier,
            elapsed_ms: elapsed.as_millis(),
        })
    }
}

pub fn reference_paths(request: &TrainRequest) -> (Utf8PathBuf, Utf8PathBuf) {
    let sequences_stem = file_stem(&request.reference_fasta);
    let mut taxonomy_stem = file_stem(&request.reference_taxonomy);
    if taxonomy_stem == sequences_stem {
        taxonomy_stem.push_str("-taxonomy");
    }
    (
        request.outdir.join(format!("{sequences_stem}.qza")),
        request.outdir.join(format!("{taxonomy_stem}.qza")),
    )
}

fn file_stem(path: &Utf8Path) -> String {
    path.file_stem().unwrap_or("reference").to_string()
}

fn single(mut produced: Vec<Artifact>) -> Result<Artifact, PipelineError> {
    produced
        .pop()
        .ok_or_else(|| PipelineError::EngineInvocation("engine returned no artifact".to_string()))
}

fn progress(sink: &dyn ProgressSink, message: &str) {
    info!("{message}");
    sink.event(ProgressEvent {
        stage: None,
        message: message.to_string(),
        elapsed: None,
    });
}
