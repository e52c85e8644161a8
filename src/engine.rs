use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::error::PipelineError;
use crate::fs_util;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    PairedSequences,
    FeatureTable,
    RepresentativeSequences,
    DenoisingStats,
    Alignment,
    MaskedAlignment,
    UnrootedTree,
    RootedTree,
    NewickTree,
    Taxonomy,
    DistanceMatrix,
    AlphaDiversity,
    Classifier,
    ReferenceSequences,
    ReferenceTaxonomy,
    Visualization,
}

impl ArtifactKind {
    pub fn semantic_type(&self) -> Option<&'static str> {
        match self {
            ArtifactKind::PairedSequences => Some("SampleData[PairedEndSequencesWithQuality]"),
            ArtifactKind::FeatureTable => Some("FeatureTable[Frequency]"),
            ArtifactKind::RepresentativeSequences | ArtifactKind::ReferenceSequences => {
                Some("FeatureData[Sequence]")
            }
            ArtifactKind::DenoisingStats => Some("SampleData[DADA2Stats]"),
            ArtifactKind::Alignment | ArtifactKind::MaskedAlignment => {
                Some("FeatureData[AlignedSequence]")
            }
            ArtifactKind::UnrootedTree => Some("Phylogeny[Unrooted]"),
            ArtifactKind::RootedTree => Some("Phylogeny[Rooted]"),
            ArtifactKind::Taxonomy | ArtifactKind::ReferenceTaxonomy => {
                Some("FeatureData[Taxonomy]")
            }
            ArtifactKind::DistanceMatrix => Some("DistanceMatrix"),
            ArtifactKind::AlphaDiversity => Some("SampleData[AlphaDiversity]"),
            ArtifactKind::Classifier => Some("TaxonomicClassifier"),
            ArtifactKind::NewickTree | ArtifactKind::Visualization => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.semantic_type() {
            Some(semantic_type) => write!(f, "{semantic_type}"),
            None => match self {
                ArtifactKind::NewickTree => write!(f, "Newick tree"),
                _ => write!(f, "Visualization"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    kind: ArtifactKind,
    path: Utf8PathBuf,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub kind: ArtifactKind,
    pub input_path: Utf8PathBuf,
    pub output_path: Utf8PathBuf,
    pub input_format: Option<String>,
}

impl ImportRequest {
    pub fn to_args(&self) -> Result<Vec<String>, PipelineError> {
        let semantic_type = self.kind.semantic_type().ok_or_else(|| {
            PipelineError::EngineInvocation(format!("{} cannot be imported", self.kind))
        })?;
        let mut args = vec![
            "tools".to_string(),
            "import".to_string(),
            "--type".to_string(),
            semantic_type.to_string(),
            "--input-path".to_string(),
            self.input_path.to_string(),
            "--output-path".to_string(),
            self.output_path.to_string(),
        ];
        if let Some(format) = &self.input_format {
            args.push("--input-format".to_string());
            args.push(format.clone());
        }
        Ok(args)
    }
}

#[derive(Debug, Clone)]
pub struct MetadataInput {
    pub name: String,
    pub path: Utf8PathBuf,
    pub column: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OutputSlot {
    pub name: String,
    pub kind: ArtifactKind,
    pub path: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub plugin: String,
    pub action: String,
    pub inputs: Vec<(String, Artifact)>,
    pub parameters: Vec<(String, String)>,
    pub metadata: Vec<MetadataInput>,
    pub outputs: Vec<OutputSlot>,
    pub output_dir: Option<Utf8PathBuf>,
}

impl Invocation {
    pub fn new(plugin: &str, action: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
            action: action.to_string(),
            inputs: Vec::new(),
            parameters: Vec::new(),
            metadata: Vec::new(),
            outputs: Vec::new(),
            output_dir: None,
        }
    }

    pub fn input(mut self, name: &str, artifact: &Artifact) -> Self {
        self.inputs.push((name.to_string(), artifact.clone()));
        self
    }

    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.parameters.push((name.to_string(), value.to_string()));
        self
    }

    pub fn metadata(mut self, name: &str, path: &Utf8Path) -> Self {
        self.metadata.push(MetadataInput {
            name: name.to_string(),
            path: path.to_path_buf(),
            column: None,
        });
        self
    }

    pub fn metadata_column(mut self, name: &str, path: &Utf8Path, column: &str) -> Self {
        self.metadata.push(MetadataInput {
            name: name.to_string(),
            path: path.to_path_buf(),
            column: Some(column.to_string()),
        });
        self
    }

    pub fn output(mut self, name: &str, kind: ArtifactKind, path: impl Into<Utf8PathBuf>) -> Self {
        self.outputs.push(OutputSlot {
            name: name.to_string(),
            kind,
            path: path.into(),
        });
        self
    }

    pub fn output_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn operation(&self) -> String {
        format!("{} {}", self.plugin, self.action)
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.plugin.clone(), self.action.clone()];
        for (name, artifact) in &self.inputs {
            args.push(format!("--i-{name}"));
            args.push(artifact.path().to_string());
        }
        for (name, value) in &self.parameters {
            args.push(format!("--p-{name}"));
            args.push(value.clone());
        }
        for metadata in &self.metadata {
            args.push(format!("--m-{}-file", metadata.name));
            args.push(metadata.path.to_string());
            if let Some(column) = &metadata.column {
                args.push(format!("--m-{}-column", metadata.name));
                args.push(column.clone());
            }
        }
        match &self.output_dir {
            Some(dir) => {
                args.push("--output-dir".to_string());
                args.push(dir.to_string());
            }
            None => {
                for slot in &self.outputs {
                    args.push(format!("--o-{}", slot.name));
                    args.push(slot.path.to_string());
                }
            }
        }
        args
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.outputs
            .iter()
            .map(|slot| Artifact::new(slot.kind, slot.path.clone()))
            .collect()
    }
}

pub trait AnalysisEngine: Send + Sync {
    fn import(&self, request: &ImportRequest) -> Result<Artifact, PipelineError>;
    fn invoke(&self, invocation: &Invocation) -> Result<Vec<Artifact>, PipelineError>;
    fn export(&self, artifact: &Artifact, destination: &Utf8Path) -> Result<(), PipelineError>;
    fn tool_info(&self) -> Option<String>;

    // One artifact per declared output slot, in slot order, or an error.
    fn invoke_checked(&self, invocation: &Invocation) -> Result<Vec<Artifact>, PipelineError> {
        let produced = self.invoke(invocation)?;
        if produced.len() != invocation.outputs.len() {
            return Err(PipelineError::EngineInvocation(format!(
                "{} returned {} of {} declared outputs",
                invocation.operation(),
                produced.len(),
                invocation.outputs.len()
            )));
        }
        Ok(produced)
    }
}

#[derive(Debug, Clone)]
pub struct QiimeCli {
    program: Option<PathBuf>,
}

impl Default for QiimeCli {
    fn default() -> Self {
        Self::new()
    }
}

impl QiimeCli {
    pub fn new() -> Self {
        Self {
            program: fs_util::find_in_path("qiime"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    fn require_program(&self) -> Result<&PathBuf, PipelineError> {
        self.program
            .as_ref()
            .ok_or_else(|| PipelineError::MissingTool("qiime (QIIME 2)".to_string()))
    }

    fn run_cmd(&self, args: &[String]) -> Result<(), PipelineError> {
        let program = self.require_program()?;
        debug!("running {} {}", program.display(), args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| PipelineError::EngineInvocation(err.to_string()))?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stdout.is_empty() || !stderr.is_empty() {
            debug!("OUT: {stdout}\nERR: {stderr}");
        }
        if output.status.success() {
            return Ok(());
        }
        let message = if stderr.is_empty() {
            format!("command failed ({}): {}", output.status, program.display())
        } else {
            stderr
        };
        Err(PipelineError::EngineInvocation(message))
    }

    fn verify(artifact: &Artifact) -> Result<(), PipelineError> {
        if !artifact.path().as_std_path().exists() {
            return Err(PipelineError::EngineInvocation(format!(
                "engine reported success but {} was not written",
                artifact.path()
            )));
        }
        if fs_util::is_archive_path(artifact.path()) {
            fs_util::validate_archive(artifact.path())?;
        }
        Ok(())
    }
}

impl AnalysisEngine for QiimeCli {
    fn import(&self, request: &ImportRequest) -> Result<Artifact, PipelineError> {
        self.run_cmd(&request.to_args()?)?;
        let artifact = Artifact::new(request.kind, request.output_path.clone());
        Self::verify(&artifact)?;
        Ok(artifact)
    }

    fn invoke(&self, invocation: &Invocation) -> Result<Vec<Artifact>, PipelineError> {
        self.run_cmd(&invocation.to_args())?;
        let artifacts = invocation.artifacts();
        for artifact in &artifacts {
            Self::verify(artifact)?;
        }
        Ok(artifacts)
    }

    fn export(&self, artifact: &Artifact, destination: &Utf8Path) -> Result<(), PipelineError> {
        let args = vec![
            "tools".to_string(),
            "export".to_string(),
            "--input-path".to_string(),
            artifact.path().to_string(),
            "--output-path".to_string(),
            destination.to_string(),
        ];
        self.run_cmd(&args)
    }

    fn tool_info(&self) -> Option<String> {
        self.program
            .as_ref()
            .and_then(|path| tool_version(path, &["--version"]))
    }
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn invocation_args() {
        let seqs = Artifact::new(ArtifactKind::PairedSequences, "/out/qiime2/paired-sample-data.qza");
        let invocation = Invocation::new("dada2", "denoise-paired")
            .input("demultiplexed-seqs", &seqs)
            .param("trunc-len-r", 260)
            .output("table", ArtifactKind::FeatureTable, "/out/qiime2/table-dada2.qza");
        assert_eq!(
            invocation.to_args(),
            vec![
                "dada2",
                "denoise-paired",
                "--i-demultiplexed-seqs",
                "/out/qiime2/paired-sample-data.qza",
                "--p-trunc-len-r",
                "260",
                "--o-table",
                "/out/qiime2/table-dada2.qza",
            ]
        );
    }

    #[test]
    fn output_dir_replaces_output_flags() {
        let invocation = Invocation::new("diversity", "core-metrics-phylogenetic")
            .metadata_column("metadata", Utf8Path::new("meta.tsv"), "SampleType")
            .output("faith-pd-vector", ArtifactKind::AlphaDiversity, "core/faith_pd_vector.qza")
            .output_dir("core");
        let args = invocation.to_args();
        assert!(args.ends_with(&["--output-dir".to_string(), "core".to_string()]));
        assert!(args.contains(&"--m-metadata-column".to_string()));
        assert!(!args.iter().any(|arg| arg.starts_with("--o-")));
    }

    #[test]
    fn import_args_require_semantic_type() {
        let request = ImportRequest {
            kind: ArtifactKind::Visualization,
            input_path: "in".into(),
            output_path: "out.qzv".into(),
            input_format: None,
        };
        assert_matches!(request.to_args(), Err(PipelineError::EngineInvocation(_)));
    }

    #[test]
    fn missing_program_is_reported() {
        let engine = QiimeCli { program: None };
        let request = ImportRequest {
            kind: ArtifactKind::PairedSequences,
            input_path: "data".into(),
            output_path: "paired-sample-data.qza".into(),
            input_format: Some("CasavaOneEightSingleLanePerSampleDirFmt".to_string()),
        };
        assert_matches!(engine.import(&request), Err(PipelineError::MissingTool(_)));
    }
}
