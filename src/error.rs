use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::domain::Stage;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("output directory already exists: {0}")]
    #[diagnostic(help("choose a new output directory; runs never reuse an existing one"))]
    OutputDirExists(Utf8PathBuf),

    #[error("failed to set up working directory: {0}")]
    Setup(String),

    #[error("input not found: {0}")]
    MissingInput(Utf8PathBuf),

    #[error("a trained classifier artifact is required for a full run")]
    #[diagnostic(help("pass --classifier, or use --qc-only / --filter-only"))]
    MissingClassifier,

    #[error("no complete read pairs found in {0}")]
    NoSamples(Utf8PathBuf),

    #[error("symbolic link already exists: {0}")]
    SymlinkCollision(Utf8PathBuf),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("engine invocation failed: {0}")]
    EngineInvocation(String),

    #[error("stage {stage} failed: {message}")]
    StageFailed { stage: Stage, message: String },

    #[error("invalid artifact archive {path}: {message}")]
    InvalidArtifact { path: Utf8PathBuf, message: String },

    #[error("invalid sample id: {0}")]
    InvalidSampleId(String),

    #[error("invalid primer sequence: {0}")]
    InvalidPrimer(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
