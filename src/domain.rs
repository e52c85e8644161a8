use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleId(String);

impl SampleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SampleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SampleId {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && !trimmed
                .chars()
                .any(|ch| ch.is_whitespace() || ch == '/' || ch == '\\');
        if !is_valid {
            return Err(PipelineError::InvalidSampleId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mate {
    Forward,
    Reverse,
}

impl fmt::Display for Mate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mate::Forward => write!(f, "forward"),
            Mate::Reverse => write!(f, "reverse"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadFile {
    pub path: Utf8PathBuf,
    pub mate: Mate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRecord {
    pub sample_id: SampleId,
    pub forward: ReadFile,
    pub reverse: Option<ReadFile>,
}

impl SampleRecord {
    pub fn is_complete(&self) -> bool {
        self.reverse.is_some()
    }

    pub fn read_pair(&self) -> Option<(&Utf8Path, &Utf8Path)> {
        self.reverse
            .as_ref()
            .map(|reverse| (self.forward.path.as_path(), reverse.path.as_path()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    QualityControl,
    FilteringOnly,
    Full,
}

impl Mode {
    pub fn last_stage(&self) -> Stage {
        match self {
            Mode::QualityControl => Stage::DemuxSummary,
            Mode::FilteringOnly => Stage::DenoiseViz,
            Mode::Full => Stage::Diversity,
        }
    }

    pub fn requires_classifier(&self) -> bool {
        matches!(self, Mode::Full)
    }

    pub fn stages(self) -> impl Iterator<Item = Stage> {
        let last = self.last_stage();
        Stage::ALL.into_iter().take_while(move |stage| *stage <= last)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::QualityControl => write!(f, "quality-control"),
            Mode::FilteringOnly => write!(f, "filtering-only"),
            Mode::Full => write!(f, "full"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Setup,
    Import,
    MetadataViz,
    DemuxSummary,
    Denoise,
    DenoiseViz,
    AlignMask,
    Tree,
    ExportTree,
    Rarefaction,
    Classify,
    ClassifyViz,
    Diversity,
}

impl Stage {
    pub const ALL: [Stage; 13] = [
        Stage::Setup,
        Stage::Import,
        Stage::MetadataViz,
        Stage::DemuxSummary,
        Stage::Denoise,
        Stage::DenoiseViz,
        Stage::AlignMask,
        Stage::Tree,
        Stage::ExportTree,
        Stage::Rarefaction,
        Stage::Classify,
        Stage::ClassifyViz,
        Stage::Diversity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Setup => "SETUP",
            Stage::Import => "IMPORT",
            Stage::MetadataViz => "METADATA_VIZ",
            Stage::DemuxSummary => "DEMUX_SUMMARY",
            Stage::Denoise => "DENOISE",
            Stage::DenoiseViz => "DENOISE_VIZ",
            Stage::AlignMask => "ALIGN_MASK",
            Stage::Tree => "TREE",
            Stage::ExportTree => "EXPORT_TREE",
            Stage::Rarefaction => "RAREFACTION",
            Stage::Classify => "CLASSIFY",
            Stage::ClassifyViz => "CLASSIFY_VIZ",
            Stage::Diversity => "DIVERSITY",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Primer(String);

impl Primer {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Primer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Primer {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| "ACGTURYSWKMBDHVN".contains(ch));
        if !is_valid {
            return Err(PipelineError::InvalidPrimer(value.to_string()));
        }
        Ok(Self(normalized))
    }
}
