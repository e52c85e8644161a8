use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Mate, ReadFile, SampleId, SampleRecord};
use crate::error::PipelineError;
use crate::naming::NamingConvention;

pub const READ_FILE_SUFFIX: &str = ".fastq.gz";

pub struct FileScanner;

impl FileScanner {
    pub fn scan(directory: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PipelineError> {
        let entries = fs::read_dir(directory.as_std_path()).map_err(|err| {
            PipelineError::Filesystem(format!("read directory {directory}: {err}"))
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
                debug!("skipping non-utf8 file name in {directory}");
                continue;
            };
            let is_read_file = path
                .file_name()
                .map(|name| name.ends_with(READ_FILE_SUFFIX))
                .unwrap_or(false);
            if is_read_file {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PairingIssue {
    InvalidId { file: Utf8PathBuf, token: String },
    MissingForward { sample_id: SampleId },
    MissingReverse { sample_id: SampleId, forward: Utf8PathBuf },
    DuplicateMate { sample_id: SampleId, mate: Mate, file: Utf8PathBuf },
}

impl fmt::Display for PairingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingIssue::InvalidId { file, token } => {
                write!(f, "id {token} of {file} is not a valid sample id")
            }
            PairingIssue::MissingForward { sample_id } => {
                write!(f, "could not pair {sample_id}: no forward read")
            }
            PairingIssue::MissingReverse { sample_id, forward } => {
                write!(f, "could not pair {sample_id}: no reverse read for {forward}")
            }
            PairingIssue::DuplicateMate {
                sample_id,
                mate,
                file,
            } => write!(f, "ignoring extra {mate} read for {sample_id}: {file}"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SampleDictionary {
    records: BTreeMap<SampleId, SampleRecord>,
    issues: Vec<PairingIssue>,
}

impl SampleDictionary {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, sample_id: &str) -> Option<&SampleRecord> {
        self.records.get(sample_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &SampleRecord> {
        self.records.values()
    }

    pub fn sample_ids(&self) -> Vec<SampleId> {
        self.records.keys().cloned().collect()
    }

    pub fn issues(&self) -> &[PairingIssue] {
        &self.issues
    }
}

pub struct SampleDictionaryBuilder<'a> {
    convention: &'a dyn NamingConvention,
}

impl<'a> SampleDictionaryBuilder<'a> {
    pub fn new(convention: &'a dyn NamingConvention) -> Self {
        Self { convention }
    }

    pub fn build(&self, directory: &Utf8Path) -> Result<SampleDictionary, PipelineError> {
        let directory = absolute_dir(directory)?;
        info!("scanning {directory} for valid {} sample ids", self.convention.name());
        let files = FileScanner::scan(&directory)?;
        let dictionary = self.from_files(&files);
        debug!(
            "sample dictionary: {:?}",
            dictionary.sample_ids().iter().map(SampleId::as_str).collect::<Vec<_>>()
        );
        Ok(dictionary)
    }

    pub fn from_files(&self, files: &[Utf8PathBuf]) -> SampleDictionary {
        let (paired, mut issues) = self.pair(files);
        let mut records = BTreeMap::new();
        for record in paired {
            if record.is_complete() {
                records.insert(record.sample_id.clone(), record);
            } else {
                let issue = PairingIssue::MissingReverse {
                    sample_id: record.sample_id.clone(),
                    forward: record.forward.path.clone(),
                };
                warn!("{issue}");
                issues.push(issue);
            }
        }
        SampleDictionary { records, issues }
    }

    pub fn pair(&self, files: &[Utf8PathBuf]) -> (Vec<SampleRecord>, Vec<PairingIssue>) {
        let mut issues = Vec::new();
        let mut valid = Vec::new();
        let mut sample_ids = BTreeSet::new();

        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            match self.convention.validate(name) {
                Ok(sample_id) => {
                    sample_ids.insert(sample_id.clone());
                    valid.push((sample_id, file));
                }
                Err(token) => {
                    let issue = PairingIssue::InvalidId {
                        file: file.clone(),
                        token,
                    };
                    warn!("{issue}");
                    issues.push(issue);
                }
            }
        }

        let mut records = Vec::with_capacity(sample_ids.len());
        for sample_id in sample_ids {
            let mut forward: Option<ReadFile> = None;
            let mut reverse: Option<ReadFile> = None;
            for (_, file) in valid.iter().filter(|(id, _)| *id == sample_id) {
                let name = file.file_name().unwrap_or_default();
                let Some(mate) = self.convention.mate(name) else {
                    debug!("{file} carries no mate marker, skipping");
                    continue;
                };
                let slot = match mate {
                    Mate::Forward => &mut forward,
                    Mate::Reverse => &mut reverse,
                };
                if slot.is_some() {
                    let issue = PairingIssue::DuplicateMate {
                        sample_id: sample_id.clone(),
                        mate,
                        file: (*file).clone(),
                    };
                    warn!("{issue}");
                    issues.push(issue);
                    continue;
                }
                *slot = Some(ReadFile {
                    path: (*file).clone(),
                    mate,
                });
            }

            match forward {
                Some(forward) => records.push(SampleRecord {
                    sample_id,
                    forward,
                    reverse,
                }),
                None => {
                    let issue = PairingIssue::MissingForward { sample_id };
                    warn!("{issue}");
                    issues.push(issue);
                }
            }
        }
        (records, issues)
    }
}

fn absolute_dir(directory: &Utf8Path) -> Result<Utf8PathBuf, PipelineError> {
    if !directory.as_std_path().is_dir() {
        return Err(PipelineError::MissingInput(directory.to_path_buf()));
    }
    let canonical = fs::canonicalize(directory.as_std_path())
        .map_err(|err| PipelineError::Filesystem(format!("resolve {directory}: {err}")))?;
    Utf8PathBuf::from_path_buf(canonical)
        .map_err(|_| PipelineError::Filesystem("non-utf8 input directory".to_string()))
}
