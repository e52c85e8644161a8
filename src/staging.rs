use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::{SampleId, SampleRecord};
use crate::error::PipelineError;
use crate::naming::NamingConvention;
use crate::samples::{FileScanner, PairingIssue, SampleDictionary, SampleDictionaryBuilder};

pub const DATA_DIR: &str = "data";
pub const ANALYSIS_DIR: &str = "qiime2";
pub const INDEX_TOKEN: &str = "_00";

#[derive(Debug, Clone, Serialize)]
pub struct StagingLayout {
    root: Utf8PathBuf,
    data_dir: Utf8PathBuf,
    analysis_dir: Utf8PathBuf,
}

impl StagingLayout {
    pub fn new(root: &Utf8Path) -> Self {
        Self {
            root: root.to_path_buf(),
            data_dir: root.join(DATA_DIR),
            analysis_dir: root.join(ANALYSIS_DIR),
        }
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn analysis_dir(&self) -> &Utf8Path {
        &self.analysis_dir
    }

    pub fn analysis_path(&self, file_name: &str) -> Utf8PathBuf {
        self.analysis_dir.join(file_name)
    }

    pub fn ensure_absent(root: &Utf8Path) -> Result<(), PipelineError> {
        if root.as_std_path().exists() || root.as_std_path().is_symlink() {
            return Err(PipelineError::OutputDirExists(root.to_path_buf()));
        }
        Ok(())
    }

    pub fn create(root: &Utf8Path) -> Result<Self, PipelineError> {
        Self::ensure_absent(root)?;
        let layout = Self::new(root);
        fs::create_dir(layout.root.as_std_path()).map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => PipelineError::OutputDirExists(root.to_path_buf()),
            _ => PipelineError::Setup(format!("create {}: {err}", layout.root)),
        })?;
        for dir in [&layout.data_dir, &layout.analysis_dir] {
            fs::create_dir(dir.as_std_path())
                .map_err(|err| PipelineError::Setup(format!("create {dir}: {err}")))?;
        }
        debug!("created working directory structure at {root}");
        Ok(layout)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StagingReport {
    pub layout: StagingLayout,
    pub samples: Vec<SampleId>,
    pub links: Vec<Utf8PathBuf>,
    pub collisions: Vec<Utf8PathBuf>,
    pub issues: Vec<PairingIssue>,
}

impl StagingReport {
    pub fn staging_dir(&self) -> &Utf8Path {
        self.layout.data_dir()
    }
}

pub struct ProjectStager<'a> {
    convention: &'a dyn NamingConvention,
}

impl<'a> ProjectStager<'a> {
    pub fn new(convention: &'a dyn NamingConvention) -> Self {
        Self { convention }
    }

    pub fn stage(
        &self,
        outdir: &Utf8Path,
        inputdir: &Utf8Path,
    ) -> Result<StagingReport, PipelineError> {
        StagingLayout::ensure_absent(outdir)?;
        if !inputdir.as_std_path().is_dir() {
            return Err(PipelineError::MissingInput(inputdir.to_path_buf()));
        }
        let layout = StagingLayout::create(outdir)?;

        let dictionary = SampleDictionaryBuilder::new(self.convention).build(inputdir)?;
        if dictionary.is_empty() {
            return Err(PipelineError::NoSamples(inputdir.to_path_buf()));
        }

        info!("creating symlinks for samples at {}", layout.data_dir());
        let (samples, collisions) = self.link_records(&dictionary, layout.data_dir())?;
        let links = self.normalize_file_names(layout.data_dir())?;

        Ok(StagingReport {
            layout,
            samples,
            links,
            collisions,
            issues: dictionary.issues().to_vec(),
        })
    }

    pub fn link_records(
        &self,
        dictionary: &SampleDictionary,
        destination: &Utf8Path,
    ) -> Result<(Vec<SampleId>, Vec<Utf8PathBuf>), PipelineError> {
        let mut staged = Vec::new();
        let mut collisions = Vec::new();
        for record in dictionary.records() {
            match link_pair(record, destination) {
                Ok(()) => {
                    debug!("created symlinks for {}", record.sample_id);
                    staged.push(record.sample_id.clone());
                }
                Err(PipelineError::SymlinkCollision(link)) => {
                    error!(
                        "symbolic links to read pair {} already exist ({link})",
                        record.sample_id
                    );
                    collisions.push(link);
                }
                Err(err) => return Err(err),
            }
        }
        Ok((staged, collisions))
    }

    pub fn normalize_file_names(
        &self,
        directory: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, PipelineError> {
        let mut renamed = Vec::new();
        for path in FileScanner::scan(directory)? {
            let Some(name) = path.file_name() else {
                continue;
            };
            if self.convention.validate(name).is_err() {
                continue;
            }
            let Some(new_name) = self.convention.with_index_token(name, INDEX_TOKEN) else {
                warn!(
                    "{name} has no {} marker, leaving it unchanged",
                    self.convention.index_marker()
                );
                renamed.push(path);
                continue;
            };
            let target = directory.join(new_name);
            fs::rename(path.as_std_path(), target.as_std_path())
                .map_err(|err| PipelineError::Filesystem(format!("rename {path}: {err}")))?;
            renamed.push(target);
        }
        info!("renamed all valid read files in {directory}");
        Ok(renamed)
    }
}

fn link_pair(record: &SampleRecord, destination: &Utf8Path) -> Result<(), PipelineError> {
    let Some((forward, reverse)) = record.read_pair() else {
        return Err(PipelineError::Filesystem(format!(
            "sample {} has no reverse read",
            record.sample_id
        )));
    };
    let forward_link = create_symlink(forward, destination)?;
    if let Err(err) = create_symlink(reverse, destination) {
        if let Err(cleanup) = fs::remove_file(forward_link.as_std_path()) {
            warn!("could not remove half-staged link {forward_link}: {cleanup}");
        }
        return Err(err);
    }
    Ok(())
}

fn create_symlink(
    target: &Utf8Path,
    destination: &Utf8Path,
) -> Result<Utf8PathBuf, PipelineError> {
    let name = target
        .file_name()
        .ok_or_else(|| PipelineError::Filesystem(format!("no file name in {target}")))?;
    let link = destination.join(name);
    symlink(target, &link).map_err(|err| match err.kind() {
        io::ErrorKind::AlreadyExists => PipelineError::SymlinkCollision(link.clone()),
        _ => PipelineError::Filesystem(format!("symlink {link} -> {target}: {err}")),
    })?;
    Ok(link)
}

#[cfg(unix)]
fn symlink(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target.as_std_path(), link.as_std_path())
}

#[cfg(windows)]
fn symlink(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target.as_std_path(), link.as_std_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = StagingLayout::new(Utf8Path::new("/runs/batch1"));
        assert_eq!(layout.data_dir().as_str(), "/runs/batch1/data");
        assert_eq!(
            layout.analysis_path("demux_summary.qzv").as_str(),
            "/runs/batch1/qiime2/demux_summary.qzv"
        );
    }
}
