use std::fs;
use std::io;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use zip::ZipArchive;

use crate::error::PipelineError;

pub fn validate_archive(path: &Utf8Path) -> Result<(), PipelineError> {
    let invalid = |message: String| PipelineError::InvalidArtifact {
        path: path.to_path_buf(),
        message,
    };
    let file = fs::File::open(path.as_std_path()).map_err(|err| invalid(err.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|err| invalid(err.to_string()))?;
    if archive.is_empty() {
        return Err(invalid("archive has no entries".to_string()));
    }

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| invalid(err.to_string()))?;
        if entry.enclosed_name().is_none() {
            return Err(invalid("archive entry path traversal detected".to_string()));
        }
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink()).map_err(|err| invalid(err.to_string()))?;
    }
    Ok(())
}

pub fn is_archive_path(path: &Utf8Path) -> bool {
    matches!(path.extension(), Some("qza") | Some("qzv"))
}

pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), PipelineError> {
    let parent = path
        .parent()
        .ok_or_else(|| PipelineError::Filesystem("invalid destination path".to_string()))?;
    let content = serde_json::to_vec_pretty(value)
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix("ampliconpipeline-json")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), &content).map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn move_file(source: &Utf8Path, dest: &Utf8Path) -> Result<(), PipelineError> {
    if fs::rename(source.as_std_path(), dest.as_std_path()).is_ok() {
        return Ok(());
    }
    fs::copy(source.as_std_path(), dest.as_std_path())
        .map_err(|err| PipelineError::Filesystem(format!("copy {source} -> {dest}: {err}")))?;
    fs::remove_file(source.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

pub fn to_utf8(path: PathBuf) -> Result<Utf8PathBuf, PipelineError> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|path| PipelineError::Filesystem(format!("non-utf8 path: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use zip::write::SimpleFileOptions;

    use super::*;

    #[test]
    fn validate_archive_accepts_zip() {
        let temp = tempfile::tempdir().unwrap();
        let path = to_utf8(temp.path().join("table.qza")).unwrap();
        let file = fs::File::create(path.as_std_path()).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("uuid/metadata.yaml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"type: FeatureTable[Frequency]\n").unwrap();
        writer.finish().unwrap();

        validate_archive(&path).unwrap();
    }

    #[test]
    fn validate_archive_rejects_plain_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = to_utf8(temp.path().join("table.qza")).unwrap();
        fs::write(path.as_std_path(), b"not a zip").unwrap();
        assert_matches!(
            validate_archive(&path),
            Err(PipelineError::InvalidArtifact { .. })
        );
    }
}
