use std::path::{Path, PathBuf};

use super::error::FileinfoError;

/// Decomposition of a measurement file path. Built once per record and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fileinfo {
    pub filepath: PathBuf,
    pub dirname: PathBuf,
    /// File name with extension
    pub basename: String,
    /// File name without extension
    pub filename: String,
    /// Lowercase extension including the leading dot, empty if there is none
    pub extension: String,
}

impl Fileinfo {
    pub fn new(path: &Path) -> Result<Self, FileinfoError> {
        let basename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| FileinfoError::BadPath(path.to_path_buf()))?
            .to_string();
        let filename = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| FileinfoError::BadPath(path.to_path_buf()))?
            .to_string();
        let extension = match path.extension() {
            Some(ext) => format!(
                ".{}",
                ext.to_str()
                    .ok_or_else(|| FileinfoError::BadPath(path.to_path_buf()))?
                    .to_lowercase()
            ),
            None => String::new(),
        };
        let dirname = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Ok(Self {
            filepath: path.to_path_buf(),
            dirname,
            basename,
            filename,
            extension,
        })
    }

    /// The stem, which is the default measurement id
    pub fn stem(&self) -> &str {
        &self.filename
    }

    /// Size of the file on disk in bytes, 0 if it can not be read
    pub fn size(&self) -> u64 {
        std::fs::metadata(&self.filepath)
            .map(|meta| meta.len())
            .unwrap_or(0)
    }
}
