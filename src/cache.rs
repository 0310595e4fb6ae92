use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::domain::Eprint;
use crate::error::GaldynError;

pub const ARXIV_SUBDIR: &str = "arxiv_raw";
pub const HARRIS_SUBDIR: &str = "harris";
pub const HARRIS_FILE_NAME: &str = "mwgc.dat";

/// Where cached downloads live. A path that exists is treated as complete;
/// delete it to force a fresh download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: Utf8PathBuf,
    arxiv_dir: Utf8PathBuf,
    harris_dir: Utf8PathBuf,
}

impl CacheLayout {
    pub fn new() -> Result<Self, GaldynError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".galdyn-data").join("cache"))
                    .ok()
            })
            .ok_or_else(|| {
                GaldynError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self::with_root(root))
    }

    pub fn with_root(root: Utf8PathBuf) -> Self {
        Self {
            arxiv_dir: root.join(ARXIV_SUBDIR),
            harris_dir: root.join(HARRIS_SUBDIR),
            root,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn arxiv_dir(&self) -> &Utf8Path {
        &self.arxiv_dir
    }

    pub fn harris_dir(&self) -> &Utf8Path {
        &self.harris_dir
    }

    pub fn arxiv_source_dir(&self, eprint: &Eprint) -> Utf8PathBuf {
        self.arxiv_dir.join(eprint.as_str())
    }

    pub fn arxiv_source_archive(&self, eprint: &Eprint) -> Utf8PathBuf {
        self.arxiv_source_dir(eprint)
            .join(format!("{}.tar.gz", eprint.file_stem()))
    }

    pub fn arxiv_file(&self, eprint: &Eprint, name: &str) -> Utf8PathBuf {
        self.arxiv_source_dir(eprint).join(name)
    }

    pub fn harris_catalog_path(&self) -> Utf8PathBuf {
        self.harris_dir.join(HARRIS_FILE_NAME)
    }
}
