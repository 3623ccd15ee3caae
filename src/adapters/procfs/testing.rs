use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::ProcfsConfig;

/// Scratch directory standing in for the host's `/proc` and `/sys`
pub struct FakeRoot {
    dir: TempDir,
}

impl FakeRoot {
    pub fn new(label: &str) -> Self {
        let dir = tempfile::Builder::new()
            .prefix(&format!("pulsedash-{label}-"))
            .tempdir()
            .unwrap();
        Self { dir }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    pub fn mkdir(&self, relative: &str) {
        fs::create_dir_all(self.path(relative)).unwrap();
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> ProcfsConfig {
        ProcfsConfig::new(self.path("proc"), self.path("sys")).with_root(self.root())
    }
}
