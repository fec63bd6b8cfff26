#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Four-row sales table with a month column, one entity column, and two
/// measures. Detection assigns month=time, category=entity, revenue and
/// units=measure.
pub const SALES_CSV: &str = "month,category,revenue,units\n\
    2024-01,A,100.0,10\n\
    2024-01,B,200.0,20\n\
    2024-02,A,150.0,12\n\
    2024-02,B,180.0,20\n";

/// Sales table extended with price and count proxies so revenue variance
/// can be decomposed. The price column is constant across periods.
pub const DECOMPOSABLE_CSV: &str = "month,category,revenue,count,price\n\
    2024-01,A,100.0,10.0,25.0\n\
    2024-01,B,200.0,20.0,25.0\n\
    2024-02,A,150.0,12.0,25.0\n\
    2024-02,B,180.0,15.0,25.0\n";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    /// Writes raw `bytes`, for fixtures that are not valid UTF-8.
    pub fn write_bytes(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(bytes).expect("write temp file contents");
        path
    }
}

pub fn write_sales_csv(workspace: &TestWorkspace) -> PathBuf {
    workspace.write("sales.csv", SALES_CSV)
}

pub fn write_decomposable_csv(workspace: &TestWorkspace) -> PathBuf {
    workspace.write("sales_with_proxies.csv", DECOMPOSABLE_CSV)
}
