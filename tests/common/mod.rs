//! Common test utilities for skywatch integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute the
//! user's data directory and never reach a real backend.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::Path;
pub use tempfile::TempDir;

/// A test environment with an isolated data directory and an unreachable
/// backend URL, so every HTTP call fails fast instead of waiting on a
/// real service.
pub struct TestEnv {
    pub work_dir: TempDir,
    pub data_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the skw binary with isolated environment.
    ///
    /// Sets `SKW_DATA_DIR` and `SKW_API_URL` per-command for parallel
    /// safety.
    pub fn skw(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_skw"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("SKW_DATA_DIR", self.data_dir.path());
        cmd.env("SKW_API_URL", "http://127.0.0.1:1");
        cmd
    }

    /// Write a JSONL event script into the work directory and return its
    /// path.
    pub fn write_events(&self, name: &str, lines: &str) -> std::path::PathBuf {
        let path = self.work_dir.path().join(name);
        std::fs::write(&path, lines).unwrap();
        path
    }

    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
