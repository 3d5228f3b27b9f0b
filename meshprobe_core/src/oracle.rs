use crate::corpus::CorpusError;
use crate::executor::ExecutionStatus;
use crate::input::Input;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CRASH_SEVERITY: u8 = 10;

#[derive(Debug, Clone)]
pub struct BugReport<I: Input> {
    pub input: I,
    pub description: String,
    /// Lowercase hex md5 of the input's artifact bytes.
    pub input_hash: String,
    pub severity: u8,
}

impl<I: Input> BugReport<I> {
    pub fn artifact_name(&self) -> String {
        format!("crash-{}", self.input_hash)
    }

    /// Writes the input's artifact bytes to `dir/crash-<md5>` and returns the path.
    pub fn write_artifact(&self, dir: &Path) -> Result<PathBuf, CorpusError> {
        fs::create_dir_all(dir).map_err(|e| {
            CorpusError::Io(format!("Failed to create artifacts dir {:?}: {}", dir, e))
        })?;
        let path = dir.join(self.artifact_name());
        fs::write(&path, self.input.artifact_bytes()?)
            .map_err(|e| CorpusError::Io(format!("Failed to write {:?}: {}", path, e)))?;
        Ok(path)
    }
}

pub trait Oracle<I: Input> {
    fn examine(&self, input: &I, status: &ExecutionStatus) -> Option<BugReport<I>>;
}

/// Reports crashes and nothing else.
#[derive(Debug, Default)]
pub struct CrashOracle;

impl CrashOracle {
    pub fn new() -> Self {
        CrashOracle
    }
}

impl<I: Input> Oracle<I> for CrashOracle {
    fn examine(&self, input: &I, status: &ExecutionStatus) -> Option<BugReport<I>> {
        let ExecutionStatus::Crash(description) = status else {
            return None;
        };
        let input_hash = match input.artifact_bytes() {
            Ok(bytes) => format!("{:x}", md5::compute(bytes)),
            Err(e) => {
                tracing::warn!("Could not hash crashing input: {}", e);
                "unhashable".to_string()
            }
        };
        Some(BugReport {
            input: input.clone(),
            description: description.clone(),
            input_hash,
            severity: DEFAULT_CRASH_SEVERITY,
        })
    }
}
