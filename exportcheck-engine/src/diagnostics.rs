use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::EngineError;
use crate::report::ScenarioResult;

/// Writes one YAML report per failed scenario.
#[derive(Debug)]
pub struct DiagnosticsCollector {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DiagnosticsCollector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_failure(
        &mut self,
        started_at: DateTime<Utc>,
        result: &ScenarioResult,
    ) -> Result<PathBuf, EngineError> {
        fs::create_dir_all(&self.dir)?;
        let filename = format!(
            "contract_{}_{}_{}.yaml",
            result.data_type,
            result.scenario,
            started_at.format("%Y%m%dT%H%M%S")
        );
        let path = self.dir.join(filename);
        fs::write(&path, serde_yaml::to_string(result)?)?;

        info!(path = %path.display(), "Wrote failure report");
        self.written.push(path.clone());
        Ok(path)
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}
