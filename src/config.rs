use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::utils::app_config::AppConfig;
use crate::utils::prelude::*;

/// Directory receiving the run's output files, created on first use
#[derive(Debug, Deserialize)]
pub(crate) struct OutputDir(PathBuf);

impl OutputDir {
    pub fn file(&self, name: impl AsRef<Path>) -> Result<PathBuf> {
        fs::create_dir_all(&self.0)?;
        Ok(self.0.join(name))
    }
}

pub(crate) trait AppConfigExt {
    /// `None` when no `output_dir` is configured
    fn output_dir(&self) -> Result<Option<OutputDir>>;
}

impl AppConfigExt for AppConfig {
    fn output_dir(&self) -> Result<Option<OutputDir>> {
        match self.get::<Option<OutputDir>, _>("output_dir") {
            Err(Error::InvalidConfig(config::ConfigError::NotFound(_))) => Ok(None),
            other => other,
        }
    }
}
