// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runner configuration.
//!
//! Read from a RON file; every field has a default, so a partial file (or no
//! file at all) is valid.

use crate::error::RunnerError;
use ordoplay_render_graph::{EngineConfig, ExecutionMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file read when no path is given on the command line
pub const CONFIG_FILE_NAME: &str = "runner.ron";

/// Log directives used when neither the config nor `RUST_LOG` sets any
pub const DEFAULT_LOG_FILTER: &str = "ordoplay_pipeline_runner=info,ordoplay_render_graph=info";

/// Pipeline runner settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// JSON pipeline description, relative to the config file
    pub pipeline: PathBuf,
    /// Number of frames to run
    pub frames: u64,
    /// Render width in pixels
    pub width: u32,
    /// Render height in pixels
    pub height: u32,
    /// Frame dispatch mode
    pub mode: ExecutionMode,
    /// Worker threads for parallel frames
    pub worker_threads: Option<usize>,
    /// Default `tracing` filter directives
    pub log_filter: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pipeline: PathBuf::from("pipelines/forward.json"),
            frames: 3,
            width: 1280,
            height: 720,
            mode: ExecutionMode::Sequential,
            worker_threads: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RunnerConfig {
    /// Parse a RON config
    pub fn from_ron(text: &str) -> Result<Self, RunnerError> {
        let config: RunnerConfig =
            ron::from_str(text).map_err(|e| RunnerError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Load the config at `path`, falling back to defaults when the file does not exist.
    ///
    /// A relative pipeline path is resolved against the config file's directory.
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_ron(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(RunnerError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if config.pipeline.is_relative() {
            if let Some(dir) = path.parent() {
                config.pipeline = dir.join(&config.pipeline);
            }
        }
        Ok(config)
    }

    /// Engine start-up options
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            worker_threads: self.worker_threads,
        }
    }

    /// Render size as `(width, height)`
    pub fn render_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn check(&self) -> Result<(), RunnerError> {
        if self.width == 0 || self.height == 0 {
            return Err(RunnerError::Config(format!(
                "render size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(RunnerError::Config("worker_threads must be >= 1 when set".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.frames, 3);
        assert_eq!(config.render_size(), (1280, 720));
        assert_eq!(config.mode, ExecutionMode::Sequential);
        assert_eq!(config.engine_config(), EngineConfig::default());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = RunnerConfig::from_ron("(frames: 10, mode: Parallel, worker_threads: Some(2))").unwrap();
        assert_eq!(config.frames, 10);
        assert_eq!(config.mode, ExecutionMode::Parallel);
        assert_eq!(config.worker_threads, Some(2));
        assert_eq!(config.width, 1280);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_serialization() {
        let config = RunnerConfig {
            frames: 7,
            ..RunnerConfig::default()
        };
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        assert_eq!(RunnerConfig::from_ron(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(RunnerConfig::from_ron("(width: 0)"), Err(RunnerError::Config(_))));
        assert!(matches!(
            RunnerConfig::from_ron("(worker_threads: Some(0))"),
            Err(RunnerError::Config(_))
        ));
        assert!(matches!(RunnerConfig::from_ron("(frames: \"many\")"), Err(RunnerError::Config(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = RunnerConfig::load(Path::new("does/not/exist/runner.ron")).unwrap();
        assert_eq!(config.frames, 3);
        assert_eq!(config.pipeline, Path::new("does/not/exist/pipelines/forward.json"));
    }

    #[test]
    fn test_bundled_config_parses() {
        let config = RunnerConfig::from_ron(include_str!("../runner.ron")).unwrap();
        assert_eq!(config.pipeline, Path::new("pipelines/forward.json"));
    }
}
