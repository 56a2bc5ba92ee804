// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runner errors.

use ordoplay_render_graph::{EngineError, FrameError, GraphError};
use std::path::PathBuf;

/// Why a run failed
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The runner configuration is invalid
    #[error("Invalid runner config: {0}")]
    Config(String),

    /// The pipeline description was rejected
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The pipeline loaded but failed validation
    #[error("Pipeline failed validation with {0} issue(s)")]
    Invalid(usize),

    /// The engine could not start
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A frame was aborted
    #[error(transparent)]
    Frame(#[from] FrameError),
}
