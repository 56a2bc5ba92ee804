// SPDX-License-Identifier: MIT OR Apache-2.0
//! `OrdoPlay` pipeline runner.
//!
//! Loads a JSON render pipeline description, validates it and drives a number
//! of frames through it without a window:
//!
//! ```text
//! ordoplay_pipeline [config.ron]
//! ```
//!
//! Settings come from a RON file (default `runner.ron`); `RUST_LOG` overrides
//! the configured log filter.

mod config;
mod error;

use config::{RunnerConfig, CONFIG_FILE_NAME, DEFAULT_LOG_FILTER};
use error::RunnerError;
use ordoplay_render_graph::{
    nodes, EngineContext, FrameReport, Graph, RenderContext, Scheduler, SetupContext,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(CONFIG_FILE_NAME), PathBuf::from);
    let loaded = RunnerConfig::load(&config_path);

    let log_filter = loaded
        .as_ref()
        .map_or(DEFAULT_LOG_FILTER, |config| config.log_filter.as_str());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting OrdoPlay pipeline runner v{}", env!("CARGO_PKG_VERSION"));

    let result = loaded.and_then(|config| run(&config));
    if let Err(e) = result {
        tracing::error!("Pipeline runner failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: &RunnerConfig) -> Result<(), RunnerError> {
    let text = std::fs::read_to_string(&config.pipeline).map_err(|source| RunnerError::Io {
        path: config.pipeline.clone(),
        source,
    })?;
    tracing::info!("Loading pipeline {}", config.pipeline.display());

    let reports = run_pipeline(config, &text)?;
    let commands: usize = reports.iter().map(|report| report.commands).sum();
    tracing::info!("Ran {} frame(s), {commands} command(s) recorded", reports.len());
    Ok(())
}

/// Load a pipeline description and run the configured number of frames
fn run_pipeline(config: &RunnerConfig, description: &str) -> Result<Vec<FrameReport>, RunnerError> {
    let mut graph = Graph::new("Pipeline", Arc::new(nodes::create_builtin_registry()));
    graph.load_json(description)?;

    let validation = graph.validate();
    if !validation.is_ok() {
        for issue in validation.issues() {
            tracing::error!("{issue}");
        }
        return Err(RunnerError::Invalid(validation.len()));
    }

    let mut engine = EngineContext::initialize(&config.engine_config())?;
    let mut scheduler = Scheduler::new(config.mode);
    tracing::info!(
        "Running {} ({} nodes, {} links) in {:?} mode on {} worker(s)",
        graph.name,
        graph.node_count(),
        graph.link_count(),
        scheduler.mode(),
        engine.worker_count()
    );

    let mut reports = Vec::new();
    for frame in 0..config.frames {
        let setup = SetupContext::new(&engine, frame, config.render_size());
        let render = RenderContext::new(frame);
        let report = scheduler.run_frame(&mut graph, &setup, &render)?;

        for command in render.into_commands() {
            let name = graph.node(command.node).map_or("?", |node| node.name());
            tracing::debug!("[{frame}] {name}: {}", command.label);
        }
        tracing::info!(
            "Frame {frame}: {} node(s) in {} wave(s), {} command(s)",
            report.nodes,
            report.waves,
            report.commands
        );
        reports.push(report);
    }

    engine.shutdown();
    Ok(reports)
}
