//! Command-line configuration.
//!
//! ```bash
//! patchscope-visualizer                              # tokenizing mock
//! patchscope-visualizer --backend static --delay-ms 0
//! patchscope-visualizer --backend remote --endpoint http://gpu-box:5000
//! patchscope-visualizer --backend patchscope --endpoint http://gpu-box:5000
//! patchscope-visualizer --log-level debug
//! ```

use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

use crate::backend::{PatchBackend, StaticBackend, TokenizingBackend};
use crate::error::Result;
use crate::remote::{RemoteApi, RemoteBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Fixed outputs after a simulated network delay
    Static,
    /// Splits the prompts locally and reports the patched token
    Tokenizing,
    /// A real patching server speaking `POST /api/patchify`
    Remote,
    /// A model server speaking `POST /api/patchscope`, with activation norms
    Patchscope,
}

/// Patchscopes Interactive Visualization
///
/// Pick a source and target location, run the patch, and see which token
/// representation is carried into which layer.
#[derive(Parser, Debug, Clone)]
#[command(name = "patchscope-visualizer")]
#[command(version)]
#[command(about = "Interactive activation-patching visualizer", long_about = None)]
pub struct Args {
    /// Computation step used when "Run Patching" is pressed
    #[arg(long, value_enum, default_value_t = BackendKind::Tokenizing)]
    pub backend: BackendKind,

    /// Base URL of the patching server (remote and patchscope backends)
    #[arg(long, default_value = "http://127.0.0.1:5000", value_name = "URL")]
    pub endpoint: String,

    /// Simulated latency of the static backend
    #[arg(long, default_value = "1500", value_name = "MS")]
    pub delay_ms: u64,

    /// Request timeout for the remote backend
    #[arg(long, default_value = "30", value_name = "SECS")]
    pub timeout_secs: u64,

    /// off, error, warn, info, debug or trace; RUST_LOG refines it
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    pub log_level: String,

    /// Window width in pixels
    #[arg(long, default_value = "1000", value_name = "PIXELS")]
    pub width: u32,

    /// Window height in pixels
    #[arg(long, default_value = "900", value_name = "PIXELS")]
    pub height: u32,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            backend: BackendKind::Tokenizing,
            endpoint: "http://127.0.0.1:5000".to_string(),
            delay_ms: 1500,
            timeout_secs: 30,
            log_level: "info".to_string(),
            width: 1000,
            height: 900,
        }
    }
}

impl Args {
    /// Unparseable levels fall back to `info` rather than silencing the log.
    pub fn log_filter(&self) -> LevelFilter {
        let level = self.log_level.trim();
        if level.eq_ignore_ascii_case("warning") {
            return LevelFilter::Warn;
        }
        level.parse().unwrap_or(LevelFilter::Info)
    }

    pub fn build_backend(&self) -> Result<Box<dyn PatchBackend>> {
        Ok(match self.backend {
            BackendKind::Static => Box::new(StaticBackend {
                delay: Duration::from_millis(self.delay_ms),
            }),
            BackendKind::Tokenizing => Box::new(TokenizingBackend),
            BackendKind::Remote | BackendKind::Patchscope => {
                let api = if self.backend == BackendKind::Patchscope {
                    RemoteApi::Patchscope
                } else {
                    RemoteApi::Patchify
                };
                let remote = RemoteBackend::new(
                    &self.endpoint,
                    Duration::from_secs(self.timeout_secs),
                    api,
                )?;
                match remote.health() {
                    Ok(health) => log::info!(
                        "backend at {} is {} (model loaded: {})",
                        self.endpoint,
                        health.status,
                        health.model_loaded
                    ),
                    Err(err) => log::warn!("health check against {} failed: {err}", self.endpoint),
                }
                Box::new(remote)
            }
        })
    }
}
