// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, Layer, Registry};

use crate::core::error::{BridgeError, Result};

type FileLayer = Option<Box<dyn Layer<Registry> + Send + Sync>>;

/// Swaps the file layer of the subscriber `init_logging` installed.
static FILE_LAYER: OnceLock<reload::Handle<FileLayer, Registry>> = OnceLock::new();

fn file_layer(path: &Path) -> Result<(Box<dyn Layer<Registry> + Send + Sync>, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().ok_or_else(|| {
        BridgeError::Configuration(format!("Log file {} has no file name", path.display()))
    })?;
    std::fs::create_dir_all(dir)?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .boxed();
    Ok((layer, guard))
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`), a
/// stderr layer, and a non-ANSI file layer when `log_file` is given. The
/// file can be changed later with [`set_log_file`].
///
/// Keep the returned guard alive for the life of the process or buffered
/// file output is lost. Returns `Ok(None)` when a subscriber is already
/// installed.
pub fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file, guard) = match log_file {
        Some(path) => {
            let (layer, guard) = file_layer(path)?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    let (file, handle) = reload::Layer::new(file);

    let installed = tracing_subscriber::registry()
        .with(file)
        .with(env_filter)
        .with(stderr_layer)
        .try_init();

    match installed {
        Ok(()) => {
            FILE_LAYER.set(handle).ok();
            if let Some(path) = log_file {
                tracing::info!("Logging to {}", path.display());
            }
            Ok(guard)
        }
        Err(_) => {
            tracing::debug!("Global subscriber already installed, keeping it");
            Ok(None)
        }
    }
}

/// Point file output at `log_file`, replacing any earlier file.
///
/// Installs the subscriber first when nothing is installed yet. Returns
/// `Ok(None)` when a subscriber this module did not install owns the
/// process; its output is left alone.
pub fn set_log_file(log_file: &Path) -> Result<Option<WorkerGuard>> {
    let Some(handle) = FILE_LAYER.get() else {
        return init_logging(Some(log_file));
    };
    let (layer, guard) = file_layer(log_file)?;
    handle
        .reload(Some(layer))
        .map_err(|e| BridgeError::Other(anyhow::anyhow!("Failed to switch log file: {}", e)))?;
    tracing::info!("Logging to {}", log_file.display());
    Ok(Some(guard))
}
