// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Get the SIMBRIDGE_HOME directory path.
///
/// Resolution order:
/// 1. `SIMBRIDGE_HOME` environment variable (explicit override)
/// 2. `XDG_CONFIG_HOME/simbridge` (XDG compliance)
/// 3. `~/.simbridge` (default)
///
/// The directory structure under SIMBRIDGE_HOME:
/// ```text
/// ~/.simbridge/
/// ├── logs/                          # Compute process logs
/// └── runtimes/
///     └── {run_id}/
///         └── region.shm             # Default shared buffer region
/// ```
pub fn get_simbridge_home() -> PathBuf {
    resolve_home(
        std::env::var_os("SIMBRIDGE_HOME"),
        std::env::var_os("XDG_CONFIG_HOME"),
    )
}

fn resolve_home(explicit: Option<OsString>, xdg: Option<OsString>) -> PathBuf {
    // 1. Explicit override
    if let Some(home) = explicit.filter(|h| !h.is_empty()) {
        return PathBuf::from(home);
    }

    // 2. XDG compliance
    if let Some(xdg) = xdg.filter(|x| !x.is_empty()) {
        return PathBuf::from(xdg).join("simbridge");
    }

    // 3. Default: ~/.simbridge
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".simbridge")
}

/// Ensure `home` and its standard subdirectories exist.
pub fn ensure_simbridge_home(home: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(home)?;
    std::fs::create_dir_all(home.join("logs"))?;
    std::fs::create_dir_all(home.join("runtimes"))?;
    Ok(home.to_path_buf())
}

/// Get the path to the log directory.
pub fn get_logs_dir(home: &Path) -> PathBuf {
    home.join("logs")
}

/// Get the path to a run's directory.
pub fn get_runtime_dir(home: &Path, run_id: &str) -> PathBuf {
    home.join("runtimes").join(run_id)
}

/// Get the default shared region path for a run.
pub fn get_region_path(home: &Path, run_id: &str) -> PathBuf {
    get_runtime_dir(home, run_id).join("region.shm")
}

/// Fresh identifier for a run directory.
pub fn new_run_id() -> String {
    cuid2::create_id()
}
