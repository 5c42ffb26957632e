// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-aware data directory and config file resolution.

use std::path::PathBuf;

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "BONWERK_CONFIG";

const CONFIG_FILE: &str = "config.json";

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = base_dir().join("bonwerk");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Config file location: `$BONWERK_CONFIG`, else `<data dir>/config.json`.
pub fn config_path() -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => data_dir().join(CONFIG_FILE),
    }
}

fn base_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(appdata) = std::env::var("APPDATA") {
        return PathBuf::from(appdata);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    std::env::temp_dir()
}
