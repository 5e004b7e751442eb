use std::{
    env,
    path::{Path, PathBuf},
};

use etcetera::BaseStrategy;

/// Configuration directory name
const CONFIG_DIR: &str = "modbundle";

/// Configuration file name
pub const CONFIG_FILE: &str = "modbundle.toml";

/// Returns `<config dir>/modbundle`, where the config dir is `XDG_CONFIG_HOME` or
/// `~/.config` on Unix and `%APPDATA%` on Windows.
pub fn user_config_dir() -> Option<PathBuf> {
    etcetera::choose_base_strategy()
        .ok()
        .map(|dirs| dirs.config_dir().join(CONFIG_DIR))
}

/// Returns the user configuration file if it exists.
pub fn user_config_file() -> Option<PathBuf> {
    user_config_dir()
        .map(|dir| dir.join(CONFIG_FILE))
        .filter(|path| path.is_file())
}

/// Project configuration file in the current directory, if present.
pub fn project_config_file() -> Option<PathBuf> {
    let candidate = PathBuf::from(CONFIG_FILE);
    candidate.is_file().then_some(candidate)
}

#[cfg(not(windows))]
fn locate_system_config_xdg(value: Option<&str>) -> Option<PathBuf> {
    let default = "/etc/xdg";
    let config_dirs = value.filter(|s| !s.is_empty()).unwrap_or(default);

    config_dirs
        .split(':')
        .take_while(|s| !s.is_empty())
        .map(|dir| Path::new(dir).join(CONFIG_DIR).join(CONFIG_FILE))
        .find(|path| path.is_file())
}

#[cfg(windows)]
fn locate_system_config_windows(system_drive: impl AsRef<Path>) -> Option<PathBuf> {
    let candidate = system_drive
        .as_ref()
        .join("ProgramData")
        .join(CONFIG_DIR)
        .join(CONFIG_FILE);
    candidate.as_path().is_file().then_some(candidate)
}

/// Returns the path to the system configuration file.
///
/// On Unix-like systems, searches `XDG_CONFIG_DIRS` (default `/etc/xdg`) and then
/// `/etc/modbundle/modbundle.toml`. On Windows, uses
/// `%SYSTEMDRIVE%\ProgramData\modbundle\modbundle.toml`.
pub fn system_config_file() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        env::var("SYSTEMDRIVE")
            .ok()
            .and_then(|system_drive| locate_system_config_windows(PathBuf::from(system_drive)))
    }

    #[cfg(not(windows))]
    {
        let xdg_config_dirs = env::var("XDG_CONFIG_DIRS").ok();
        if let Some(path) = locate_system_config_xdg(xdg_config_dirs.as_deref()) {
            return Some(path);
        }

        let candidate = Path::new("/etc").join(CONFIG_DIR).join(CONFIG_FILE);
        match candidate.try_exists() {
            Ok(true) => Some(candidate),
            Ok(false) => None,
            Err(err) => {
                log::warn!("Failed to query system configuration file: {err}");
                None
            }
        }
    }
}
