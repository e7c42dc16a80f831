//! Config file location.
//!
//! Lookup order, first match wins:
//!
//! 1. `--dir <DIR>`
//! 2. `VVIPL_CONFIG_DIR`
//! 3. `$XDG_CONFIG_HOME/vvipl` (absolute paths only)
//! 4. `$HOME/.config/vvipl`

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

/// Overrides the config directory.
pub const ENV_CONFIG_DIR: &str = "VVIPL_CONFIG_DIR";

/// Config file name inside the config directory.
const CONFIG_FILE: &str = "config.toml";

/// Directory name under the XDG config home.
const APP_DIR: &str = "vvipl";

/// Resolves the config file path from `dir` and the process environment.
///
/// # Errors
///
/// Returns an error if no directory is given and neither
/// `VVIPL_CONFIG_DIR`, `XDG_CONFIG_HOME`, nor `HOME` is usable.
pub fn resolve_config_path(dir: Option<&PathBuf>) -> Result<PathBuf> {
    resolve_config_path_with(dir, |key| std::env::var(key).ok())
}

/// Resolves the config file path, reading variables through `lookup`.
///
/// Empty variables count as unset.
///
/// # Errors
///
/// Returns an error if no candidate directory is available.
pub fn resolve_config_path_with(
    dir: Option<&PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf> {
    let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(d) = dir {
        return Ok(d.join(CONFIG_FILE));
    }
    if let Some(d) = var(ENV_CONFIG_DIR) {
        return Ok(PathBuf::from(d).join(CONFIG_FILE));
    }
    if let Some(xdg) = var("XDG_CONFIG_HOME")
        && Path::new(&xdg).is_absolute()
    {
        return Ok(PathBuf::from(xdg).join(APP_DIR).join(CONFIG_FILE));
    }
    if let Some(home) = var("HOME") {
        return Ok(PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE));
    }

    bail!("cannot locate config directory: pass --dir or set {ENV_CONFIG_DIR}, XDG_CONFIG_HOME, or HOME")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| vars.get(key).map(|v| String::from(*v))
    }

    #[test]
    fn test_dir_argument_wins() {
        // Arrange
        let dir = PathBuf::from("/srv/ipl");
        let lookup = env(&[
            (ENV_CONFIG_DIR, "/etc/vvipl"),
            ("XDG_CONFIG_HOME", "/home/u/.cfg"),
            ("HOME", "/home/u"),
        ]);

        // Act
        let path = resolve_config_path_with(Some(&dir), lookup).unwrap();

        // Assert
        assert_eq!(path, PathBuf::from("/srv/ipl/config.toml"));
    }

    #[test]
    fn test_config_dir_env_over_xdg() {
        // Arrange
        let lookup = env(&[
            (ENV_CONFIG_DIR, "/etc/vvipl"),
            ("XDG_CONFIG_HOME", "/home/u/.cfg"),
            ("HOME", "/home/u"),
        ]);

        // Act
        let path = resolve_config_path_with(None, lookup).unwrap();

        // Assert
        assert_eq!(path, PathBuf::from("/etc/vvipl/config.toml"));
    }

    #[test]
    fn test_xdg_config_home() {
        // Arrange
        let lookup = env(&[("XDG_CONFIG_HOME", "/home/u/.cfg"), ("HOME", "/home/u")]);

        // Act
        let path = resolve_config_path_with(None, lookup).unwrap();

        // Assert
        assert_eq!(path, PathBuf::from("/home/u/.cfg/vvipl/config.toml"));
    }

    #[test]
    fn test_relative_xdg_config_home_is_ignored() {
        // Arrange
        let lookup = env(&[("XDG_CONFIG_HOME", "cfg"), ("HOME", "/home/u")]);

        // Act
        let path = resolve_config_path_with(None, lookup).unwrap();

        // Assert
        assert_eq!(path, PathBuf::from("/home/u/.config/vvipl/config.toml"));
    }

    #[test]
    fn test_empty_variables_count_as_unset() {
        // Arrange
        let lookup = env(&[
            (ENV_CONFIG_DIR, ""),
            ("XDG_CONFIG_HOME", ""),
            ("HOME", "/home/u"),
        ]);

        // Act
        let path = resolve_config_path_with(None, lookup).unwrap();

        // Assert
        assert_eq!(path, PathBuf::from("/home/u/.config/vvipl/config.toml"));
    }

    #[test]
    fn test_no_candidate_is_error() {
        // Arrange & Act
        let err = resolve_config_path_with(None, env(&[])).unwrap_err();

        // Assert
        assert!(err.to_string().contains(ENV_CONFIG_DIR));
    }
}
