//! Tool configuration: which build driver and archiver to run.
//!
//! Loaded from an optional YAML file. Every key has a default matching the
//! stock Stingray setup, so an empty or missing file is valid.
//!
//! ```yaml
//! driver:
//!   program: ruby
//!   args: [make.rb, --verbose]
//! archive:
//!   program: C:\Program Files\WinRAR\WinRar.exe
//!   template: stingray_achieve.conf
//!   icon: stingray_icon.ico
//!   logo: stingray_logo.bmp
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::BuildError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub driver: DriverConfig,
    pub archive: ArchiveConfig,
}

/// The external build program.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    pub program: String,
    /// Leading arguments, placed before the fixed build flags
    pub args: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            program: "ruby".to_string(),
            args: vec!["make.rb".to_string(), "--verbose".to_string()],
        }
    }
}

/// The self-extracting archiver used with `--zip`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub program: String,
    /// Archive comment template; the bundled one when absent
    pub template: Option<PathBuf>,
    pub icon: Option<PathBuf>,
    pub logo: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            program: r"C:\Program Files\WinRAR\WinRar.exe".to_string(),
            template: None,
            icon: None,
            logo: None,
        }
    }
}

impl ToolConfig {
    /// Parse a configuration document. Blank input yields the defaults.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Load a configuration file. Relative archive paths are taken relative to
    /// the file's directory.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let text = fs::read_to_string(path).map_err(|e| BuildError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = Self::from_yaml(&text).map_err(|e| BuildError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        debug!("Loaded configuration from {}", path.display());
        Ok(config.relative_to(base))
    }

    fn relative_to(mut self, base: &Path) -> Self {
        let resolve = |p: Option<PathBuf>| p.map(|p| if p.is_relative() { base.join(p) } else { p });
        self.archive.template = resolve(self.archive.template.take());
        self.archive.icon = resolve(self.archive.icon.take());
        self.archive.logo = resolve(self.archive.logo.take());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blank_document_gives_defaults() {
        let config = ToolConfig::from_yaml("  \n").unwrap();
        assert_eq!(config, ToolConfig::default());
        assert_eq!(config.driver.program, "ruby");
        assert_eq!(config.driver.args, vec!["make.rb", "--verbose"]);
        assert!(config.archive.template.is_none());
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let config = ToolConfig::from_yaml("driver:\n  program: ruby3\n").unwrap();
        assert_eq!(config.driver.program, "ruby3");
        assert_eq!(config.driver.args, vec!["make.rb", "--verbose"]);
        assert_eq!(config.archive, ArchiveConfig::default());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(ToolConfig::from_yaml("drvier:\n  program: ruby\n").is_err());
        assert!(ToolConfig::from_yaml("archive:\n  compression: 9\n").is_err());
    }

    #[test]
    fn test_load_resolves_relative_archive_paths() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("generate-build.yml");
        fs::write(
            &path,
            "archive:\n  program: rar\n  template: conf/sfx.conf\n  icon: /abs/icon.ico\n",
        )
        .unwrap();

        let config = ToolConfig::load(&path).unwrap();
        assert_eq!(config.archive.program, "rar");
        assert_eq!(
            config.archive.template,
            Some(temp.path().join("conf/sfx.conf"))
        );
        assert_eq!(config.archive.icon, Some(PathBuf::from("/abs/icon.ico")));
        assert_eq!(config.archive.logo, None);
    }

    #[test]
    fn test_load_missing_file_is_a_config_error() {
        let temp = TempDir::new().unwrap();
        let err = ToolConfig::load(&temp.path().join("nope.yml")).unwrap_err();
        assert!(matches!(err, BuildError::Config { .. }));
    }
}
