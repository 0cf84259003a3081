//! # Engine configuration
//!
//! [`EngineConfig`] carries the few knobs the engine itself needs: where the
//! application configuration and system (cache) directories live, which OS
//! code names per-OS subfolders, the read-only policy and the scheme file
//! extension. It can be read from JSON, TOML or YAML, chosen by file
//! extension through [`ConfigFormat`].
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::kernel::constants::{
    APP_CONFIG_MACRO, CACHE_DIR_MACRO, DEFAULT_SCHEME_EXTENSION, OPTIONS_DIR_NAME, ROOT_CONFIG_MACRO,
};
use crate::kernel::error::{Error, Result};
use crate::storage::error::StorageSystemError;
use crate::storage::macros::Macro;
use crate::utils::fs::read_if_exists;

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// OS code used for per-OS storage subfolders on the running platform
pub fn current_os_code() -> &'static str {
    if cfg!(target_os = "macos") {
        "mac"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "freebsd") {
        "freebsd"
    } else {
        "unix"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root configuration directory; application storages live in its `options/`
    pub config_dir: PathBuf,
    /// System directory; binary caches live in its `cache/`
    pub system_dir: PathBuf,
    /// Subfolder name for per-OS storages
    pub os_code: String,
    /// Clear the read-only flag of storage files instead of failing their save
    pub clear_read_only_files: bool,
    /// Preferred extension of scheme files, including the dot
    pub scheme_extension: String,
    /// Additional application-level macros (`$NAME$` -> path)
    pub extra_macros: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("config"),
            system_dir: PathBuf::from("system"),
            os_code: current_os_code().to_string(),
            clear_read_only_files: false,
            scheme_extension: DEFAULT_SCHEME_EXTENSION.to_string(),
            extra_macros: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Configuration rooted at `config_dir`, with the system directory next to it
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        let system_dir = config_dir
            .parent()
            .map(|parent| parent.join("system"))
            .unwrap_or_else(|| PathBuf::from("system"));
        Self {
            config_dir,
            system_dir,
            ..Self::default()
        }
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            StorageSystemError::UnsupportedConfigFormat(path.display().to_string())
        })?;
        match read_if_exists(path)? {
            None => {
                log::debug!("No engine configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Some(bytes) => {
                let data = String::from_utf8_lossy(&bytes);
                Self::parse(&data, format)
            }
        }
    }

    /// Deserialize from string based on format
    pub fn parse(data: &str, format: ConfigFormat) -> Result<Self> {
        let parsed = match format {
            ConfigFormat::Json => serde_json::from_str(data).map_err(|e| deserialization_error("json", e)),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| deserialization_error("yaml", e)),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(|e| deserialization_error("toml", e)),
        }?;
        Ok(parsed)
    }

    /// Serialize to string based on format
    pub fn to_string(&self, format: ConfigFormat) -> Result<String> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| serialization_error("json", e)),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| serialization_error("yaml", e)),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| serialization_error("toml", e)),
        }
    }

    pub fn options_dir(&self) -> PathBuf {
        self.config_dir.join(OPTIONS_DIR_NAME)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.system_dir.join("cache")
    }

    /// Macro table of the application store
    pub fn application_macros(&self) -> Vec<Macro> {
        let mut macros = vec![
            Macro::new(ROOT_CONFIG_MACRO, path_value(&self.config_dir)),
            Macro::new(APP_CONFIG_MACRO, path_value(&self.options_dir())),
            Macro::new(CACHE_DIR_MACRO, path_value(&self.cache_dir())),
        ];
        for (key, value) in &self.extra_macros {
            macros.push(Macro::new(key.clone(), value.clone()));
        }
        macros
    }
}

pub(crate) fn path_value(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn deserialization_error<E>(format: &str, source: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageSystemError::DeserializationError {
        format: format.to_string(),
        source: Box::new(source),
    }
    .into()
}

fn serialization_error<E>(format: &str, source: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageSystemError::SerializationError {
        format: format.to_string(),
        source: Box::new(source),
    }
    .into()
}
