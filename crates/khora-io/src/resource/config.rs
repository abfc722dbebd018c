// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration of the resource cache.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const MB: usize = 1024 * 1024;

/// Environment variable overriding the GPU budget, in megabytes.
pub const ENV_BUDGET_MB: &str = "KHORA_RESOURCE_BUDGET_MB";
/// Environment variable setting the assets directory.
pub const ENV_ASSETS_DIR: &str = "KHORA_ASSETS_DIR";
/// Environment variable toggling GPU-side construction (`true`/`false`/`1`/`0`).
pub const ENV_GPU_LOADING: &str = "KHORA_GPU_LOADING";

/// An error raised while building a [`ResourceCacheConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be parsed.
    #[error("invalid value '{value}' for {key}")]
    InvalidValue {
        /// The variable or field name.
        key: String,
        /// The rejected value.
        value: String,
    },

    /// The configuration file could not be read or written.
    #[error("cannot access config file '{path}': {source}")]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid RON.
    #[error("malformed resource cache config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The configuration could not be rendered as RON.
    #[error("cannot serialize resource cache config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Settings used to build a [`ResourceCache`](super::ResourceCache).
///
/// Missing fields fall back to [`Default`] when deserializing, so a config file
/// only needs the values it overrides:
///
/// ```ron
/// (
///   max_gpu_memory: 536870912,
///   base_assets_dir: Some("assets"),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceCacheConfig {
    /// The GPU memory budget, in bytes.
    pub max_gpu_memory: usize,
    /// Directory every resource path is resolved against. `None` disables sandboxing.
    pub base_assets_dir: Option<PathBuf>,
    /// Whether resource constructors may touch the GPU.
    pub gpu_loading_enabled: bool,
    /// Name given to the background decode thread.
    pub worker_thread_name: String,
    /// Upper bound on upload closures run by one
    /// [`process_async_uploads`](super::ResourceCache::process_async_uploads) call.
    /// `None` drains everything queued at the start of the call.
    pub max_uploads_per_frame: Option<usize>,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            max_gpu_memory: 2048 * MB,
            base_assets_dir: None,
            gpu_loading_enabled: true,
            worker_thread_name: "khora-resource-decode".to_string(),
            max_uploads_per_frame: None,
        }
    }
}

impl ResourceCacheConfig {
    /// Sets the GPU budget in bytes.
    pub fn with_max_gpu_memory(mut self, bytes: usize) -> Self {
        self.max_gpu_memory = bytes;
        self
    }

    /// Sets the GPU budget in megabytes.
    pub fn with_budget_mb(mut self, mb: usize) -> Self {
        self.max_gpu_memory = mb.saturating_mul(MB);
        self
    }

    /// Sets the assets directory.
    pub fn with_base_assets_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.base_assets_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Enables or disables GPU-side construction.
    pub fn with_gpu_loading(mut self, enabled: bool) -> Self {
        self.gpu_loading_enabled = enabled;
        self
    }

    /// Caps the number of uploads run per frame.
    pub fn with_max_uploads_per_frame(mut self, max: usize) -> Self {
        self.max_uploads_per_frame = Some(max);
        self
    }

    /// Builds a configuration from the defaults overridden by the `KHORA_*` environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_vars(|key| std::env::var(key).ok())
    }

    /// Parses a RON document.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::de::from_str(text)?)
    }

    /// Reads and parses a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&text)
    }

    /// Renders the configuration as pretty-printed RON.
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        let pretty_config = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        Ok(ron::ser::to_string_pretty(self, pretty_config)?)
    }

    /// The budget in megabytes, rounded down.
    pub fn budget_mb(&self) -> usize {
        self.max_gpu_memory / MB
    }

    fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(value) = var(ENV_BUDGET_MB) {
            let mb = value
                .trim()
                .parse::<usize>()
                .map_err(|_| invalid(ENV_BUDGET_MB, &value))?;
            self.max_gpu_memory = mb.saturating_mul(MB);
        }

        if let Some(value) = var(ENV_ASSETS_DIR) {
            if !value.is_empty() {
                self.base_assets_dir = Some(PathBuf::from(value));
            }
        }

        if let Some(value) = var(ENV_GPU_LOADING) {
            self.gpu_loading_enabled = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid(ENV_GPU_LOADING, &value)),
            };
        }

        Ok(self)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ResourceCacheConfig::default();
        assert_eq!(config.max_gpu_memory, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.budget_mb(), 2048);
        assert!(config.gpu_loading_enabled);
        assert!(config.base_assets_dir.is_none());
        assert_eq!(config.worker_thread_name, "khora-resource-decode");
        assert_eq!(config.max_uploads_per_frame, None);
    }

    #[test]
    fn builder_methods() {
        let config = ResourceCacheConfig::default()
            .with_budget_mb(64)
            .with_base_assets_dir("assets")
            .with_gpu_loading(false)
            .with_max_uploads_per_frame(4);
        assert_eq!(config.max_gpu_memory, 64 * MB);
        assert_eq!(config.base_assets_dir, Some(PathBuf::from("assets")));
        assert!(!config.gpu_loading_enabled);
        assert_eq!(config.max_uploads_per_frame, Some(4));
    }

    #[test]
    fn env_overrides() {
        let config = ResourceCacheConfig::default()
            .merge_vars(vars(&[
                (ENV_BUDGET_MB, "256"),
                (ENV_ASSETS_DIR, "/srv/assets"),
                (ENV_GPU_LOADING, "off"),
            ]))
            .unwrap();
        assert_eq!(config.max_gpu_memory, 256 * MB);
        assert_eq!(config.base_assets_dir, Some(PathBuf::from("/srv/assets")));
        assert!(!config.gpu_loading_enabled);
    }

    #[test]
    fn env_rejects_garbage() {
        let err = ResourceCacheConfig::default()
            .merge_vars(vars(&[(ENV_BUDGET_MB, "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ENV_BUDGET_MB));

        let err = ResourceCacheConfig::default()
            .merge_vars(vars(&[(ENV_GPU_LOADING, "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_GPU_LOADING));
    }

    #[test]
    fn partial_ron_uses_defaults() {
        let config =
            ResourceCacheConfig::from_ron("(max_gpu_memory: 1048576, base_assets_dir: Some(\"assets\"))")
                .unwrap();
        assert_eq!(config.max_gpu_memory, MB);
        assert_eq!(config.base_assets_dir, Some(PathBuf::from("assets")));
        assert!(config.gpu_loading_enabled);
    }

    #[test]
    fn ron_round_trip() {
        let config = ResourceCacheConfig::default().with_budget_mb(32);
        let text = config.to_ron().unwrap();
        assert_eq!(ResourceCacheConfig::from_ron(&text).unwrap(), config);
    }

    #[test]
    fn malformed_ron_is_an_error() {
        assert!(matches!(
            ResourceCacheConfig::from_ron("(max_gpu_memory: \"big\")"),
            Err(ConfigError::Parse(_))
        ));
    }
}
