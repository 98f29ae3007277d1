use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const DEFAULT_OPTIONS_FILE: &str = "devflow-options.json";

/// Effective settings for one invocation. Produced once by [`resolve`] and
/// passed by reference to everything that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub use_container_server: bool,
    pub use_embedded_server: bool,
    pub static_output_root: PathBuf,
    pub backend_url: String,
    pub mocked_backend_url: String,
    pub server_port: u16,
    pub livereload_port: u16,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            use_container_server: false,
            use_embedded_server: false,
            static_output_root: PathBuf::from("server/www"),
            backend_url: "http://ushahidi-backend".to_string(),
            mocked_backend_url: "http://localhost:8081".to_string(),
            server_port: 8080,
            livereload_port: 35729,
        }
    }
}

/// One configuration layer. Every field is optional so that a layer only
/// replaces what it actually sets.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(from = "OptionsFile")]
pub struct ConfigOverrides {
    pub use_container_server: Option<bool>,
    pub use_embedded_server: Option<bool>,
    pub static_output_root: Option<PathBuf>,
    pub backend_url: Option<String>,
    pub mocked_backend_url: Option<String>,
    pub server_port: Option<u16>,
    pub livereload_port: Option<u16>,
}

/// The options file as written. The short names mirror the CLI flags; when
/// a file sets both spellings the long one is used.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsFile {
    #[serde(default)]
    use_container_server: Option<bool>,
    #[serde(default)]
    docker_server: Option<bool>,
    #[serde(default)]
    use_embedded_server: Option<bool>,
    #[serde(default)]
    node_server: Option<bool>,
    #[serde(default)]
    static_output_root: Option<PathBuf>,
    #[serde(default)]
    www: Option<PathBuf>,
    #[serde(default)]
    backend_url: Option<String>,
    #[serde(default)]
    mocked_backend_url: Option<String>,
    #[serde(default)]
    server_port: Option<u16>,
    #[serde(default)]
    livereload_port: Option<u16>,
}

impl From<OptionsFile> for ConfigOverrides {
    fn from(file: OptionsFile) -> Self {
        Self {
            use_container_server: file.use_container_server.or(file.docker_server),
            use_embedded_server: file.use_embedded_server.or(file.node_server),
            static_output_root: file.static_output_root.or(file.www),
            backend_url: file.backend_url,
            mocked_backend_url: file.mocked_backend_url,
            server_port: file.server_port,
            livereload_port: file.livereload_port,
        }
    }
}

impl Configuration {
    fn apply(&mut self, layer: ConfigOverrides) {
        if let Some(value) = layer.use_container_server {
            self.use_container_server = value;
        }
        if let Some(value) = layer.use_embedded_server {
            self.use_embedded_server = value;
        }
        if let Some(value) = layer.static_output_root {
            self.static_output_root = value;
        }
        if let Some(value) = layer.backend_url {
            self.backend_url = value;
        }
        if let Some(value) = layer.mocked_backend_url {
            self.mocked_backend_url = value;
        }
        if let Some(value) = layer.server_port {
            self.server_port = value;
        }
        if let Some(value) = layer.livereload_port {
            self.livereload_port = value;
        }
    }

    /// The backend the bundle talks to.
    pub fn injected_backend_url(&self, mock_backend: bool) -> &str {
        if mock_backend {
            &self.mocked_backend_url
        } else {
            &self.backend_url
        }
    }
}

/// Merges defaults, the options file (when there is one) and CLI flags, in
/// that order of increasing precedence.
pub fn resolve(
    defaults: Configuration,
    file: Option<ConfigOverrides>,
    cli: ConfigOverrides,
) -> Configuration {
    let mut config = defaults;
    if let Some(file) = file {
        config.apply(file);
    }
    config.apply(cli);
    config
}

/// Reads the options file. A missing file is `Ok(None)`; anything that is
/// present but unreadable or not valid JSON is fatal.
pub fn load_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        tracing::debug!("No options file at {}", path.display());
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let overrides = serde_json::from_str(&contents).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!("Loaded options from {}", path.display());
    Ok(Some(overrides))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DevflowError;
    use tempfile::TempDir;

    #[test]
    fn file_layer_overrides_defaults_per_field() {
        let defaults = Configuration {
            backend_url: "A".to_string(),
            ..Configuration::default()
        };
        let file = ConfigOverrides {
            backend_url: Some("B".to_string()),
            ..ConfigOverrides::default()
        };

        let config = resolve(defaults.clone(), Some(file), ConfigOverrides::default());

        assert_eq!(config.backend_url, "B");
        assert_eq!(config.mocked_backend_url, defaults.mocked_backend_url);
        assert_eq!(config.static_output_root, defaults.static_output_root);
    }

    #[test]
    fn cli_layer_wins_over_file() {
        let file = ConfigOverrides {
            backend_url: Some("B".to_string()),
            server_port: Some(9000),
            ..ConfigOverrides::default()
        };
        let cli = ConfigOverrides {
            backend_url: Some("C".to_string()),
            ..ConfigOverrides::default()
        };

        let config = resolve(Configuration::default(), Some(file), cli);

        assert_eq!(config.backend_url, "C");
        assert_eq!(config.server_port, 9000);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let loaded = load_overrides(&dir.path().join(DEFAULT_OPTIONS_FILE)).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn file_accepts_aliases_and_ignores_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_OPTIONS_FILE);
        fs::write(
            &path,
            r#"{ "dockerServer": true, "www": "public", "backendUrl": "http://api", "colour": "blue" }"#,
        )
        .unwrap();

        let loaded = load_overrides(&path).unwrap().unwrap();

        assert_eq!(loaded.use_container_server, Some(true));
        assert_eq!(loaded.static_output_root, Some(PathBuf::from("public")));
        assert_eq!(loaded.backend_url.as_deref(), Some("http://api"));
        assert_eq!(loaded.use_embedded_server, None);
    }

    #[test]
    fn long_key_wins_when_both_spellings_are_set() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_OPTIONS_FILE);
        fs::write(
            &path,
            r#"{ "dockerServer": true, "useContainerServer": false, "nodeServer": true, "www": "a", "staticOutputRoot": "b" }"#,
        )
        .unwrap();

        let loaded = load_overrides(&path).unwrap().unwrap();

        assert_eq!(loaded.use_container_server, Some(false));
        assert_eq!(loaded.use_embedded_server, Some(true));
        assert_eq!(loaded.static_output_root, Some(PathBuf::from("b")));
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_OPTIONS_FILE);
        fs::write(&path, r#"{ "useEmbeddedServer": "yes please" "#).unwrap();

        let err = load_overrides(&path).unwrap_err();
        assert!(matches!(
            err,
            DevflowError::Config(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn injected_backend_follows_mock_toggle() {
        let config = Configuration::default();
        assert_eq!(config.injected_backend_url(false), "http://ushahidi-backend");
        assert_eq!(config.injected_backend_url(true), "http://localhost:8081");
    }
}
