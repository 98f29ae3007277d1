use std::fmt;

use crate::config::Configuration;

/// Runtime topology used to preview the built output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServingMode {
    Static,
    EmbeddedServer,
    ContainerServer,
}

impl ServingMode {
    /// Name of the task that implements this mode.
    pub fn task_name(self) -> &'static str {
        match self {
            ServingMode::Static => "direct",
            ServingMode::EmbeddedServer => "node-server",
            ServingMode::ContainerServer => "docker-server",
        }
    }
}

impl fmt::Display for ServingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.task_name())
    }
}

/// Picks the serving mode. Each step overrides the previous one, so the
/// command-line flags beat the options file and `force_docker` beats
/// everything.
pub fn select_mode(config: &Configuration, force_node: bool, force_docker: bool) -> ServingMode {
    let mut mode = ServingMode::Static;
    if config.use_container_server {
        mode = ServingMode::ContainerServer;
    }
    if config.use_embedded_server {
        mode = ServingMode::EmbeddedServer;
    }
    if force_node {
        mode = ServingMode::EmbeddedServer;
    }
    if force_docker {
        mode = ServingMode::ContainerServer;
    }
    mode
}

/// Dependencies of the `default` task.
pub fn default_dependencies(mode: ServingMode, mock_backend: bool) -> Vec<String> {
    let mut dependencies = vec!["build".to_string(), mode.task_name().to_string()];
    if mock_backend {
        dependencies.push("mock-backend".to_string());
    }
    dependencies
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(container: bool, embedded: bool) -> Configuration {
        Configuration {
            use_container_server: container,
            use_embedded_server: embedded,
            ..Configuration::default()
        }
    }

    #[test]
    fn defaults_to_static() {
        assert_eq!(select_mode(&config(false, false), false, false), ServingMode::Static);
    }

    #[test]
    fn embedded_setting_overrides_container_setting() {
        assert_eq!(
            select_mode(&config(true, true), false, false),
            ServingMode::EmbeddedServer
        );
        assert_eq!(
            select_mode(&config(true, false), false, false),
            ServingMode::ContainerServer
        );
    }

    #[test]
    fn node_flag_overrides_file_settings() {
        assert_eq!(
            select_mode(&config(true, false), true, false),
            ServingMode::EmbeddedServer
        );
    }

    #[test]
    fn docker_flag_always_wins() {
        for container in [false, true] {
            for embedded in [false, true] {
                for node in [false, true] {
                    assert_eq!(
                        select_mode(&config(container, embedded), node, true),
                        ServingMode::ContainerServer
                    );
                }
            }
        }
    }

    #[test]
    fn mock_backend_is_appended_independently_of_mode() {
        assert_eq!(
            default_dependencies(ServingMode::Static, false),
            vec!["build", "direct"]
        );
        assert_eq!(
            default_dependencies(ServingMode::ContainerServer, true),
            vec!["build", "docker-server", "mock-backend"]
        );
    }
}
