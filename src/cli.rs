use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{config::ConfigOverrides, output::OutputMode};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Task to run
    #[arg(default_value = "default")]
    pub task: String,

    /// Point the bundle at the mocked backend and serve the fixtures
    #[arg(long = "mock-backend")]
    pub mock_backend: bool,

    /// Serve the output with the embedded server
    #[arg(long = "node-server")]
    pub node_server: bool,

    /// Serve the output from a container (wins over --node-server)
    #[arg(long = "docker-server")]
    pub docker_server: bool,

    /// Output directory, relative to the project root
    #[arg(long = "www")]
    pub www: Option<PathBuf>,

    /// Backend the bundle talks to
    #[arg(long = "backend-url")]
    pub backend_url: Option<String>,

    /// Backend the bundle talks to with --mock-backend
    #[arg(long = "mocked-backend-url")]
    pub mocked_backend_url: Option<String>,

    /// Port of the embedded server and of the container
    #[arg(long = "port")]
    pub port: Option<u16>,

    /// Port of the live-reload server
    #[arg(long = "livereload-port")]
    pub livereload_port: Option<u16>,

    /// Options file (JSON), relative to the project root
    #[arg(long = "options")]
    pub options: Option<PathBuf>,

    /// Project root
    #[arg(short = 'C', long = "dir", default_value = ".")]
    pub dir: PathBuf,

    /// Show what would be executed without running tasks
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// List the available tasks
    #[arg(long = "list")]
    pub list: bool,

    /// How to display the output of external commands
    #[arg(long = "output", value_enum, default_value_t = OutputMode::Group)]
    pub output: OutputMode,

    /// Ignore repeated changes to a file within this window (e.g. "100ms", "1s")
    #[arg(long = "debounce", value_parser = humantime::parse_duration, default_value = "100ms")]
    pub debounce: Duration,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,
}

impl Cli {
    /// The configuration layer set by flags.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            use_container_server: None,
            use_embedded_server: None,
            static_output_root: self.www.clone(),
            backend_url: self.backend_url.clone(),
            mocked_backend_url: self.mocked_backend_url.clone(),
            server_port: self.port,
            livereload_port: self.livereload_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["devflow"]);
        assert_eq!(cli.task, "default");
        assert_eq!(cli.output, OutputMode::Group);
        assert_eq!(cli.debounce, Duration::from_millis(100));
        assert_eq!(cli.overrides(), ConfigOverrides::default());
    }

    #[test]
    fn flags_become_overrides() {
        let cli = Cli::parse_from([
            "devflow",
            "build",
            "--www",
            "dist",
            "--backend-url",
            "http://api.local",
            "--port",
            "9000",
            "--debounce",
            "1s",
        ]);

        assert_eq!(cli.task, "build");
        assert_eq!(cli.debounce, Duration::from_secs(1));
        let overrides = cli.overrides();
        assert_eq!(overrides.static_output_root, Some(PathBuf::from("dist")));
        assert_eq!(overrides.backend_url.as_deref(), Some("http://api.local"));
        assert_eq!(overrides.server_port, Some(9000));
        assert_eq!(overrides.use_embedded_server, None);
    }
}
