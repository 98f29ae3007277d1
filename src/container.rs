use std::path::PathBuf;

use crate::{
    error::Result,
    output::OutputMode,
    process::{run_checked, run_command},
    reload::LiveReload,
};

/// Stop, build and run of the container that serves the output tree.
#[derive(Debug, Clone)]
pub struct ContainerLifecycle {
    pub docker: String,
    pub container: String,
    pub image: String,
    pub context: PathBuf,
    pub host_port: u16,
    pub container_port: u16,
    /// Prints the address of the docker host. `localhost` when unset or
    /// when the command fails.
    pub ip_command: Option<String>,
    pub output_mode: OutputMode,
}

impl ContainerLifecycle {
    pub fn new(context: PathBuf, host_port: u16, output_mode: OutputMode) -> Self {
        Self {
            docker: "docker".to_string(),
            container: "ushahidi-client".to_string(),
            image: "ushahidi-client-server".to_string(),
            context,
            host_port,
            container_port: 80,
            ip_command: Some("boot2docker ip".to_string()),
            output_mode,
        }
    }

    pub fn stop_command(&self) -> String {
        format!(
            "{docker} ps -a | grep {container} | awk '{{print $1}}' | xargs {docker} stop | xargs {docker} rm",
            docker = self.docker,
            container = self.container
        )
    }

    pub fn build_command(&self) -> String {
        format!(
            "{} build -t {} --quiet=true {}",
            self.docker,
            self.image,
            quote(&self.context.to_string_lossy())
        )
    }

    pub fn run_command(&self) -> String {
        format!(
            "{} run --name={} -d -p {}:{} {}",
            self.docker, self.container, self.host_port, self.container_port, self.image
        )
    }

    /// Removes any previous container. Nothing to stop is not an error, and
    /// neither is anything else that goes wrong here.
    pub async fn stop(&self) {
        match run_command(&self.stop_command(), self.output_mode).await {
            Ok(output) if output.success() => {
                tracing::debug!("Stopped container {}", self.container)
            }
            Ok(output) => tracing::debug!(
                "No container to stop ({}): {}",
                output.status,
                output.stderr.trim()
            ),
            Err(e) => tracing::debug!("Ignoring failed stop: {}", e),
        }
    }

    pub async fn build(&self) -> Result<()> {
        let output = run_checked(&self.build_command(), self.output_mode).await?;
        if !self.output_mode.streams() && !output.stdout.trim().is_empty() {
            println!("{}", output.stdout.trim_end());
        }
        tracing::info!("Built image {}", self.image);
        Ok(())
    }

    /// Starts the container and returns the URL it serves on.
    pub async fn run(&self, reload: &LiveReload) -> Result<String> {
        run_checked(&self.run_command(), self.output_mode).await?;

        let url = format!("http://{}:{}/", self.host().await, self.host_port);
        tracing::info!("server is live @ {}", url);
        reload.changed_all();
        Ok(url)
    }

    async fn host(&self) -> String {
        if let Some(command) = &self.ip_command {
            match run_command(command, OutputMode::Group).await {
                Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
                    return output.stdout.trim().to_string();
                }
                Ok(_) => tracing::debug!("`{}` gave no address", command),
                Err(e) => tracing::debug!("`{}` failed: {}", command, e),
            }
        }
        "localhost".to_string()
    }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '\'') {
        format!("'{}'", arg.replace('\'', r"'\''"))
    } else {
        arg.to_string()
    }
}
