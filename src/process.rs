use std::{
    io::Error as IoError,
    process::{ExitStatus, Stdio},
};

use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    process::Command as TokioCommand,
};

use crate::output::OutputMode;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command execution error: {0}")]
    Io(#[from] IoError),
    #[error("`{command}` exited with {status}{}", format_stderr(.stderr))]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

fn shell(command: &str) -> TokioCommand {
    if cfg!(target_os = "windows") {
        let mut c = TokioCommand::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = TokioCommand::new("sh");
        c.args(["-c", command]);
        c
    }
}

/// Runs `command` through the platform shell and waits for it to exit.
///
/// A non-zero exit is not an error here; callers that need one use
/// [`run_checked`].
pub async fn run_command(command: &str, output_mode: OutputMode) -> Result<ProcessOutput, CommandError> {
    tracing::debug!("exec: {}", command);

    let mut cmd = shell(command);
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null());

    let mut child = cmd.spawn()?;
    let stream = output_mode.streams();

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let stdout_handle =
        tokio::spawn(async move { collect(stdout_pipe, tokio::io::stdout(), stream).await });
    let stderr_handle =
        tokio::spawn(async move { collect(stderr_pipe, tokio::io::stderr(), stream).await });

    let status = child.wait().await?;

    let stdout = stdout_handle.await.map_err(IoError::other)??;
    let stderr = stderr_handle.await.map_err(IoError::other)??;

    Ok(ProcessOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

/// Like [`run_command`], but a non-zero exit becomes [`CommandError::Failed`].
pub async fn run_checked(command: &str, output_mode: OutputMode) -> Result<ProcessOutput, CommandError> {
    let output = run_command(command, output_mode).await?;
    if !output.success() {
        return Err(CommandError::Failed {
            command: command.to_string(),
            status: output.status,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

async fn collect<R, W>(pipe: Option<R>, mut sink: W, stream: bool) -> Result<Vec<u8>, IoError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut collected: Vec<u8> = Vec::new();
    let Some(mut pipe) = pipe else {
        return Ok(collected);
    };

    let mut buf = [0u8; 8192];
    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
        if stream {
            sink.write_all(&buf[..n]).await?;
        }
    }
    if stream {
        sink.flush().await?;
    }

    Ok(collected)
}
