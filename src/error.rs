use std::path::PathBuf;

use thiserror::Error;

use crate::{process::CommandError, util::FileError};

#[derive(Debug, Error)]
pub enum DevflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Dependency error: {0}")]
    Graph(#[from] GraphError),
    #[error("Task error: {0}")]
    Task(String),
    #[error("Task '{task}' failed: {source}")]
    TaskFailure {
        task: String,
        #[source]
        source: Box<DevflowError>,
    },
    #[error("{stage} failed: {message}")]
    Transform { stage: String, message: String },
    #[error("Command error: {0}")]
    Command(#[from] CommandError),
    #[error("File error: {0}")]
    File(#[from] FileError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
    #[error("Server error: {0}")]
    Server(String),
}

impl DevflowError {
    pub fn transform(stage: impl Into<String>, message: impl Into<String>) -> Self {
        DevflowError::Transform {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn task_failure(task: impl Into<String>, source: DevflowError) -> Self {
        DevflowError::TaskFailure {
            task: task.into(),
            source: Box::new(source),
        }
    }
}

/// Failures while loading the options file or applying its values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed options file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("output root {} is outside the project {}", path.display(), root.display())]
    OutsideProject { path: PathBuf, root: PathBuf },
}

/// Problems in the task declaration, detected before anything runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Task '{0}' is declared more than once")]
    Duplicate(String),
    #[error("Task '{0}' depends on itself")]
    SelfDependency(String),
    #[error("Task '{task}' depends on '{dependency}' which doesn't exist")]
    Dangling { task: String, dependency: String },
    #[error("Circular dependency: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

pub type Result<T> = std::result::Result<T, DevflowError>;
