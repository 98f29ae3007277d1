use std::fmt;

use super::Task;
use crate::mode::{ServingMode, default_dependencies};

/// What a declared task does when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Only aggregates its dependencies.
    Group,
    CompileStyles,
    CopyFonts,
    Bundle,
    WatchBundle,
    ContainerStop,
    ContainerBuild,
    ContainerRun,
    Watch,
    WatchContainer,
    MockBackend,
    EmbeddedServer,
    WatchOutput,
}

impl Action {
    /// Whether the action leaves something running in the background.
    pub fn is_long_running(self) -> bool {
        matches!(
            self,
            Action::WatchBundle
                | Action::Watch
                | Action::WatchContainer
                | Action::MockBackend
                | Action::EmbeddedServer
                | Action::WatchOutput
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Action::Group => "run dependencies",
            Action::CompileStyles => "compile SCSS to CSS",
            Action::CopyFonts => "copy font files",
            Action::Bundle => "bundle JavaScript",
            Action::WatchBundle => "bundle JavaScript and rebundle on change",
            Action::ContainerStop => "stop running containers",
            Action::ContainerBuild => "build the container image",
            Action::ContainerRun => "run the container",
            Action::Watch => "rebuild styles and fonts on change, serve live-reload",
            Action::WatchContainer => "restart the container on change",
            Action::MockBackend => "serve mocked backend fixtures",
            Action::EmbeddedServer => "serve the build output",
            Action::WatchOutput => "live-reload on output change",
        };
        f.write_str(text)
    }
}

/// The fixed task declaration. `default` depends on the build plus whatever
/// the selected serving mode and mock toggle call for.
pub fn task_table(mode: ServingMode, mock_backend: bool) -> Vec<Task<Action>> {
    let default_deps = default_dependencies(mode, mock_backend);
    let default_deps: Vec<&str> = default_deps.iter().map(String::as_str).collect();

    vec![
        Task::new("sass", &[], Action::CompileStyles),
        Task::new("font", &[], Action::CopyFonts),
        Task::new("browserify", &[], Action::Bundle),
        Task::new("watchify", &[], Action::WatchBundle),
        Task::new("build", &["sass", "font", "browserify"], Action::Group),
        Task::new("docker:stop", &[], Action::ContainerStop),
        Task::new("docker:build", &["docker:stop"], Action::ContainerBuild),
        Task::new("docker", &["docker:build"], Action::ContainerRun),
        Task::new("watch", &["watchify"], Action::Watch),
        Task::new("docker-server", &["watch", "docker"], Action::WatchContainer),
        Task::new("mock-backend", &[], Action::MockBackend),
        Task::new("node-server", &["watch", "direct"], Action::EmbeddedServer),
        Task::new("direct", &["watch"], Action::WatchOutput),
        Task::new("default", &default_deps, Action::Group),
    ]
}
