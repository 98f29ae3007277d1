use std::path::{Component, Path, PathBuf};

use crate::{
    config::Configuration,
    error::{ConfigError, Result},
};

/// Where sources live inside the project. All relative paths and globs
/// are resolved against `root`.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub style_entry: PathBuf,
    pub style_load_paths: Vec<PathBuf>,
    pub style_watch: String,
    pub font_globs: Vec<String>,
    pub script_entry: PathBuf,
    pub script_watch: String,
    pub container_context: PathBuf,
    pub container_file: String,
    pub fixtures: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            style_entry: PathBuf::from("sass/style.scss"),
            style_load_paths: [
                "bower_components/bourbon/app/assets/stylesheets",
                "bower_components/neat/app/assets/stylesheets",
                "bower_components/refills/source/stylesheets",
                "bower_components/font-awesome/scss",
            ]
            .iter()
            .map(PathBuf::from)
            .collect(),
            style_watch: "sass/**/*.scss".to_string(),
            font_globs: vec!["bower_components/font-awesome/fonts/fontawesome*".to_string()],
            script_entry: PathBuf::from("app/app.js"),
            script_watch: "app/**/*".to_string(),
            container_context: PathBuf::from("server"),
            container_file: "Dockerfile".to_string(),
            fixtures: PathBuf::from("mocked_backend"),
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    pub fn output_root(&self, config: &Configuration) -> PathBuf {
        normalize(&self.root.join(&config.static_output_root))
    }

    pub fn css_dir(&self, config: &Configuration) -> PathBuf {
        self.output_root(config).join("css")
    }

    pub fn fonts_dir(&self, config: &Configuration) -> PathBuf {
        self.output_root(config).join("fonts")
    }

    pub fn bundle_path(&self, config: &Configuration) -> PathBuf {
        self.output_root(config).join("js").join("bundle.js")
    }

    /// Glob matching everything in the output tree, relative to `root`.
    /// The watcher only sees the project, so an output root outside of it
    /// is an error.
    pub fn output_watch(&self, config: &Configuration) -> Result<String> {
        let output_root = self.output_root(config);
        let root = normalize(&self.root);
        let www = output_root
            .strip_prefix(&root)
            .map_err(|_| ConfigError::OutsideProject {
                path: output_root.clone(),
                root: root.clone(),
            })?;

        let www = www.to_string_lossy().replace('\\', "/");
        if www.is_empty() {
            Ok("**/*".to_string())
        } else {
            Ok(format!("{}/**/*", www.trim_end_matches('/')))
        }
    }

    /// Path shown to live-reload clients: relative to the output tree when
    /// the file is part of it, otherwise relative to the project.
    pub fn display_path(&self, config: &Configuration, path: &Path) -> String {
        let output_root = self.output_root(config);
        let relative = path
            .strip_prefix(&output_root)
            .or_else(|_| path.strip_prefix(&self.root))
            .unwrap_or(path);
        relative.to_string_lossy().replace('\\', "/")
    }
}

/// Lexically drops `.` and folds `..` into the preceding component.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir if out.file_name().is_some() => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
