//! Executes task actions.
//!
//! One-shot actions (compile, copy, bundle, container steps) finish before
//! their future resolves. Long-running actions (watchers, servers) start
//! their background work, register it here, and resolve as soon as it is
//! up, so dependents can proceed.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    assets::{BundleOptions, Bundler, StyleCompiler, copy_fonts},
    config::Configuration,
    container::ContainerLifecycle,
    error::{DevflowError, Result},
    isolate::{DiagnosticSink, IsolatedStage},
    layout::ProjectLayout,
    output::OutputMode,
    reload::LiveReload,
    server::{self, MOCK_BACKEND_PORT},
    task::{Action, Executor, Task, TaskGraph},
    watch::{FileWatcher, WatchBinding},
};

/// Everything an invocation needs to know besides the task graph.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Configuration,
    pub layout: ProjectLayout,
    pub mock_backend: bool,
    pub output_mode: OutputMode,
    pub debounce: Duration,
}

struct Inner {
    graph: TaskGraph<Action>,
    ctx: Context,
    reload: LiveReload,
    sink: Arc<dyn DiagnosticSink>,
    styles: StyleCompiler,
    bundler: Arc<Bundler>,
    container: ContainerLifecycle,
    background: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Runner {
    inner: Arc<Inner>,
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DevflowError::Task(format!("Blocking task failed: {}", e)))?
}

impl Runner {
    pub fn new(graph: TaskGraph<Action>, ctx: Context, sink: Arc<dyn DiagnosticSink>) -> Self {
        let layout = &ctx.layout;
        let config = &ctx.config;

        let styles = StyleCompiler::new(
            layout.resolve(&layout.style_entry),
            layout
                .style_load_paths
                .iter()
                .map(|p| layout.resolve(p))
                .collect(),
            layout.css_dir(config),
        );

        let bundler = Bundler::new(BundleOptions {
            root: layout.root.clone(),
            entry: layout.resolve(&layout.script_entry),
            output: layout.bundle_path(config),
            env: [(
                "backend_url".to_string(),
                config.injected_backend_url(ctx.mock_backend).to_string(),
            )]
            .into(),
        });

        let container = ContainerLifecycle::new(
            layout.resolve(&layout.container_context),
            config.server_port,
            ctx.output_mode,
        );

        Self {
            inner: Arc::new(Inner {
                graph,
                reload: LiveReload::new(),
                sink,
                styles,
                bundler: Arc::new(bundler),
                container,
                background: Mutex::new(Vec::new()),
                ctx,
            }),
        }
    }

    pub async fn run(&self, entry: &str) -> Result<()> {
        self.inner.graph.run(entry, self).await
    }

    /// Whether a watcher or server is still running.
    pub fn has_background(&self) -> bool {
        !self.inner.background.lock().is_empty()
    }

    /// Keeps background work alive until Ctrl+C.
    pub async fn wait(&self) -> Result<()> {
        tracing::info!("Watching for changes. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");

        for handle in self.inner.background.lock().drain(..) {
            handle.abort();
        }
        Ok(())
    }

    fn display_path(&self, path: &Path) -> String {
        self.inner.ctx.layout.display_path(&self.inner.ctx.config, path)
    }

    fn isolated(&self, stage: impl Into<String>) -> IsolatedStage {
        IsolatedStage::new(stage, self.inner.sink.clone())
    }

    /// Runs the action and returns the files it wrote.
    fn perform(&self, action: Action) -> BoxFuture<'_, Result<Vec<PathBuf>>> {
        async move {
            let ctx = &self.inner.ctx;
            let layout = &ctx.layout;

            match action {
                Action::Group => Ok(Vec::new()),
                Action::CompileStyles => {
                    let styles = self.inner.styles.clone();
                    let result = blocking(move || styles.compile()).await;
                    Ok(self.isolated("sass").absorb(result).into_iter().collect())
                }
                Action::CopyFonts => {
                    copy_fonts(&layout.root, &layout.font_globs, &layout.fonts_dir(&ctx.config))
                        .await
                }
                Action::Bundle => {
                    let bundler = self.inner.bundler.clone();
                    let bundle = blocking(move || bundler.write()).await?;
                    tracing::debug!("Bundled {} modules", bundle.modules.len());
                    Ok(vec![self.inner.bundler.options().output.clone()])
                }
                Action::WatchBundle => {
                    let bundler = self.inner.bundler.clone();
                    let written = self
                        .isolated("watchify")
                        .absorb(blocking(move || bundler.write()).await)
                        .map(|_| self.inner.bundler.options().output.clone());

                    self.spawn_watch(vec![WatchBinding::task(
                        "browserify",
                        vec![layout.script_watch.clone()],
                    )])?;
                    Ok(written.into_iter().collect())
                }
                Action::ContainerStop => {
                    self.inner.container.stop().await;
                    Ok(Vec::new())
                }
                Action::ContainerBuild => {
                    self.inner.container.build().await?;
                    Ok(Vec::new())
                }
                Action::ContainerRun => {
                    self.inner.container.run(&self.inner.reload).await?;
                    Ok(Vec::new())
                }
                Action::Watch => {
                    let listener = server::bind(ctx.config.livereload_port).await?;
                    self.spawn_server("live-reload", listener, self.inner.reload.router());

                    self.spawn_watch(vec![
                        WatchBinding::task("sass", vec![layout.style_watch.clone()]),
                        WatchBinding::task("font", layout.font_globs.clone()),
                    ])?;
                    Ok(Vec::new())
                }
                Action::WatchContainer => {
                    let dockerfile = layout
                        .container_context
                        .join(&layout.container_file)
                        .to_string_lossy()
                        .replace('\\', "/");
                    self.spawn_watch(vec![WatchBinding::with_dependencies(
                        "docker",
                        vec![dockerfile, layout.output_watch(&ctx.config)?],
                    )])?;
                    Ok(Vec::new())
                }
                Action::MockBackend => {
                    let listener = server::bind(MOCK_BACKEND_PORT).await?;
                    let router = server::mock_router(&layout.resolve(&layout.fixtures));
                    self.spawn_server("mock backend", listener, router);
                    Ok(Vec::new())
                }
                Action::EmbeddedServer => {
                    let listener = server::bind(ctx.config.server_port).await?;
                    let router = server::asset_router(&layout.output_root(&ctx.config));
                    self.spawn_server("asset server", listener, router);
                    Ok(Vec::new())
                }
                Action::WatchOutput => {
                    self.spawn_watch(vec![WatchBinding::notify_only(vec![
                        layout.output_watch(&ctx.config)?,
                    ])])?;
                    Ok(Vec::new())
                }
            }
        }
        .boxed()
    }

    fn spawn_server(&self, name: &'static str, listener: tokio::net::TcpListener, router: axum::Router) {
        match listener.local_addr() {
            Ok(addr) => tracing::info!("{} listening on http://{}", name, addr),
            Err(e) => tracing::debug!("{} started, address unknown: {}", name, e),
        }

        let handle = tokio::spawn(async move {
            if let Err(e) = server::serve(listener, router).await {
                tracing::error!("{} stopped: {}", name, e);
            }
        });
        self.inner.background.lock().push(handle);
    }

    fn spawn_watch(&self, bindings: Vec<WatchBinding>) -> Result<()> {
        let (watcher, mut rx) =
            FileWatcher::spawn(&self.inner.ctx.layout.root, &bindings, self.inner.ctx.debounce)?;
        tracing::debug!(
            "Watching {} bindings under {}",
            bindings.len(),
            watcher.root().display()
        );
        let runner = self.clone();

        let handle = tokio::spawn(async move {
            let _watcher = watcher;
            while let Some(event) = rx.recv().await {
                if let Some(binding) = bindings.get(event.binding) {
                    runner.on_change(binding, &event.path).await;
                }
            }
        });
        self.inner.background.lock().push(handle);
        Ok(())
    }

    /// Handles one debounced change. Failures are reported as diagnostics
    /// and never end the watch loop.
    async fn on_change(&self, binding: &WatchBinding, path: &Path) {
        let changed = self.display_path(path);

        let Some(owner) = &binding.owner else {
            self.inner.reload.changed(changed);
            return;
        };

        tracing::info!("{} changed, re-running '{}'", changed, owner);
        let stage = self.isolated(format!("watch:{}", owner));

        let written = if binding.rerun_dependencies {
            stage
                .absorb(self.inner.graph.run(owner, self).await)
                .map(|()| Vec::new())
        } else {
            match self.inner.graph.get(owner) {
                Some(task) => stage.absorb(self.perform(task.action).await),
                None => stage.absorb::<Vec<PathBuf>, _>(Err(DevflowError::Task(format!(
                    "Task '{}' not found",
                    owner
                )))),
            }
        };

        for artifact in written.into_iter().flatten() {
            self.inner.reload.changed(self.display_path(&artifact));
        }
    }
}

impl Executor<Action> for Runner {
    fn execute<'a>(&'a self, task: &'a Task<Action>) -> BoxFuture<'a, Result<()>> {
        async move {
            tracing::info!("Starting '{}'...", task.name);
            let started = Instant::now();

            self.perform(task.action).await?;

            let elapsed = Duration::from_millis(started.elapsed().as_millis() as u64);
            tracing::info!(
                "Finished '{}' after {}",
                task.name,
                humantime::format_duration(elapsed)
            );
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        isolate::testing::MemorySink,
        mode::ServingMode,
        task::task_table,
    };
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let write = |path: &str, contents: &str| {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        };
        write("sass/style.scss", ".nav { a { color: red; } }\n");
        write("app/app.js", "var url = process.env.backend_url;\n");
        write("bower_components/font-awesome/fonts/fontawesome-webfont.woff", "woff");
        dir
    }

    fn runner(dir: &TempDir, mock_backend: bool, sink: Arc<MemorySink>) -> Runner {
        let root = fs::canonicalize(dir.path()).unwrap();
        let graph = TaskGraph::new(task_table(ServingMode::Static, mock_backend)).unwrap();
        Runner::new(
            graph,
            Context {
                config: Configuration::default(),
                layout: ProjectLayout::new(root),
                mock_backend,
                output_mode: OutputMode::Group,
                debounce: Duration::from_millis(50),
            },
            sink,
        )
    }

    #[tokio::test]
    async fn build_writes_every_artifact() {
        let dir = project();
        let sink = Arc::new(MemorySink::default());
        let runner = runner(&dir, true, sink.clone());

        runner.run("build").await.unwrap();

        let www = dir.path().join("server/www");
        assert!(www.join("css/style.css").is_file());
        assert!(www.join("fonts/fontawesome-webfont.woff").is_file());
        let bundle = fs::read_to_string(www.join("js/bundle.js")).unwrap();
        assert!(bundle.contains("\"http://localhost:8081\""));
        assert!(sink.diagnostics().is_empty());
        assert!(!runner.has_background());
    }

    #[tokio::test]
    async fn broken_styles_do_not_fail_the_build() {
        let dir = project();
        fs::write(dir.path().join("sass/style.scss"), ".nav { color: red;").unwrap();
        let sink = Arc::new(MemorySink::default());

        runner(&dir, false, sink.clone()).run("build").await.unwrap();

        let diagnostics = sink.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].stage, "sass");
        let bundle = fs::read_to_string(dir.path().join("server/www/js/bundle.js")).unwrap();
        assert!(bundle.contains("\"http://ushahidi-backend\""));
    }

    #[tokio::test]
    async fn broken_bundle_fails_the_build() {
        let dir = project();
        fs::write(dir.path().join("app/app.js"), "require('./missing');\n").unwrap();

        let err = runner(&dir, false, Arc::new(MemorySink::default()))
            .run("build")
            .await
            .unwrap_err();
        assert!(matches!(err, DevflowError::TaskFailure { ref task, .. } if task == "browserify"));
    }

    #[tokio::test]
    async fn watcher_rebuilds_styles_and_notifies_clients() {
        let dir = project();
        let sink = Arc::new(MemorySink::default());
        let runner = runner(&dir, false, sink.clone());
        let (_, mut rx) = runner.inner.reload.register_client();

        runner
            .spawn_watch(vec![WatchBinding::task(
                "sass",
                vec!["sass/**/*.scss".to_string()],
            )])
            .unwrap();
        assert!(runner.has_background());

        fs::write(dir.path().join("sass/style.scss"), ".a { color: blue; }").unwrap();

        let message = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no reload event")
            .unwrap();
        assert_eq!(message, r#"{"path":"css/style.css"}"#);
        assert!(sink.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn watcher_survives_a_broken_stylesheet() {
        let dir = project();
        let sink = Arc::new(MemorySink::default());
        let runner = runner(&dir, false, sink.clone());
        let (_, mut rx) = runner.inner.reload.register_client();

        runner
            .spawn_watch(vec![WatchBinding::task(
                "sass",
                vec!["sass/**/*.scss".to_string()],
            )])
            .unwrap();

        // whole-file replacement so each save is a single change
        let save = |contents: &str| {
            let staged = dir.path().join("sass/style.scss.tmp");
            fs::write(&staged, contents).unwrap();
            fs::rename(&staged, dir.path().join("sass/style.scss")).unwrap();
        };

        save(".a { color: blue;");
        let deadline = Instant::now() + Duration::from_secs(10);
        while sink.diagnostics().is_empty() {
            assert!(Instant::now() < deadline, "broken stylesheet was not reported");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(sink.diagnostics()[0].stage, "sass");
        while rx.try_recv().is_ok() {}

        save(".a { color: green; }");

        let message = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("watcher stopped after the failure")
            .unwrap();
        assert_eq!(message, r#"{"path":"css/style.css"}"#);
        let css = fs::read_to_string(dir.path().join("server/www/css/style.css")).unwrap();
        assert!(css.contains(".a"));
    }
}
