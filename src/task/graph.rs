use std::collections::HashMap;

use futures::future::{BoxFuture, join_all};

use super::{
    Task,
    dependency::{ExecutionLevel, calculate_dependency_levels, required_tasks, validate_tasks},
};
use crate::error::{DevflowError, GraphError, Result};

/// Runs the action of a single task. The returned future resolves when the
/// underlying work (stream, process, server start-up) is done.
pub trait Executor<A>: Sync {
    fn execute<'a>(&'a self, task: &'a Task<A>) -> BoxFuture<'a, Result<()>>;
}

/// The validated task declaration. Built once at startup and read-only
/// afterwards.
#[derive(Debug)]
pub struct TaskGraph<A> {
    tasks: Vec<Task<A>>,
    index: HashMap<String, usize>,
}

impl<A: Sync> TaskGraph<A> {
    pub fn new(tasks: Vec<Task<A>>) -> std::result::Result<Self, GraphError> {
        validate_tasks(&tasks)?;

        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();

        Ok(Self { tasks, index })
    }

    pub fn get(&self, name: &str) -> Option<&Task<A>> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub fn tasks(&self) -> &[Task<A>] {
        &self.tasks
    }

    fn lookup(&self, name: &str) -> Result<&Task<A>> {
        self.get(name)
            .ok_or_else(|| DevflowError::Task(format!("Task '{}' not found", name)))
    }

    /// Levels needed to run `entry`, dependencies first.
    pub fn levels(&self, entry: &str) -> Result<Vec<ExecutionLevel>> {
        self.lookup(entry)?;

        let needed = required_tasks(&self.tasks, entry);
        let reachable = self
            .tasks
            .iter()
            .filter(|t| needed.contains(t.name.as_str()));

        Ok(calculate_dependency_levels(reachable))
    }

    /// Topological order in which `run(entry)` starts tasks.
    pub fn execution_order(&self, entry: &str) -> Result<Vec<String>> {
        Ok(self
            .levels(entry)?
            .into_iter()
            .flat_map(|level| level.task_names)
            .collect())
    }

    /// Runs `entry` after everything it depends on. Every reachable task runs
    /// exactly once; tasks in the same level run concurrently, and a level
    /// only starts once the previous one has fully completed.
    pub async fn run<E: Executor<A>>(&self, entry: &str, executor: &E) -> Result<()> {
        let levels = self.levels(entry)?;

        tracing::debug!(
            "Executing {} levels for '{}': {}",
            levels.len(),
            entry,
            levels
                .iter()
                .map(|l| l.task_names.join(", "))
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        for level in levels {
            let tasks = level
                .task_names
                .iter()
                .map(|name| self.lookup(name))
                .collect::<Result<Vec<_>>>()?;

            let results = join_all(tasks.iter().map(|task| async move {
                tracing::debug!("Starting '{}'", task.name);
                let result = executor.execute(task).await;
                if result.is_ok() {
                    tracing::debug!("Finished '{}'", task.name);
                }
                (task.name.as_str(), result)
            }))
            .await;

            for (name, result) in results {
                if let Err(e) = result {
                    tracing::error!("Task '{}' failed, stopping execution", name);
                    return Err(DevflowError::task_failure(name, e));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy)]
    enum Work {
        Instant,
        Slow(u64),
        Fail,
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl Executor<Work> for Recorder {
        fn execute<'a>(&'a self, task: &'a Task<Work>) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.events.lock().push(format!("start:{}", task.name));
                match task.action {
                    Work::Instant => {}
                    Work::Slow(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                    Work::Fail => return Err(DevflowError::transform("test", "boom")),
                }
                self.events.lock().push(format!("end:{}", task.name));
                Ok(())
            })
        }
    }

    fn position(events: &[String], event: &str) -> usize {
        events
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing {event} in {events:?}"))
    }

    #[tokio::test]
    async fn diamond_dependency_runs_once_before_dependents() {
        let graph = TaskGraph::new(vec![
            Task::new("top", &["left", "right"], Work::Instant),
            Task::new("left", &["base"], Work::Instant),
            Task::new("right", &["base"], Work::Slow(20)),
            Task::new("base", &[], Work::Slow(10)),
            Task::new("unrelated", &[], Work::Instant),
        ])
        .unwrap();
        let recorder = Recorder::default();

        graph.run("top", &recorder).await.unwrap();

        let events = recorder.events();
        assert_eq!(events.iter().filter(|e| *e == "start:base").count(), 1);
        assert!(!events.contains(&"start:unrelated".to_string()));
        assert!(position(&events, "end:base") < position(&events, "start:left"));
        assert!(position(&events, "end:base") < position(&events, "start:right"));
        assert!(position(&events, "end:right") < position(&events, "start:top"));
        assert!(position(&events, "end:left") < position(&events, "start:top"));
    }

    #[tokio::test]
    async fn failure_halts_dependents() {
        let graph = TaskGraph::new(vec![
            Task::new("docker", &["docker:build"], Work::Instant),
            Task::new("docker:build", &["docker:stop"], Work::Fail),
            Task::new("docker:stop", &[], Work::Instant),
        ])
        .unwrap();
        let recorder = Recorder::default();

        let err = graph.run("docker", &recorder).await.unwrap_err();

        match err {
            DevflowError::TaskFailure { task, .. } => assert_eq!(task, "docker:build"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!recorder.events().contains(&"start:docker".to_string()));
    }

    #[tokio::test]
    async fn unknown_entry_is_an_error() {
        let graph = TaskGraph::new(vec![Task::new("sass", &[], Work::Instant)]).unwrap();
        let err = graph.run("less", &Recorder::default()).await.unwrap_err();
        assert!(matches!(err, DevflowError::Task(_)));
    }

    #[test]
    fn execution_order_lists_dependencies_first() {
        let graph = TaskGraph::new(vec![
            Task::new("build", &["sass", "font", "browserify"], Work::Instant),
            Task::new("sass", &[], Work::Instant),
            Task::new("font", &[], Work::Instant),
            Task::new("browserify", &[], Work::Instant),
        ])
        .unwrap();

        assert_eq!(
            graph.execution_order("build").unwrap(),
            vec!["sass", "font", "browserify", "build"]
        );
    }
}
