use clap::Parser;
use std::{fs, path::PathBuf, sync::Arc};

mod assets;
mod cli;
mod config;
mod container;
mod error;
mod isolate;
mod layout;
mod logger;
mod mode;
mod output;
mod process;
mod reload;
mod runner;
mod server;
mod task;
mod util;
mod watch;

use cli::Cli;
use config::{Configuration, DEFAULT_OPTIONS_FILE, load_overrides, resolve};
use error::Result;
use isolate::TerminalSink;
use layout::ProjectLayout;
use mode::select_mode;
use runner::{Context, Runner};
use task::{TaskGraph, describe_tasks, task_table, transitive_only};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Cli::parse();
    logger::init_logger(args.verbose, args.quiet, args.no_color);

    match run_devflow(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_devflow(args: Cli) -> Result<()> {
    let root = fs::canonicalize(&args.dir)?;
    let options = root.join(
        args.options
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OPTIONS_FILE)),
    );

    let config = resolve(
        Configuration::default(),
        load_overrides(&options)?,
        args.overrides(),
    );
    let mode = select_mode(&config, args.node_server, args.docker_server);
    tracing::debug!("Serving mode: {}", mode);

    let graph = TaskGraph::new(task_table(mode, args.mock_backend))?;

    if args.list {
        print!("{}", describe_tasks(graph.tasks()));
        return Ok(());
    }

    let order = graph.execution_order(&args.task)?;

    if args.verbose {
        println!("Task execution order: {}", order.join(" -> "));
        for name in transitive_only(graph.tasks(), &order, &args.task) {
            tracing::debug!("'{}' runs as an indirect dependency of '{}'", name, args.task);
        }
    }

    if args.dry_run {
        println!("Dry run mode - showing what would be executed:");
        for name in &order {
            if let Some(task) = graph.get(name) {
                let note = if task.action.is_long_running() {
                    " (keeps running)"
                } else {
                    ""
                };
                println!("  {} would run: {}{}", name, task.action, note);
            }
        }
        return Ok(());
    }

    let runner = Runner::new(
        graph,
        Context {
            config,
            layout: ProjectLayout::new(root),
            mock_backend: args.mock_backend,
            output_mode: args.output,
            debounce: args.debounce,
        },
        Arc::new(TerminalSink),
    );

    runner.run(&args.task).await?;

    if runner.has_background() {
        runner.wait().await?;
    }

    Ok(())
}
