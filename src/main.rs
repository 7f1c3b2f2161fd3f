//! tasc - compile YAML task modules into a self-contained shell script
//!
//! The binary front end over the compilation pipeline:
//! - `tasc [entry]` / `tasc compile` - emit the script to stdout or a file
//! - `tasc check` - resolve and render without emitting
//! - `tasc list` - show the tasks the script would expose

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use console::style;

mod ast;
mod builtins;
mod cli;
mod emit;
mod error;
mod hash;
mod loader;
mod parser;
mod pipeline;
mod render;
mod resolver;
mod template;

use cli::{Cli, Commands, EffectiveCommand, ListFormat};
use error::{Result, TascError};
use pipeline::{Pipeline, PipelineOptions};
use render::RenderResult;

/// Default entry files probed in the working directory when no entry is
/// given.
const DEFAULT_ENTRIES: &[&str] = &["tasks.yaml", "tasks.yml"];

#[tokio::main]
async fn main() -> ExitCode {
    // Set up panic handler for nice error messages
    miette::set_panic_hook();

    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.into()),
        )
        .without_time()
        .init();

    // Handle --no-color
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let exit = exit_code(&e);
            eprintln!(
                "{}: {:?}",
                style("error").red().bold(),
                miette::Report::new(e)
            );
            ExitCode::from(exit)
        }
    }
}

/// Map stable error codes to sysexits-flavored process exit codes.
fn exit_code(err: &TascError) -> u8 {
    match err.code() {
        "LOADER_ERROR" => 66,
        "YAML_PARSE_ERROR" | "SYNTAX_ERROR" => 65,
        "RESOLVER_ERROR" | "RENDERER_ERROR" => 1,
        _ => 70,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let options = PipelineOptions {
        features: cli.features.iter().cloned().collect(),
    };

    match cli.effective_command() {
        EffectiveCommand::Subcommand(cmd) => run_command(cmd, &options).await,
        EffectiveCommand::Compile { entry, output } => compile(entry, output, &options).await,
    }
}

async fn run_command(cmd: &Commands, options: &PipelineOptions) -> Result<()> {
    match cmd {
        Commands::Compile { entry, output } => {
            compile(entry.as_deref(), output.as_ref(), options).await
        }

        Commands::Check { entry } => {
            let entry = resolve_entry(entry.as_deref())?;
            let rendered = Pipeline::new(options.clone()).render(&entry).await?;

            println!(
                "{} {} is valid ({} tasks, {} dependencies)",
                style("✓").green(),
                entry,
                rendered.main.len(),
                rendered.deps.len()
            );
            Ok(())
        }

        Commands::List { entry, format } => {
            let entry = resolve_entry(entry.as_deref())?;
            let rendered = Pipeline::new(options.clone()).render(&entry).await?;
            print_task_list(&rendered, format);
            Ok(())
        }
    }
}

async fn compile(
    entry: Option<&str>,
    output: Option<&PathBuf>,
    options: &PipelineOptions,
) -> Result<()> {
    let entry = resolve_entry(entry)?;
    let script = Pipeline::new(options.clone()).compile(&entry).await?;

    match output {
        Some(path) => {
            std::fs::write(path, &script.text)?;
            println!(
                "{} wrote {} task functions to {}",
                style("✓").green(),
                script.count,
                path.display()
            );
        }
        None => print!("{}", script.text),
    }

    Ok(())
}

fn resolve_entry(entry: Option<&str>) -> Result<String> {
    if let Some(entry) = entry {
        return Ok(entry.to_string());
    }

    for candidate in DEFAULT_ENTRIES {
        if std::path::Path::new(candidate).exists() {
            return Ok(candidate.to_string());
        }
    }

    Err(TascError::ModuleNotFound {
        specifier: DEFAULT_ENTRIES.join(" or "),
        origin: "the working directory".to_string(),
    })
}

fn print_task_list(rendered: &RenderResult, format: &ListFormat) {
    match format {
        ListFormat::Table => {
            println!("{}", style("Available tasks:").bold());
            println!();

            let max_name_len = rendered
                .main
                .iter()
                .map(|t| t.qualified_name.len())
                .max()
                .unwrap_or(0);

            for task in &rendered.main {
                println!(
                    "  {}{}  {}",
                    style(&task.qualified_name).cyan().bold(),
                    " ".repeat(max_name_len - task.qualified_name.len()),
                    style(task.desc.as_deref().unwrap_or("")).dim()
                );
            }
        }

        ListFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rendered.main).unwrap());
        }

        ListFormat::Plain => {
            for task in &rendered.main {
                println!("{}", task.qualified_name);
            }
        }
    }
}
