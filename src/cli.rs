//! CLI command definitions and handling
//!
//! Uses `clap` derive API for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// tasc - compile YAML task modules into a self-contained shell script
#[derive(Parser, Debug)]
#[command(name = "tasc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable a feature flag (repeatable)
    #[arg(short = 'F', long = "feature", global = true)]
    pub features: Vec<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Entry module to compile (shorthand for `tasc compile <entry>`)
    pub entry: Option<String>,

    /// Write the script to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile an entry module to a shell script
    Compile {
        /// Entry module (defaults to tasks.yaml / tasks.yml)
        entry: Option<String>,

        /// Write the script to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate an entry module without emitting a script
    Check {
        /// Entry module (defaults to tasks.yaml / tasks.yml)
        entry: Option<String>,
    },

    /// List the tasks an entry module would expose
    List {
        /// Entry module (defaults to tasks.yaml / tasks.yml)
        entry: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: ListFormat,
    },
}

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ListFormat {
    #[default]
    Table,
    Json,
    Plain,
}

impl Cli {
    /// Get the effective command, treating a bare entry path (or nothing
    /// at all) as `compile`.
    pub fn effective_command(&self) -> EffectiveCommand<'_> {
        if let Some(cmd) = &self.command {
            EffectiveCommand::Subcommand(cmd)
        } else {
            EffectiveCommand::Compile {
                entry: self.entry.as_deref(),
                output: self.output.as_ref(),
            }
        }
    }
}

pub enum EffectiveCommand<'a> {
    Subcommand(&'a Commands),
    Compile {
        entry: Option<&'a str>,
        output: Option<&'a PathBuf>,
    },
}
