//! tasc - compile YAML task modules into a self-contained shell script
//!
//! This crate provides both a CLI tool and a library for compiling
//! declarative task descriptions.
//!
//! # Features
//!
//! - **Simple YAML modules** - Variables, tasks, and nested modules
//! - **Inheritance** - Compose modules with `uses`, including built-ins
//! - **Feature flags** - `name[feature]` keys select alternatives at compile time
//! - **Templated commands** - `{{ vars.x }}` lookups, task references and
//!   inlining, `ship`/`heredoc` directives
//! - **Deterministic output** - One shell function per task, plus a dispatcher
//!
//! # Example
//!
//! ```yaml
//! # tasks.yaml
//!
//! vars:
//!   greeting: Hello
//!
//! tasks:
//!   greet:
//!     desc: Print a greeting
//!     cmd: echo {{ vars.greeting }}
//!
//!   deploy:
//!     cmd: "{{ tasks.greet }} && ssh host \"{% ship %}{{ tasks.greet }}{% endship %}\""
//! ```
//!
//! # Library Usage
//!
//! ```rust,ignore
//! use tasc::{Pipeline, PipelineOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(PipelineOptions::default());
//!     let script = pipeline.compile("tasks.yaml").await?;
//!     print!("{}", script.text);
//!     Ok(())
//! }
//! ```

pub mod ast;
pub mod builtins;
pub mod emit;
pub mod error;
pub mod hash;
pub mod loader;
pub mod parser;
pub mod pipeline;
pub mod render;
pub mod resolver;
pub mod template;

// Re-export main types
pub use emit::Script;
pub use error::{Result, TascError};
pub use loader::Loader;
pub use parser::Parser;
pub use pipeline::{Pipeline, PipelineOptions};
pub use render::{RenderResult, RenderedTask};
pub use resolver::{ModuleTemplate, Resolver};
