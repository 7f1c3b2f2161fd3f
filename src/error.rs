//! Error types for tasc
//!
//! Uses `miette` for pretty error reporting with help text. Every variant
//! also maps to one of the stable error codes consumed by callers embedding
//! the compiler (`LOADER_ERROR`, `YAML_PARSE_ERROR`, ...).

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for tasc operations
#[derive(Error, Diagnostic, Debug)]
pub enum TascError {
    #[error("Module '{specifier}' not found (searched from {origin})")]
    #[diagnostic(
        code(tasc::loader::not_found),
        help("Create a tasks.yaml in your project root, or pass an explicit module path")
    )]
    ModuleNotFound {
        specifier: String,
        origin: String,
    },

    #[error("Failed to read module '{specifier}'")]
    #[diagnostic(code(tasc::loader::io))]
    ModuleRead {
        specifier: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {}", .path.display())]
    #[diagnostic(code(tasc::parse::yaml))]
    YamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Schema violation in {} at {}: {}", .path.display(), .at, .message)]
    #[diagnostic(
        code(tasc::parse::schema),
        help("Modules may only contain 'uses', 'vars', 'tasks', and 'modules' entries")
    )]
    Schema {
        path: PathBuf,
        at: String,
        message: String,
    },

    #[error("Template syntax error in {} at {}: {}", .path.display(), .at, .message)]
    #[diagnostic(code(tasc::parse::template))]
    TemplateSyntax {
        path: PathBuf,
        at: String,
        message: String,
    },

    #[error("Circular module dependency detected via {}", .path.display())]
    #[diagnostic(
        code(tasc::resolve::cycle),
        help("Check the 'uses' chains of your modules")
    )]
    CircularModule {
        path: PathBuf,
    },

    #[error("Circular task reference detected via '{name}'")]
    #[diagnostic(
        code(tasc::resolve::task_cycle),
        help("Two tasks reference each other; break the loop or inline one of them")
    )]
    CircularTask {
        name: String,
    },

    #[error("Module nesting exceeds the depth limit ({limit})")]
    #[diagnostic(code(tasc::resolve::depth))]
    ModuleDepthExceeded {
        limit: usize,
    },

    #[error("Failed to render task '{task}': {message}")]
    #[diagnostic(code(tasc::render::failed))]
    Render {
        task: String,
        message: String,
    },

    #[error("Task nesting exceeds the depth limit ({limit}) while rendering '{task}'")]
    #[diagnostic(code(tasc::render::depth))]
    RenderDepthExceeded {
        task: String,
        limit: usize,
    },

    #[error("I/O error")]
    #[diagnostic(code(tasc::io))]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    #[diagnostic(code(tasc::internal))]
    Internal {
        message: String,
    },

    #[error("Unexpected failure: {message}")]
    #[diagnostic(code(tasc::unknown))]
    Unknown {
        message: String,
    },
}

impl TascError {
    /// Stable error code for embedding callers (CLI, job platform).
    pub fn code(&self) -> &'static str {
        match self {
            TascError::ModuleNotFound { .. } | TascError::ModuleRead { .. } => "LOADER_ERROR",
            TascError::YamlParse { .. } => "YAML_PARSE_ERROR",
            TascError::Schema { .. } | TascError::TemplateSyntax { .. } => "SYNTAX_ERROR",
            TascError::CircularModule { .. }
            | TascError::CircularTask { .. }
            | TascError::ModuleDepthExceeded { .. } => "RESOLVER_ERROR",
            TascError::Render { .. } | TascError::RenderDepthExceeded { .. } => "RENDERER_ERROR",
            TascError::Io(_) | TascError::Internal { .. } => "INTERNAL_ERROR",
            TascError::Unknown { .. } => "UNKNOWN_ERROR",
        }
    }
}

/// Result type alias for tasc operations
pub type Result<T> = std::result::Result<T, TascError>;
