//! The compilation pipeline
//!
//! Wires loader → parser → resolver → renderer → emitter behind a single
//! entry point. Every cache (source text, validated modules, resolved
//! templates) is scoped to one `Pipeline` instance and discarded with it;
//! separate compile runs share nothing.

use std::collections::HashSet;
use std::sync::Arc;

use crate::emit::{self, Script};
use crate::error::Result;
use crate::loader::Loader;
use crate::parser::Parser;
use crate::render::{self, RenderResult};
use crate::resolver::{ModuleTemplate, Resolver};

/// Compile-time options supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Enabled feature names activating `[feature]`-suffixed definitions.
    pub features: HashSet<String>,
}

/// A single-use compilation pipeline.
pub struct Pipeline {
    resolver: Resolver,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            resolver: Resolver::new(Loader::new(), Parser::new(), options.features),
        }
    }

    /// Resolve the entry module to its template tree.
    pub async fn resolve(&self, entry: &str) -> Result<Arc<ModuleTemplate>> {
        self.resolver.resolve(entry, None).await
    }

    /// Resolve and render all tasks of the entry module.
    pub async fn render(&self, entry: &str) -> Result<RenderResult> {
        let template = self.resolve(entry).await?;
        render::render_all(&template)
    }

    /// Full compile: entry specifier to final script text.
    pub async fn compile(&self, entry: &str) -> Result<Script> {
        let rendered = self.render(entry).await?;
        let script = emit::emit(&rendered);
        tracing::debug!(
            functions = script.count,
            bytes = script.text.len(),
            "emitted script"
        );
        Ok(script)
    }
}
