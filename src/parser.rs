//! YAML parsing with content-hash caching
//!
//! Turns source text into a validated [`ModuleDef`]. Results are cached by
//! content hash of the raw text rather than by path, so byte-identical
//! files reached through different specifiers are validated once.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::ast::{self, ModuleDef};
use crate::error::{Result, TascError};
use crate::hash;

/// A parsed module plus the content hash of its source text.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub module: Arc<ModuleDef>,
    pub hash: u64,
}

/// Module parser with per-run caching.
#[derive(Debug, Default)]
pub struct Parser {
    cache: Mutex<HashMap<u64, Arc<ModuleDef>>>,
    validations: AtomicUsize,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of full parse+validate passes performed. Cache hits do not
    /// increase this.
    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    /// Parse and validate module source text. `origin` is only used to
    /// qualify error messages.
    pub fn parse(&self, text: &str, origin: &Path) -> Result<Parsed> {
        let content_hash = hash::content_hash(text.as_bytes());
        if let Some(hit) = self.cache.lock().unwrap().get(&content_hash) {
            tracing::debug!(path = %origin.display(), "parser cache hit");
            return Ok(Parsed {
                module: hit.clone(),
                hash: content_hash,
            });
        }

        let value: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| TascError::YamlParse {
                path: origin.to_path_buf(),
                source: e,
            })?;
        let module = Arc::new(ast::validate_module(&value, origin)?);
        self.validations.fetch_add(1, Ordering::SeqCst);

        self.cache
            .lock()
            .unwrap()
            .insert(content_hash, module.clone());
        Ok(Parsed {
            module,
            hash: content_hash,
        })
    }
}
