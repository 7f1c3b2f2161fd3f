//! Module source loading
//!
//! Resolves a module specifier (built-in name, absolute path, or relative
//! path with optional extension probing) to a canonical source path, and
//! loads source text with a per-run cache so repeat loads of the same file
//! are a cache hit. Built-in specifiers are their own canonical path and are
//! never handed to the filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::builtins;
use crate::error::{Result, TascError};

/// Recognized module file extensions, in probe order.
const EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Module text loader with per-run caching.
#[derive(Debug, Default)]
pub struct Loader {
    cache: Mutex<HashMap<PathBuf, Arc<String>>>,
    fs_reads: AtomicUsize,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of filesystem reads performed so far. Repeat loads of a
    /// cached path do not increase this.
    pub fn fs_reads(&self) -> usize {
        self.fs_reads.load(Ordering::SeqCst)
    }

    /// Resolve a specifier to a canonical source path.
    ///
    /// Resolution order: built-in name, absolute path, relative path with a
    /// recognized extension, then the extensionless probe sequence
    /// `<p>.yaml`, `<p>.yml`, `<p>/index.yaml`, `<p>/index.yml`. Relative
    /// paths resolve against the parent module's directory, or the working
    /// directory for the entry module. Symlinks are followed.
    pub async fn resolve(&self, specifier: &str, parent: Option<&Path>) -> Result<PathBuf> {
        if builtins::lookup(specifier).is_some() {
            return Ok(PathBuf::from(specifier));
        }

        let expanded = shellexpand::tilde(specifier);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            return match tokio::fs::canonicalize(path).await {
                Ok(canonical) => Ok(canonical),
                Err(_) => Err(self.not_found(specifier, parent)),
            };
        }

        let base = match parent {
            Some(p) => p
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            None => PathBuf::from("."),
        };

        let recognized_ext = path
            .extension()
            .map(|ext| EXTENSIONS.iter().any(|e| ext == *e))
            .unwrap_or(false);

        let candidates: Vec<PathBuf> = if recognized_ext {
            vec![base.join(path)]
        } else {
            let raw = path.to_string_lossy();
            vec![
                base.join(format!("{raw}.yaml")),
                base.join(format!("{raw}.yml")),
                base.join(raw.as_ref()).join("index.yaml"),
                base.join(raw.as_ref()).join("index.yml"),
            ]
        };

        for candidate in &candidates {
            if let Ok(canonical) = tokio::fs::canonicalize(candidate).await {
                tracing::debug!(specifier, path = %canonical.display(), "resolved module");
                return Ok(canonical);
            }
        }

        Err(self.not_found(specifier, parent))
    }

    /// Load source text for a canonical path.
    pub async fn load(&self, canonical: &Path) -> Result<Arc<String>> {
        if let Some(hit) = self.cache.lock().unwrap().get(canonical) {
            tracing::debug!(path = %canonical.display(), "loader cache hit");
            return Ok(hit.clone());
        }

        let text = match builtins::lookup(&canonical.to_string_lossy()) {
            Some(embedded) => embedded.to_string(),
            None => {
                self.fs_reads.fetch_add(1, Ordering::SeqCst);
                tokio::fs::read_to_string(canonical)
                    .await
                    .map_err(|e| TascError::ModuleRead {
                        specifier: canonical.display().to_string(),
                        source: e,
                    })?
            }
        };

        let text = Arc::new(text);
        self.cache
            .lock()
            .unwrap()
            .insert(canonical.to_path_buf(), text.clone());
        Ok(text)
    }

    fn not_found(&self, specifier: &str, parent: Option<&Path>) -> TascError {
        TascError::ModuleNotFound {
            specifier: specifier.to_string(),
            origin: parent
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the working directory".to_string()),
        }
    }
}
