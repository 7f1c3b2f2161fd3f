//! Module resolution
//!
//! The dependency-graph engine of the compiler. Given an entry specifier it
//! recursively resolves `uses` inheritance and nested `modules`, applies
//! feature-flag key selection, and produces a frozen, template-ready
//! [`ModuleTemplate`] tree.
//!
//! Resolution is memoized by content hash, so any distinct module content
//! is compiled at most once per run no matter how many specifiers reach it.
//! Cycles are caught with an in-progress set keyed by the same hash; the
//! marker is released by an RAII guard on every exit path, so an abandoned
//! or failed resolution can never wedge the guard.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::ast::{Keyed, ModuleDef, TaskDef, VarDef, VarValue};
use crate::error::{Result, TascError};
use crate::loader::Loader;
use crate::parser::Parser;
use crate::template::CompiledTemplate;

/// Maximum module nesting / inheritance depth. Exceeding it is a reported
/// error rather than a stack overflow.
pub const MAX_MODULE_DEPTH: usize = 64;

/// A fully feature-resolved task, ready for rendering.
#[derive(Debug, Clone)]
pub struct CompiledTask {
    /// Command template. `None` marks an inert task.
    pub cmd: Option<Arc<CompiledTemplate>>,
    pub vars: IndexMap<String, VarValue>,
    pub desc: Option<String>,
}

/// A resolved module: inheritance merged, features selected, nested
/// modules installed. Frozen after construction and shared via `Arc`.
#[derive(Debug, Clone)]
pub struct ModuleTemplate {
    pub vars: IndexMap<String, VarValue>,
    pub tasks: IndexMap<String, CompiledTask>,
    pub modules: IndexMap<String, Arc<ModuleTemplate>>,
    /// Base specifiers consumed via `uses`, accumulated along the chain.
    pub used: BTreeSet<String>,
    /// Resolved path of the defining source file.
    pub source_path: PathBuf,
}

impl ModuleTemplate {
    fn empty(source_path: PathBuf) -> Self {
        Self {
            vars: IndexMap::new(),
            tasks: IndexMap::new(),
            modules: IndexMap::new(),
            used: BTreeSet::new(),
            source_path,
        }
    }
}

/// The module resolver. Owns the loader/parser chain and the per-run
/// resolution caches.
pub struct Resolver {
    loader: Loader,
    parser: Parser,
    features: HashSet<String>,
    cache: Mutex<HashMap<u64, Arc<ModuleTemplate>>>,
    in_progress: Mutex<HashSet<u64>>,
}

impl Resolver {
    pub fn new(loader: Loader, parser: Parser, features: HashSet<String>) -> Self {
        Self {
            loader,
            parser,
            features,
            cache: Mutex::new(HashMap::new()),
            in_progress: Mutex::new(HashSet::new()),
        }
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// Resolve a specifier to a frozen module template.
    pub async fn resolve(
        &self,
        specifier: &str,
        parent: Option<&Path>,
    ) -> Result<Arc<ModuleTemplate>> {
        let parent = parent.map(Path::to_path_buf);
        self.resolve_at(specifier.to_string(), parent, 0).await
    }

    fn resolve_at(
        &self,
        specifier: String,
        parent: Option<PathBuf>,
        depth: usize,
    ) -> BoxFuture<'_, Result<Arc<ModuleTemplate>>> {
        Box::pin(async move {
            if depth > MAX_MODULE_DEPTH {
                return Err(TascError::ModuleDepthExceeded {
                    limit: MAX_MODULE_DEPTH,
                });
            }

            let path = self.loader.resolve(&specifier, parent.as_deref()).await?;
            let text = self.loader.load(&path).await?;
            let parsed = self.parser.parse(&text, &path)?;

            if let Some(hit) = self.cache.lock().unwrap().get(&parsed.hash) {
                tracing::debug!(specifier = %specifier, "resolver cache hit");
                return Ok(hit.clone());
            }

            let Some(_guard) = InProgressGuard::acquire(&self.in_progress, parsed.hash) else {
                return Err(TascError::CircularModule { path });
            };

            let template = self.build(&parsed.module, &path, depth).await?;
            let template = Arc::new(template);
            // Failures above return before this point: a partial template
            // is never cached.
            self.cache
                .lock()
                .unwrap()
                .insert(parsed.hash, template.clone());
            Ok(template)
        })
    }

    /// Build a template for one module definition: inheritance base first,
    /// then own keys overlaid, then nested modules installed.
    fn build<'a>(
        &'a self,
        module: &'a ModuleDef,
        path: &'a Path,
        depth: usize,
    ) -> BoxFuture<'a, Result<ModuleTemplate>> {
        Box::pin(async move {
            if depth > MAX_MODULE_DEPTH {
                return Err(TascError::ModuleDepthExceeded {
                    limit: MAX_MODULE_DEPTH,
                });
            }

            let mut template = match select_uses(&module.uses, &self.features) {
                Some(base_spec) => {
                    let base = self
                        .resolve_at(base_spec.clone(), Some(path.to_path_buf()), depth + 1)
                        .await?;
                    let mut used = base.used.clone();
                    used.insert(base_spec);
                    ModuleTemplate {
                        vars: base.vars.clone(),
                        tasks: base.tasks.clone(),
                        modules: base.modules.clone(),
                        used,
                        source_path: path.to_path_buf(),
                    }
                }
                None => ModuleTemplate::empty(path.to_path_buf()),
            };

            for (name, value) in select_vars(&module.vars, &self.features) {
                template.vars.insert(name, value);
            }

            for (name, task) in select_entries(&module.tasks, &self.features) {
                template
                    .tasks
                    .insert(name, compile_task(task, &self.features));
            }

            for (name, def) in select_entries(&module.modules, &self.features) {
                if name.contains('-') {
                    tracing::warn!(
                        module = %name,
                        "module name contains '-', which collides with shell arithmetic in generated names"
                    );
                }
                let child = self.build(def, path, depth + 1).await?;
                template.modules.insert(name, Arc::new(child));
            }

            Ok(template)
        })
    }
}

/// In-progress marker with guaranteed release, success or failure.
struct InProgressGuard<'a> {
    set: &'a Mutex<HashSet<u64>>,
    hash: u64,
}

impl<'a> InProgressGuard<'a> {
    /// `None` when the hash is already being resolved, i.e. a cycle.
    fn acquire(set: &'a Mutex<HashSet<u64>>, hash: u64) -> Option<Self> {
        if set.lock().unwrap().insert(hash) {
            Some(Self { set, hash })
        } else {
            None
        }
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.hash);
    }
}

/// Feature-key selection: plain definitions first in declaration order,
/// then enabled `[feature]` variants overlaid in declaration order (a
/// feature variant overrides the plain definition; among several enabled
/// variants the last declared wins).
fn select_entries<'a, T>(
    entries: &'a [Keyed<T>],
    features: &HashSet<String>,
) -> IndexMap<String, &'a T> {
    let mut out = IndexMap::new();
    for entry in entries.iter().filter(|e| e.feature.is_none()) {
        out.insert(entry.name.clone(), &entry.value);
    }
    for entry in entries {
        if let Some(feature) = &entry.feature {
            if features.contains(feature) {
                out.insert(entry.name.clone(), &entry.value);
            }
        }
    }
    out
}

fn select_uses(entries: &[Keyed<String>], features: &HashSet<String>) -> Option<String> {
    select_entries(entries, features)
        .get("uses")
        .map(|s| (*s).clone())
}

/// Variable selection. Like [`select_entries`], except a map-valued feature
/// variant merges onto a map-valued base instead of replacing it, and
/// nested map keys are themselves feature-selected.
fn select_vars(
    entries: &[Keyed<VarDef>],
    features: &HashSet<String>,
) -> IndexMap<String, VarValue> {
    let mut out: IndexMap<String, VarValue> = IndexMap::new();
    for entry in entries.iter().filter(|e| e.feature.is_none()) {
        out.insert(entry.name.clone(), resolve_var(&entry.value, features));
    }
    for entry in entries {
        let Some(feature) = &entry.feature else {
            continue;
        };
        if !features.contains(feature) {
            continue;
        }
        match resolve_var(&entry.value, features) {
            VarValue::Map(overlay) => {
                if let Some(VarValue::Map(base)) = out.get_mut(&entry.name) {
                    merge_map(base, overlay);
                } else {
                    out.insert(entry.name.clone(), VarValue::Map(overlay));
                }
            }
            other => {
                out.insert(entry.name.clone(), other);
            }
        }
    }
    out
}

fn merge_map(base: &mut IndexMap<String, VarValue>, overlay: IndexMap<String, VarValue>) {
    for (key, value) in overlay {
        match value {
            VarValue::Map(nested) => {
                if let Some(VarValue::Map(existing)) = base.get_mut(&key) {
                    merge_map(existing, nested);
                } else {
                    base.insert(key, VarValue::Map(nested));
                }
            }
            scalar_or_seq => {
                base.insert(key, scalar_or_seq);
            }
        }
    }
}

fn resolve_var(def: &VarDef, features: &HashSet<String>) -> VarValue {
    match def {
        VarDef::Scalar(s) => VarValue::Scalar(s.clone()),
        VarDef::Seq(items) => {
            VarValue::Seq(items.iter().map(|d| resolve_var(d, features)).collect())
        }
        VarDef::Map(entries) => VarValue::Map(select_vars(entries, features)),
    }
}

fn compile_task(task: &TaskDef, features: &HashSet<String>) -> CompiledTask {
    CompiledTask {
        cmd: task.cmd.clone(),
        vars: select_vars(&task.vars, features),
        desc: task.desc.clone(),
    }
}
