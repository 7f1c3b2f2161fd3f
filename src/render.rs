//! Task rendering
//!
//! Walks the resolved module tree and renders every task's command template
//! under its variable scope. Tasks are visited in a stable order (the root
//! template's own tasks first, then nested modules' tasks depth-first, in
//! declaration order) and become "main" tasks; tasks reached only through
//! references become deduplicated "dependency" tasks in first-discovered
//! order. A task already emitted as a dependency by the time the traversal
//! reaches it is not re-emitted as a main.
//!
//! All rendering state lives in an explicit [`Renderer`] context: the set
//! of completed mains, the dependency discovery order, and an in-progress
//! set that turns reference cycles into reported errors instead of
//! unbounded recursion.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::ast::{Scalar, VarValue};
use crate::error::{Result, TascError};
use crate::hash;
use crate::resolver::{CompiledTask, ModuleTemplate};
use crate::template::{Block, BlockKind, Node, PathExpr};

/// Maximum depth of recursive task rendering (references and inlines).
pub const MAX_RENDER_DEPTH: usize = 64;

/// Separator joining a module-nesting path into a qualified task name.
pub const QUALIFIER: &str = ":";

/// A fully rendered task.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RenderedTask {
    #[serde(rename = "name")]
    pub qualified_name: String,
    #[serde(skip)]
    pub body: String,
    #[serde(skip)]
    pub hash: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// Output of rendering a module tree.
#[derive(Debug, Clone, Default)]
pub struct RenderResult {
    /// Traversal-ordered main tasks.
    pub main: Vec<RenderedTask>,
    /// Referenced tasks in first-discovered order, each exactly once.
    pub deps: Vec<RenderedTask>,
}

/// Join a module path and task name into a qualified call name.
pub fn qualify(module_path: &[String], task: &str) -> String {
    if module_path.is_empty() {
        task.to_string()
    } else {
        format!("{}{}{}", module_path.join(QUALIFIER), QUALIFIER, task)
    }
}

/// Render every task reachable from the root template.
pub fn render_all(root: &ModuleTemplate) -> Result<RenderResult> {
    let mut candidates = Vec::new();
    collect_tasks(root, &mut Vec::new(), &mut candidates);

    let mut renderer = Renderer {
        root,
        mains: HashSet::new(),
        dep_order: Vec::new(),
        dep_tasks: HashMap::new(),
        in_progress: HashSet::new(),
    };

    let mut main = Vec::new();
    for (module_path, name) in &candidates {
        let qualified = qualify(module_path, name);
        if renderer.dep_tasks.contains_key(&qualified) {
            // Already emitted as a dependency of an earlier main.
            continue;
        }
        renderer.in_progress.insert(qualified.clone());
        let result = renderer.render_task(module_path, name, None, 0);
        renderer.in_progress.remove(&qualified);
        let rendered = result?;
        renderer.mains.insert(qualified);
        main.push(rendered);
    }

    let order = std::mem::take(&mut renderer.dep_order);
    let mut tasks = std::mem::take(&mut renderer.dep_tasks);
    let deps = order
        .into_iter()
        .map(|name| {
            tasks.remove(&name).ok_or_else(|| TascError::Internal {
                message: format!("dependency '{name}' was discovered but never rendered"),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RenderResult { main, deps })
}

fn collect_tasks(
    template: &ModuleTemplate,
    path: &mut Vec<String>,
    out: &mut Vec<(Vec<String>, String)>,
) {
    for (name, task) in &template.tasks {
        if task.cmd.is_some() {
            out.push((path.clone(), name.clone()));
        }
    }
    for (name, child) in &template.modules {
        path.push(name.clone());
        collect_tasks(child, path, out);
        path.pop();
    }
}

/// Variable-resolution environment for one task render: call-site
/// overrides, then task-local vars, then the enclosing module chain from
/// innermost to root. First scope defining a name wins; no cross-scope
/// merging.
struct Scope<'t> {
    overrides: Option<IndexMap<String, VarValue>>,
    task_vars: &'t IndexMap<String, VarValue>,
    chain: Vec<&'t ModuleTemplate>,
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> Option<&VarValue> {
        if let Some(value) = self.overrides.as_ref().and_then(|o| o.get(name)) {
            return Some(value);
        }
        if let Some(value) = self.task_vars.get(name) {
            return Some(value);
        }
        self.chain.iter().find_map(|module| module.vars.get(name))
    }
}

struct Renderer<'t> {
    root: &'t ModuleTemplate,
    /// Qualified names of completed main tasks.
    mains: HashSet<String>,
    /// Dependency qualified names in discovery order.
    dep_order: Vec<String>,
    dep_tasks: HashMap<String, RenderedTask>,
    /// Tasks currently being rendered, mains included.
    in_progress: HashSet<String>,
}

impl<'t> Renderer<'t> {
    fn render_task(
        &mut self,
        module_path: &[String],
        name: &str,
        overrides: Option<IndexMap<String, VarValue>>,
        depth: usize,
    ) -> Result<RenderedTask> {
        let qualified = qualify(module_path, name);
        if depth > MAX_RENDER_DEPTH {
            return Err(TascError::RenderDepthExceeded {
                task: qualified,
                limit: MAX_RENDER_DEPTH,
            });
        }

        let chain = self.module_chain(module_path)?;
        let task = chain[0]
            .tasks
            .get(name)
            .ok_or_else(|| TascError::Internal {
                message: format!("task '{qualified}' vanished during rendering"),
            })?;
        let Some(cmd) = task.cmd.clone() else {
            return Err(TascError::Render {
                task: qualified,
                message: "task has no command".into(),
            });
        };

        let scope = Scope {
            overrides,
            task_vars: &task.vars,
            chain,
        };

        let mut body = String::new();
        self.render_nodes(&cmd.nodes, &scope, module_path, &qualified, &mut body, depth)?;

        Ok(RenderedTask {
            hash: hash::content_hash(body.as_bytes()),
            qualified_name: qualified,
            body,
            desc: task.desc.clone(),
        })
    }

    fn render_nodes(
        &mut self,
        nodes: &[Node],
        scope: &Scope<'t>,
        module_path: &[String],
        current: &str,
        out: &mut String,
        depth: usize,
    ) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Expr(expr) => {
                    self.render_expr(expr, scope, module_path, current, out, depth)?;
                }
                Node::Block(block) => {
                    self.render_block(block, scope, module_path, current, out, depth)?;
                }
            }
        }
        Ok(())
    }

    fn render_expr(
        &mut self,
        expr: &PathExpr,
        scope: &Scope<'t>,
        module_path: &[String],
        current: &str,
        out: &mut String,
        depth: usize,
    ) -> Result<()> {
        if expr.segments[0] == "vars" {
            out.push_str(&render_var(expr, scope, current)?);
            return Ok(());
        }

        let current_module = self.module_chain(module_path)?[0];
        let (target_path, target_name) = locate(current_module, module_path, &expr.segments)
            .or_else(|| locate(self.root, &[], &expr.segments))
            .ok_or_else(|| TascError::Render {
                task: current.to_string(),
                message: format!("cannot resolve task reference '{expr}'"),
            })?;
        let qualified = qualify(&target_path, &target_name);

        let target = self.module_chain(&target_path)?[0]
            .tasks
            .get(&target_name)
            .ok_or_else(|| TascError::Internal {
                message: format!("task '{qualified}' vanished during rendering"),
            })?;
        if target.cmd.is_none() {
            return Err(TascError::Render {
                task: current.to_string(),
                message: format!("referenced task '{qualified}' has no command"),
            });
        }

        match &expr.args {
            // Inline: expand the target's template at the call site with
            // the supplied overrides. No dependency edge, no caching.
            Some(args) => {
                if self.in_progress.contains(&qualified) {
                    return Err(TascError::CircularTask { name: qualified });
                }
                let overrides: IndexMap<String, VarValue> = args
                    .iter()
                    .map(|(k, v)| (k.clone(), VarValue::Scalar(Scalar::Str(v.clone()))))
                    .collect();
                self.in_progress.insert(qualified.clone());
                let result =
                    self.render_task(&target_path, &target_name, Some(overrides), depth + 1);
                self.in_progress.remove(&qualified);
                out.push_str(&result?.body);
            }
            // Reference: emit the call name; render the target once as a
            // dependency unless it is a completed main or already known.
            None => {
                if !self.mains.contains(&qualified) && !self.dep_tasks.contains_key(&qualified) {
                    if self.in_progress.contains(&qualified) {
                        return Err(TascError::CircularTask { name: qualified });
                    }
                    self.dep_order.push(qualified.clone());
                    self.in_progress.insert(qualified.clone());
                    let result = self.render_task(&target_path, &target_name, None, depth + 1);
                    self.in_progress.remove(&qualified);
                    self.dep_tasks.insert(qualified.clone(), result?);
                }
                out.push_str(&qualified);
            }
        }

        Ok(())
    }

    fn render_block(
        &mut self,
        block: &Block,
        scope: &Scope<'t>,
        module_path: &[String],
        current: &str,
        out: &mut String,
        depth: usize,
    ) -> Result<()> {
        match block.kind {
            BlockKind::Ship => {
                let snapshot = self.dep_order.len();
                let mut inner = String::new();
                self.render_nodes(&block.body, scope, module_path, current, &mut inner, depth)?;
                // Dependencies first referenced inside this block must be
                // defined in the fresh shell the block's text is shipped to.
                let new_deps = &self.dep_order[snapshot..];
                if !new_deps.is_empty() {
                    out.push_str(&format!("$(declare -f {}); ", new_deps.join(" ")));
                }
                out.push_str(&inner);
            }
            BlockKind::Heredoc => {
                let mut inner = String::new();
                self.render_nodes(&block.body, scope, module_path, current, &mut inner, depth)?;
                let delimiter = block
                    .arg
                    .clone()
                    .unwrap_or_else(|| hash::heredoc_delimiter(&inner));
                out.push_str(&format!("<<'{delimiter}'\n{inner}\n{delimiter}"));
            }
        }
        Ok(())
    }

    /// Module chain at `module_path`, innermost first, root last.
    fn module_chain(&self, module_path: &[String]) -> Result<Vec<&'t ModuleTemplate>> {
        let mut chain = vec![self.root];
        let mut current = self.root;
        for segment in module_path {
            current = current
                .modules
                .get(segment)
                .map(|m| m.as_ref())
                .ok_or_else(|| TascError::Internal {
                    message: format!("unknown module path '{}'", module_path.join(QUALIFIER)),
                })?;
            chain.push(current);
        }
        chain.reverse();
        Ok(chain)
    }
}

/// Follow a `(modules.NAME)* tasks.NAME` path from `start`. Returns the
/// target's module path and task name when the full path resolves.
fn locate(
    start: &ModuleTemplate,
    base_path: &[String],
    segments: &[String],
) -> Option<(Vec<String>, String)> {
    let mut current = start;
    let mut path = base_path.to_vec();
    let mut i = 0;
    while i + 1 < segments.len() && segments[i] == "modules" {
        current = current.modules.get(&segments[i + 1])?.as_ref();
        path.push(segments[i + 1].clone());
        i += 2;
    }
    if i + 2 == segments.len() && segments[i] == "tasks" {
        let name = &segments[i + 1];
        if current.tasks.contains_key(name) {
            return Some((path, name.clone()));
        }
    }
    None
}

fn render_var(expr: &PathExpr, scope: &Scope<'_>, current: &str) -> Result<String> {
    let render_err = |message: String| TascError::Render {
        task: current.to_string(),
        message,
    };

    let name = &expr.segments[1];
    let mut value = scope
        .lookup(name)
        .ok_or_else(|| render_err(format!("undefined variable '{expr}'")))?;

    for segment in &expr.segments[2..] {
        value = match value {
            VarValue::Map(map) => map
                .get(segment)
                .ok_or_else(|| render_err(format!("'{expr}' has no entry '{segment}'")))?,
            VarValue::Seq(items) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| render_err(format!("'{expr}': '{segment}' is not an index")))?;
                items
                    .get(index)
                    .ok_or_else(|| render_err(format!("'{expr}': index {index} out of bounds")))?
            }
            VarValue::Scalar(_) => {
                return Err(render_err(format!(
                    "'{expr}': cannot traverse into a scalar at '{segment}'"
                )));
            }
        };
    }

    match value {
        VarValue::Scalar(s) => Ok(s.to_string()),
        _ => Err(render_err(format!("variable '{expr}' is not a scalar"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn task(cmd: &str) -> CompiledTask {
        task_with_vars(cmd, &[])
    }

    fn task_with_vars(cmd: &str, vars: &[(&str, &str)]) -> CompiledTask {
        CompiledTask {
            cmd: Some(Arc::new(template::compile(cmd).unwrap())),
            vars: vars
                .iter()
                .map(|(k, v)| (k.to_string(), VarValue::Scalar(Scalar::Str(v.to_string()))))
                .collect(),
            desc: None,
        }
    }

    fn module(vars: &[(&str, &str)], tasks: Vec<(&str, CompiledTask)>) -> ModuleTemplate {
        ModuleTemplate {
            vars: vars
                .iter()
                .map(|(k, v)| (k.to_string(), VarValue::Scalar(Scalar::Str(v.to_string()))))
                .collect(),
            tasks: tasks
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            modules: indexmap::IndexMap::new(),
            used: Default::default(),
            source_path: PathBuf::from("memory.yaml"),
        }
    }

    fn with_child(mut parent: ModuleTemplate, name: &str, child: ModuleTemplate) -> ModuleTemplate {
        parent.modules.insert(name.to_string(), Arc::new(child));
        parent
    }

    #[test]
    fn test_greet() {
        let root = module(
            &[("greeting", "Hello")],
            vec![("greet", task("echo {{ vars.greeting }}"))],
        );
        let result = render_all(&root).unwrap();
        assert_eq!(result.main.len(), 1);
        assert_eq!(result.main[0].qualified_name, "greet");
        assert_eq!(result.main[0].body, "echo Hello");
        assert!(result.deps.is_empty());
    }

    #[test]
    fn test_task_local_var_shadows_module_var() {
        let root = module(
            &[("name", "module")],
            vec![(
                "show",
                task_with_vars("echo {{ vars.name }}", &[("name", "task")]),
            )],
        );
        let result = render_all(&root).unwrap();
        assert_eq!(result.main[0].body, "echo task");
    }

    #[test]
    fn test_reference_renders_dependency_once() {
        let root = module(
            &[],
            vec![
                ("main", task("{{ tasks.helper }} now")),
                ("helper", task("echo hi")),
            ],
        );
        let result = render_all(&root).unwrap();

        // helper was consumed as a dependency before the traversal
        // reached it, so it is not a main.
        assert_eq!(result.main.len(), 1);
        assert_eq!(result.main[0].body, "helper now");
        assert_eq!(result.deps.len(), 1);
        assert_eq!(result.deps[0].qualified_name, "helper");
        assert_eq!(result.deps[0].body, "echo hi");
    }

    #[test]
    fn test_reference_to_completed_main_adds_no_dep() {
        let root = module(
            &[],
            vec![
                ("helper", task("echo hi")),
                ("main", task("{{ tasks.helper }}")),
            ],
        );
        let result = render_all(&root).unwrap();

        assert_eq!(result.main.len(), 2);
        assert!(result.deps.is_empty());
        assert_eq!(result.main[1].body, "helper");
    }

    #[test]
    fn test_shared_dependency_deduplicated() {
        let root = module(
            &[],
            vec![
                ("one", task("{{ tasks.shared }}")),
                ("two", task("{{ tasks.shared }} again")),
                ("shared", task("echo shared")),
            ],
        );
        let result = render_all(&root).unwrap();

        assert_eq!(result.main.len(), 2);
        assert_eq!(result.deps.len(), 1);
        assert_eq!(result.main[0].body, "shared");
        assert_eq!(result.main[1].body, "shared again");
    }

    #[test]
    fn test_inline_independent_expansions() {
        let root = module(
            &[],
            vec![
                (
                    "first",
                    task("{{ tasks.step(mode=\"fast\") }} && {{ tasks.step() }}"),
                ),
                (
                    "step",
                    task_with_vars("run --mode={{ vars.mode }}", &[("mode", "slow")]),
                ),
            ],
        );
        let result = render_all(&root).unwrap();

        assert_eq!(
            result.main[0].body,
            "run --mode=fast && run --mode=slow"
        );
        // Inline creates no dependency; step is still its own main.
        assert!(result.deps.is_empty());
        assert_eq!(result.main.len(), 2);
    }

    #[test]
    fn test_nested_module_tasks_are_qualified() {
        let web = module(
            &[("target", "prod")],
            vec![("deploy", task("push {{ vars.target }}"))],
        );
        let root = with_child(module(&[], vec![]), "web", web);
        let result = render_all(&root).unwrap();

        assert_eq!(result.main.len(), 1);
        assert_eq!(result.main[0].qualified_name, "web:deploy");
        assert_eq!(result.main[0].body, "push prod");
    }

    #[test]
    fn test_reference_into_nested_module() {
        let web = module(&[], vec![("deploy", task("push"))]);
        let root = with_child(
            module(
                &[],
                vec![("all", task("{{ modules.web.tasks.deploy }}"))],
            ),
            "web",
            web,
        );
        let result = render_all(&root).unwrap();

        assert_eq!(result.main[0].body, "web:deploy");
        assert_eq!(result.deps.len(), 1);
        assert_eq!(result.deps[0].qualified_name, "web:deploy");
    }

    #[test]
    fn test_nested_task_sees_outer_vars() {
        let inner = module(&[], vec![("show", task("echo {{ vars.region }}"))]);
        let mut root = module(&[("region", "eu-1")], vec![]);
        root = with_child(root, "infra", inner);
        let result = render_all(&root).unwrap();
        assert_eq!(result.main[0].body, "echo eu-1");
    }

    #[test]
    fn test_var_path_traversal() {
        let mut vars = indexmap::IndexMap::new();
        vars.insert(
            "limits".to_string(),
            VarValue::Map(
                [("cpu".to_string(), VarValue::Scalar(Scalar::Int(2)))]
                    .into_iter()
                    .collect(),
            ),
        );
        vars.insert(
            "ports".to_string(),
            VarValue::Seq(vec![
                VarValue::Scalar(Scalar::Int(80)),
                VarValue::Scalar(Scalar::Int(443)),
            ]),
        );
        let root = ModuleTemplate {
            vars,
            tasks: [(
                "show".to_string(),
                task("cpu={{ vars.limits.cpu }} tls={{ vars.ports.1 }}"),
            )]
            .into_iter()
            .collect(),
            modules: indexmap::IndexMap::new(),
            used: Default::default(),
            source_path: PathBuf::from("memory.yaml"),
        };
        let result = render_all(&root).unwrap();
        assert_eq!(result.main[0].body, "cpu=2 tls=443");
    }

    #[test]
    fn test_undefined_variable_is_renderer_error() {
        let root = module(&[], vec![("bad", task("echo {{ vars.missing }}"))]);
        let err = render_all(&root).unwrap_err();
        assert_eq!(err.code(), "RENDERER_ERROR");
        assert!(err.to_string().contains("vars.missing"));
    }

    #[test]
    fn test_non_scalar_render_is_renderer_error() {
        let mut vars = indexmap::IndexMap::new();
        vars.insert(
            "limits".to_string(),
            VarValue::Map(indexmap::IndexMap::new()),
        );
        let root = ModuleTemplate {
            vars,
            tasks: [("bad".to_string(), task("echo {{ vars.limits }}"))]
                .into_iter()
                .collect(),
            modules: indexmap::IndexMap::new(),
            used: Default::default(),
            source_path: PathBuf::from("memory.yaml"),
        };
        let err = render_all(&root).unwrap_err();
        assert_eq!(err.code(), "RENDERER_ERROR");
        assert!(err.to_string().contains("not a scalar"));
    }

    #[test]
    fn test_mutual_reference_is_a_cycle() {
        let root = module(
            &[],
            vec![
                ("a", task("{{ tasks.b }}")),
                ("b", task("{{ tasks.a }}")),
            ],
        );
        let err = render_all(&root).unwrap_err();
        assert_eq!(err.code(), "RESOLVER_ERROR");
        assert!(matches!(err, TascError::CircularTask { .. }));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let root = module(&[], vec![("a", task("{{ tasks.a }}"))]);
        let err = render_all(&root).unwrap_err();
        assert!(matches!(err, TascError::CircularTask { .. }));
    }

    #[test]
    fn test_inline_cycle_is_a_cycle() {
        let root = module(
            &[],
            vec![
                ("a", task("{{ tasks.b() }}")),
                ("b", task("{{ tasks.a() }}")),
            ],
        );
        let err = render_all(&root).unwrap_err();
        assert!(matches!(err, TascError::CircularTask { .. }));
    }

    #[test]
    fn test_reference_to_inert_task_fails() {
        let mut root = module(&[], vec![("main", task("{{ tasks.stub }}"))]);
        root.tasks.insert(
            "stub".to_string(),
            CompiledTask {
                cmd: None,
                vars: indexmap::IndexMap::new(),
                desc: None,
            },
        );
        let err = render_all(&root).unwrap_err();
        assert_eq!(err.code(), "RENDERER_ERROR");
        assert!(err.to_string().contains("has no command"));
    }

    #[test]
    fn test_ship_declares_only_new_deps() {
        let root = module(
            &[],
            vec![
                (
                    "remote",
                    task(
                        "ssh h \"{% ship %}{{ tasks.helper }}{% endship %}\" && \
                         ssh h \"{% ship %}{{ tasks.helper }}{% endship %}\"",
                    ),
                ),
                ("helper", task("echo hi")),
            ],
        );
        let result = render_all(&root).unwrap();

        // First block ships the newly discovered dependency; the second
        // block sees it as already known and ships nothing.
        assert_eq!(
            result.main[0].body,
            "ssh h \"$(declare -f helper); helper\" && ssh h \"helper\""
        );
        assert_eq!(result.deps.len(), 1);
    }

    #[test]
    fn test_heredoc_delimiter_is_content_derived() {
        let root = module(
            &[("text", "payload")],
            vec![(
                "send",
                task("cat {% heredoc %}{{ vars.text }}{% endheredoc %}"),
            )],
        );
        let result = render_all(&root).unwrap();
        let delim = hash::heredoc_delimiter("payload");
        assert_eq!(
            result.main[0].body,
            format!("cat <<'{delim}'\npayload\n{delim}")
        );

        // Same input, same delimiter: render again.
        let again = render_all(&root).unwrap();
        assert_eq!(result.main[0].body, again.main[0].body);
    }

    #[test]
    fn test_heredoc_explicit_delimiter() {
        let root = module(
            &[],
            vec![(
                "send",
                task("cat {% heredoc \"EOT\" %}x{% endheredoc %}"),
            )],
        );
        let result = render_all(&root).unwrap();
        assert_eq!(result.main[0].body, "cat <<'EOT'\nx\nEOT");
    }

    #[test]
    fn test_inline_chain_depth_guard() {
        // t0 inlines t1 inlines t2 ... past the depth limit. Distinct
        // tasks, so the cycle guard stays quiet; the depth guard must
        // turn this into an error instead of a stack overflow.
        let count = MAX_RENDER_DEPTH + 3;
        let mut tasks = Vec::new();
        for i in 0..count {
            let cmd = if i + 1 < count {
                format!("{{{{ tasks.t{}() }}}}", i + 1)
            } else {
                "echo done".to_string()
            };
            tasks.push((format!("t{i}"), cmd));
        }
        let root = module(
            &[],
            tasks
                .iter()
                .map(|(name, cmd)| (name.as_str(), task(cmd)))
                .collect(),
        );

        let err = render_all(&root).unwrap_err();
        assert_eq!(err.code(), "RENDERER_ERROR");
        assert!(matches!(err, TascError::RenderDepthExceeded { .. }));
    }

    #[test]
    fn test_unresolvable_reference_is_renderer_error() {
        let root = module(&[], vec![("main", task("{{ tasks.ghost }}"))]);
        let err = render_all(&root).unwrap_err();
        assert_eq!(err.code(), "RENDERER_ERROR");
        assert!(err.to_string().contains("tasks.ghost"));
    }
}
