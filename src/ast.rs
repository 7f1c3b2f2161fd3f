//! Module/Task/Variable schema and AST
//!
//! Raw YAML is deserialized to a generic `serde_yaml::Value` tree and then
//! validated into the typed AST below. Validation fails closed: unknown
//! keys, malformed shapes, and bad `name[feature]` key grammar all surface
//! as schema violations carrying a path-qualified description.
//!
//! Declaration order is semantic (feature tie-breaks, main-task ordering),
//! so keyed collections are kept as ordered `Vec<Keyed<_>>` rather than
//! maps until feature selection resolves them.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use crate::error::{Result, TascError};
use crate::template::{self, CompiledTemplate};

/// Key grammar: an identifier, optionally suffixed with `[feature]`.
static KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_-]*)(?:\[([A-Za-z_][A-Za-z0-9_-]*)\])?$").unwrap()
});

/// A definition keyed by name with an optional feature-flag guard.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyed<T> {
    pub name: String,
    pub feature: Option<String>,
    pub value: T,
}

/// Scalar variable values.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => write!(f, "{s}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A raw variable definition. Map keys may still carry `[feature]`
/// suffixes; selection resolves them into [`VarValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum VarDef {
    Scalar(Scalar),
    Seq(Vec<VarDef>),
    Map(Vec<Keyed<VarDef>>),
}

/// A feature-resolved variable value. No `[feature]` suffix survives here.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Scalar(Scalar),
    Seq(Vec<VarValue>),
    Map(IndexMap<String, VarValue>),
}

/// A raw task definition.
#[derive(Debug, Clone)]
pub struct TaskDef {
    /// Command template. A task without one is inert.
    pub cmd: Option<Arc<CompiledTemplate>>,
    /// Alias of another task. Accepted and carried, reserved for future use.
    pub uses: Option<String>,
    pub desc: Option<String>,
    pub vars: Vec<Keyed<VarDef>>,
}

/// A raw module definition.
#[derive(Debug, Clone, Default)]
pub struct ModuleDef {
    /// `uses` / `uses[feature]` entries, in declaration order.
    pub uses: Vec<Keyed<String>>,
    pub vars: Vec<Keyed<VarDef>>,
    pub tasks: Vec<Keyed<TaskDef>>,
    pub modules: Vec<Keyed<ModuleDef>>,
}

/// Parse a raw mapping key into `(name, feature)`.
pub fn parse_key(raw: &str) -> Option<(String, Option<String>)> {
    let caps = KEY_RE.captures(raw)?;
    Some((
        caps.get(1).unwrap().as_str().to_string(),
        caps.get(2).map(|m| m.as_str().to_string()),
    ))
}

fn schema_err(file: &Path, at: &str, message: impl Into<String>) -> TascError {
    TascError::Schema {
        path: file.to_path_buf(),
        at: at.to_string(),
        message: message.into(),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Validate a parsed YAML document as a module definition.
///
/// An empty document (`null`) is an empty module.
pub fn validate_module(value: &Value, file: &Path) -> Result<ModuleDef> {
    validate_module_at(value, file, "module")
}

fn validate_module_at(value: &Value, file: &Path, at: &str) -> Result<ModuleDef> {
    let mapping = match value {
        Value::Null => return Ok(ModuleDef::default()),
        Value::Mapping(m) => m,
        other => {
            return Err(schema_err(
                file,
                at,
                format!("expected a mapping, found {}", kind_name(other)),
            ));
        }
    };

    let mut module = ModuleDef::default();
    for (key, value) in mapping {
        let raw = key_str(key, file, at)?;
        let Some((name, feature)) = parse_key(raw) else {
            return Err(schema_err(file, at, format!("invalid key '{raw}'")));
        };

        match name.as_str() {
            "uses" => {
                let target = match value {
                    Value::String(s) if !s.is_empty() => s.clone(),
                    other => {
                        return Err(schema_err(
                            file,
                            &format!("{at}.{raw}"),
                            format!("expected a module specifier string, found {}", kind_name(other)),
                        ));
                    }
                };
                module.uses.push(Keyed {
                    name: name.clone(),
                    feature,
                    value: target,
                });
            }
            "vars" => {
                reject_section_feature(&feature, file, at, raw)?;
                module.vars = validate_var_entries(value, file, &format!("{at}.vars"))?;
            }
            "tasks" => {
                reject_section_feature(&feature, file, at, raw)?;
                module.tasks = validate_task_entries(value, file, &format!("{at}.tasks"))?;
            }
            "modules" => {
                reject_section_feature(&feature, file, at, raw)?;
                let Value::Mapping(children) = value else {
                    return Err(schema_err(
                        file,
                        &format!("{at}.modules"),
                        format!("expected a mapping, found {}", kind_name(value)),
                    ));
                };
                for (child_key, child_value) in children {
                    let child_raw = key_str(child_key, file, &format!("{at}.modules"))?;
                    let Some((child_name, child_feature)) = parse_key(child_raw) else {
                        return Err(schema_err(
                            file,
                            &format!("{at}.modules"),
                            format!("invalid key '{child_raw}'"),
                        ));
                    };
                    let child_at = format!("{at}.modules.{child_name}");
                    let child = validate_module_at(child_value, file, &child_at)?;
                    module.modules.push(Keyed {
                        name: child_name,
                        feature: child_feature,
                        value: child,
                    });
                }
            }
            other => {
                return Err(schema_err(file, at, format!("unknown key '{other}'")));
            }
        }
    }

    Ok(module)
}

fn reject_section_feature(
    feature: &Option<String>,
    file: &Path,
    at: &str,
    raw: &str,
) -> Result<()> {
    if feature.is_some() {
        return Err(schema_err(
            file,
            at,
            format!("section key '{raw}' cannot carry a feature suffix"),
        ));
    }
    Ok(())
}

fn key_str<'a>(key: &'a Value, file: &Path, at: &str) -> Result<&'a str> {
    match key {
        Value::String(s) => Ok(s),
        other => Err(schema_err(
            file,
            at,
            format!("expected a string key, found {}", kind_name(other)),
        )),
    }
}

fn validate_var_entries(value: &Value, file: &Path, at: &str) -> Result<Vec<Keyed<VarDef>>> {
    let Value::Mapping(mapping) = value else {
        return Err(schema_err(
            file,
            at,
            format!("expected a mapping, found {}", kind_name(value)),
        ));
    };

    let mut entries = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let raw = key_str(key, file, at)?;
        let Some((name, feature)) = parse_key(raw) else {
            return Err(schema_err(file, at, format!("invalid key '{raw}'")));
        };
        let var = validate_var(value, file, &format!("{at}.{name}"))?;
        entries.push(Keyed {
            name,
            feature,
            value: var,
        });
    }
    Ok(entries)
}

fn validate_var(value: &Value, file: &Path, at: &str) -> Result<VarDef> {
    match value {
        Value::String(s) => Ok(VarDef::Scalar(Scalar::Str(s.clone()))),
        Value::Bool(b) => Ok(VarDef::Scalar(Scalar::Bool(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(VarDef::Scalar(Scalar::Int(i)))
            } else if let Some(x) = n.as_f64() {
                Ok(VarDef::Scalar(Scalar::Float(x)))
            } else {
                Err(schema_err(file, at, format!("unrepresentable number {n}")))
            }
        }
        Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(validate_var(item, file, &format!("{at}.{i}"))?);
            }
            Ok(VarDef::Seq(out))
        }
        Value::Mapping(_) => Ok(VarDef::Map(validate_var_entries(value, file, at)?)),
        other => Err(schema_err(
            file,
            at,
            format!(
                "expected a scalar, sequence, or mapping, found {}",
                kind_name(other)
            ),
        )),
    }
}

fn validate_task_entries(value: &Value, file: &Path, at: &str) -> Result<Vec<Keyed<TaskDef>>> {
    let Value::Mapping(mapping) = value else {
        return Err(schema_err(
            file,
            at,
            format!("expected a mapping, found {}", kind_name(value)),
        ));
    };

    let mut entries = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let raw = key_str(key, file, at)?;
        let Some((name, feature)) = parse_key(raw) else {
            return Err(schema_err(file, at, format!("invalid key '{raw}'")));
        };
        let task = validate_task(value, file, &format!("{at}.{name}"))?;
        entries.push(Keyed {
            name,
            feature,
            value: task,
        });
    }
    Ok(entries)
}

fn validate_task(value: &Value, file: &Path, at: &str) -> Result<TaskDef> {
    let Value::Mapping(mapping) = value else {
        return Err(schema_err(
            file,
            at,
            format!("expected a mapping, found {}", kind_name(value)),
        ));
    };

    let mut task = TaskDef {
        cmd: None,
        uses: None,
        desc: None,
        vars: Vec::new(),
    };

    for (key, value) in mapping {
        let raw = key_str(key, file, at)?;
        match raw {
            "cmd" => {
                let Value::String(src) = value else {
                    return Err(schema_err(
                        file,
                        &format!("{at}.cmd"),
                        format!("expected a string, found {}", kind_name(value)),
                    ));
                };
                let compiled =
                    template::compile(src).map_err(|e| TascError::TemplateSyntax {
                        path: file.to_path_buf(),
                        at: format!("{at}.cmd"),
                        message: e.message,
                    })?;
                task.cmd = Some(Arc::new(compiled));
            }
            "uses" => {
                let Value::String(target) = value else {
                    return Err(schema_err(
                        file,
                        &format!("{at}.uses"),
                        format!("expected a task name string, found {}", kind_name(value)),
                    ));
                };
                task.uses = Some(target.clone());
            }
            "desc" => {
                let Value::String(desc) = value else {
                    return Err(schema_err(
                        file,
                        &format!("{at}.desc"),
                        format!("expected a string, found {}", kind_name(value)),
                    ));
                };
                task.desc = Some(desc.clone());
            }
            "vars" => {
                task.vars = validate_var_entries(value, file, &format!("{at}.vars"))?;
            }
            other => {
                return Err(schema_err(file, at, format!("unknown task key '{other}'")));
            }
        }
    }

    Ok(task)
}
