//! Shell script emission
//!
//! Turns a [`RenderResult`] into the final script: strict-mode preamble,
//! one function per dependency then per main task (each preceded by a
//! body-hash stamp comment), a help listing of main task names, and a
//! dispatcher mapping the first CLI argument to a main task function.
//! Identical render results always produce byte-identical text.

use crate::hash;
use crate::render::{RenderResult, RenderedTask};

/// An emitted script plus the number of task functions it defines.
#[derive(Debug, Clone)]
pub struct Script {
    pub text: String,
    pub count: usize,
}

const PREAMBLE: &str = "#!/usr/bin/env bash\n\
# Generated by tasc. Do not edit.\n\
set -euo pipefail\n";

/// Emit the final script text.
pub fn emit(result: &RenderResult) -> Script {
    let mut text = String::from(PREAMBLE);
    let mut count = 0;

    for task in &result.deps {
        emit_function(&mut text, task);
        count += 1;
    }
    for task in &result.main {
        emit_function(&mut text, task);
        count += 1;
    }

    emit_help(&mut text, &result.main);
    emit_dispatcher(&mut text, &result.main);

    Script { text, count }
}

fn emit_function(out: &mut String, task: &RenderedTask) {
    out.push('\n');
    out.push_str(&format!("# tasc:{}\n", hash::hex16(task.hash)));
    out.push_str(&format!("{}() {{\n", task.qualified_name));
    if task.body.is_empty() {
        out.push_str("  :\n");
    } else {
        for line in task.body.lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("  {line}\n"));
            }
        }
    }
    out.push_str("}\n");
}

fn emit_help(out: &mut String, mains: &[RenderedTask]) {
    out.push_str("\n_tasc_help() {\n");
    out.push_str("  echo 'Available tasks:'\n");
    let width = mains
        .iter()
        .map(|t| t.qualified_name.len())
        .max()
        .unwrap_or(0);
    for task in mains {
        let line = format!(
            "  {:<width$}  {}",
            task.qualified_name,
            task.desc.as_deref().unwrap_or(""),
        );
        out.push_str(&format!("  echo '{}'\n", single_quote(line.trim_end())));
    }
    out.push_str("}\n");
}

fn emit_dispatcher(out: &mut String, mains: &[RenderedTask]) {
    out.push_str("\ncase \"${1:-}\" in\n");
    out.push_str("  \"\"|-h|--help|help)\n    _tasc_help\n    ;;\n");
    for task in mains {
        out.push_str(&format!(
            "  {name})\n    shift\n    {name} \"$@\"\n    ;;\n",
            name = task.qualified_name
        ));
    }
    out.push_str("  *)\n    echo \"Unknown task: $1\" >&2\n    exit 2\n    ;;\nesac\n");
}

/// Escape text for inclusion inside a single-quoted shell string.
fn single_quote(text: &str) -> String {
    text.replace('\'', "'\\''")
}
