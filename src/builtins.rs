//! Built-in modules embedded in the binary
//!
//! A small fixed registry of helper modules addressed through the reserved
//! `tasc/` specifier namespace. Built-in specifiers act as their own
//! canonical path and never touch the filesystem.

/// Reserved specifier prefix for built-in modules.
pub const NAMESPACE: &str = "tasc/";

const LOG_MODULE: &str = r#"# Leveled logging helpers. All output goes to stderr so task stdout
# stays pipeable.
tasks:
  info:
    desc: Log an info message to stderr
    cmd: printf '\033[32m[info]\033[0m %s\n' "$*" >&2
  warn:
    desc: Log a warning to stderr
    cmd: printf '\033[33m[warn]\033[0m %s\n' "$*" >&2
  error:
    desc: Log an error to stderr
    cmd: printf '\033[31m[error]\033[0m %s\n' "$*" >&2
  debug:
    desc: Log a debug message to stderr when TASC_DEBUG is set
    cmd: '[ -z "${TASC_DEBUG:-}" ] || printf ''[debug] %s\n'' "$*" >&2'
"#;

const TIME_MODULE: &str = r#"# Step timing helpers built on date(1) epoch-second deltas.
tasks:
  start:
    desc: Mark the start of a timed step
    cmd: _tasc_step_start=$(date +%s)
  stop:
    desc: Print seconds elapsed since the last start mark
    cmd: printf 'took %ss\n' "$(( $(date +%s) - ${_tasc_step_start:-0} ))" >&2
"#;

static BUILTINS: &[(&str, &str)] = &[("tasc/log", LOG_MODULE), ("tasc/time", TIME_MODULE)];

/// Source text for a built-in specifier, if it names one.
pub fn lookup(specifier: &str) -> Option<&'static str> {
    BUILTINS
        .iter()
        .find(|(name, _)| *name == specifier)
        .map(|(_, text)| *text)
}

/// Names of all built-in modules.
pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _)| *name)
}
