//! Command-body template grammar
//!
//! Task commands are templated with two constructs:
//!
//! - `{{ path }}` expressions: a dot-separated path rooted at `vars`,
//!   `tasks`, or `modules`, optionally followed by call-style arguments
//!   (`{{ tasks.build(target="release") }}`) which turn a task reference
//!   into an inline expansion.
//! - `{% ship %}...{% endship %}` and `{% heredoc %}...{% endheredoc %}`
//!   blocks wrapping a sub-template.
//!
//! Compilation happens once per task during schema validation; the renderer
//! walks the compiled node list with an explicit lookup against the resolved
//! module tree. There is deliberately no general-purpose expression language
//! here: a path, optional string arguments, and two block directives are the
//! whole grammar.

use std::fmt;

/// A compiled command template, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, emitted verbatim.
    Text(String),
    /// `{{ path }}` or `{{ path(args) }}`.
    Expr(PathExpr),
    /// `{% tag %}...{% endtag %}`.
    Block(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    /// Explicit heredoc delimiter, when overridden by the author.
    pub arg: Option<String>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Prepend `declare -f` shims for dependencies first referenced inside
    /// the block, so the block's text can run in a freshly spawned shell.
    Ship,
    /// Wrap the rendered block in a content-hash-delimited heredoc.
    Heredoc,
}

impl BlockKind {
    fn tag(self) -> &'static str {
        match self {
            BlockKind::Ship => "ship",
            BlockKind::Heredoc => "heredoc",
        }
    }
}

/// A typed template path: `vars.greeting`, `tasks.build`,
/// `modules.web.tasks.deploy`. `args` is `Some` when the expression used
/// call syntax, which selects inline expansion for task paths.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub segments: Vec<String>,
    pub args: Option<Vec<(String, String)>>,
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Template compilation failure; the parser layer wraps this with the
/// source file and YAML path context.
#[derive(Debug, Clone)]
pub struct TemplateError {
    pub message: String,
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TemplateError {}

fn err<T>(message: impl Into<String>) -> Result<T, TemplateError> {
    Err(TemplateError {
        message: message.into(),
    })
}

/// Compile template source into a node list.
pub fn compile(source: &str) -> Result<CompiledTemplate, TemplateError> {
    let mut stack: Vec<(BlockKind, Option<String>, Vec<Node>)> = Vec::new();
    let mut current: Vec<Node> = Vec::new();
    let mut rest = source;

    loop {
        let expr_at = rest.find("{{");
        let tag_at = rest.find("{%");

        let (at, is_expr) = match (expr_at, tag_at) {
            (None, None) => break,
            (Some(e), None) => (e, true),
            (None, Some(t)) => (t, false),
            (Some(e), Some(t)) => {
                if e < t {
                    (e, true)
                } else {
                    (t, false)
                }
            }
        };

        if at > 0 {
            current.push(Node::Text(rest[..at].to_string()));
        }
        rest = &rest[at + 2..];

        if is_expr {
            let Some(end) = rest.find("}}") else {
                return err("unclosed '{{' expression");
            };
            let expr = parse_expr(rest[..end].trim())?;
            current.push(Node::Expr(expr));
            rest = &rest[end + 2..];
        } else {
            let Some(end) = rest.find("%}") else {
                return err("unclosed '{%' directive");
            };
            let tag = rest[..end].trim();
            rest = &rest[end + 2..];

            match parse_tag(tag)? {
                Tag::Open(kind, arg) => {
                    stack.push((kind, arg, std::mem::take(&mut current)));
                }
                Tag::Close(kind) => {
                    let Some((open_kind, arg, parent)) = stack.pop() else {
                        return err(format!(
                            "'{{% end{} %}}' without matching '{{% {} %}}'",
                            kind.tag(),
                            kind.tag()
                        ));
                    };
                    if open_kind != kind {
                        return err(format!(
                            "'{{% end{} %}}' closes '{{% {} %}}'",
                            kind.tag(),
                            open_kind.tag()
                        ));
                    }
                    let body = std::mem::replace(&mut current, parent);
                    current.push(Node::Block(Block {
                        kind,
                        arg,
                        body,
                    }));
                }
            }
        }
    }

    if let Some((kind, _, _)) = stack.pop() {
        return err(format!("unclosed '{{% {} %}}' block", kind.tag()));
    }
    if !rest.is_empty() {
        current.push(Node::Text(rest.to_string()));
    }

    Ok(CompiledTemplate { nodes: current })
}

enum Tag {
    Open(BlockKind, Option<String>),
    Close(BlockKind),
}

fn parse_tag(tag: &str) -> Result<Tag, TemplateError> {
    let (name, remainder) = match tag.find(char::is_whitespace) {
        Some(i) => (&tag[..i], tag[i..].trim()),
        None => (tag, ""),
    };

    match name {
        "ship" => {
            if !remainder.is_empty() {
                return err("'{% ship %}' takes no arguments");
            }
            Ok(Tag::Open(BlockKind::Ship, None))
        }
        "heredoc" => {
            let arg = if remainder.is_empty() {
                None
            } else {
                Some(parse_quoted(remainder)?)
            };
            Ok(Tag::Open(BlockKind::Heredoc, arg))
        }
        "endship" => Ok(Tag::Close(BlockKind::Ship)),
        "endheredoc" => Ok(Tag::Close(BlockKind::Heredoc)),
        "" => err("empty '{%' directive"),
        other => err(format!("unknown directive '{other}'")),
    }
}

/// A quoted heredoc delimiter override: `"EOT"`.
fn parse_quoted(s: &str) -> Result<String, TemplateError> {
    let inner = s
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .ok_or_else(|| TemplateError {
            message: format!("expected a quoted delimiter, found '{s}'"),
        })?;
    if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return err(format!("invalid heredoc delimiter '{inner}'"));
    }
    Ok(inner.to_string())
}

fn parse_expr(inner: &str) -> Result<PathExpr, TemplateError> {
    if inner.is_empty() {
        return err("empty '{{ }}' expression");
    }

    let (path_part, args) = match inner.find('(') {
        Some(open) => {
            if !inner.ends_with(')') {
                return err(format!("unclosed argument list in '{inner}'"));
            }
            let args = parse_args(&inner[open + 1..inner.len() - 1])?;
            (inner[..open].trim_end(), Some(args))
        }
        None => (inner, None),
    };

    let segments: Vec<String> = path_part.split('.').map(str::to_string).collect();
    for segment in &segments {
        if !is_ident(segment) && !segment.chars().all(|c| c.is_ascii_digit()) {
            return err(format!("invalid path segment '{segment}' in '{path_part}'"));
        }
    }

    match segments.first().map(String::as_str) {
        Some("vars") => {
            if args.is_some() {
                return err(format!("variable reference '{path_part}' cannot take arguments"));
            }
        }
        Some("tasks") | Some("modules") => {}
        _ => {
            return err(format!(
                "template path '{path_part}' must start with 'vars', 'tasks', or 'modules'"
            ));
        }
    }
    if segments.len() < 2 {
        return err(format!("incomplete template path '{path_part}'"));
    }

    Ok(PathExpr { segments, args })
}

fn parse_args(inner: &str) -> Result<Vec<(String, String)>, TemplateError> {
    let mut args = Vec::new();
    let mut chars = inner.char_indices().peekable();

    loop {
        // skip leading whitespace and separators
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let Some(&(start, _)) = chars.peek() else {
            break;
        };

        let mut end = start;
        while matches!(chars.peek(), Some((_, c)) if *c == '_' || *c == '-' || c.is_ascii_alphanumeric())
        {
            let (i, c) = chars.next().unwrap();
            end = i + c.len_utf8();
        }
        let name = &inner[start..end];
        if !is_ident(name) {
            return err(format!("invalid argument name '{name}'"));
        }

        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some((_, '=')) => {}
            _ => return err(format!("expected '=' after argument '{name}'")),
        }
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some((_, '"')) => {}
            _ => return err(format!("expected a quoted value for argument '{name}'")),
        }

        let mut value = String::new();
        loop {
            match chars.next() {
                Some((_, '"')) => break,
                Some((_, '\\')) => match chars.next() {
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, c)) => {
                        return err(format!("unknown escape '\\{c}' in argument '{name}'"));
                    }
                    None => return err(format!("unterminated value for argument '{name}'")),
                },
                Some((_, c)) => value.push(c),
                None => return err(format!("unterminated value for argument '{name}'")),
            }
        }

        args.push((name.to_string(), value));
    }

    Ok(args)
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
