//! A small text template language compatible with the subset of Go
//! `text/template` that license notice templates use.
//!
//! ```text
//! {{range $license, $deps := .}}
//! {{$license}}
//! {{range $dep := $deps}}- {{$dep.Project.Title}} (from {{$dep.Project.URL}})
//! {{end}}{{end}}
//! ```
//!
//! Supported actions: `{{pipeline}}`, `{{range …}}`, `{{if …}}`, `{{with …}}`,
//! `{{else}}`, `{{else if …}}`, `{{end}}` and `{{/* comments */}}`. `{{-` and
//! `-}}` trim the whitespace next to the action. A pipeline is one operand
//! (`.`, `.A.B`, `$`, `$var.A`, `"text"`) or a function call (`len`, `lower`,
//! `upper`) with operand arguments, optionally followed by `| func` stages.
//!
//! Blocks nest at most [`MAX_DEPTH`] deep.

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {name}:{line}: {message}")]
    Parse {
        name: String,
        line: usize,
        message: String,
    },

    #[error("template {name}:{line}: {message}")]
    Render {
        name: String,
        line: usize,
        message: String,
    },

    #[error("could not read template {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const LEFT: &str = "{{";
const RIGHT: &str = "}}";

/// Nesting limit for `range`/`if`/`with` blocks, enforced while parsing and
/// while executing.
pub const MAX_DEPTH: usize = 100;

fn too_deep() -> String {
    format!("exceeded maximum template depth ({})", MAX_DEPTH)
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Item {
    Text(String),
    Action { body: String, line: usize },
}

/// Split the source into literal text and trimmed action bodies.
fn lex(name: &str, source: &str) -> Result<Vec<Item>, TemplateError> {
    let mut items = Vec::new();
    let mut rest = source;
    let mut line = 1;
    let mut trim_next = false;

    while let Some(start) = rest.find(LEFT) {
        let raw_text = &rest[..start];
        line += raw_text.matches('\n').count();

        let after = &rest[start + LEFT.len()..];
        let trim_left = after.starts_with('-') && after[1..].starts_with(is_space);

        let mut text = raw_text;
        if trim_next {
            text = text.trim_start_matches(is_space);
        }
        if trim_left {
            text = text.trim_end_matches(is_space);
        }
        if !text.is_empty() {
            items.push(Item::Text(text.to_string()));
        }

        let inner = if trim_left { &after[1..] } else { after };
        let (raw_body, consumed) = scan_action(inner).ok_or_else(|| TemplateError::Parse {
            name: name.to_string(),
            line,
            message: "unclosed action".to_string(),
        })?;

        let mut body = raw_body;
        trim_next = false;
        if let Some(stripped) = body.strip_suffix('-') {
            if stripped.ends_with(is_space) {
                body = stripped;
                trim_next = true;
            }
        }

        let body = body.trim();
        if body.starts_with("/*") {
            if !body.ends_with("*/") {
                return Err(TemplateError::Parse {
                    name: name.to_string(),
                    line,
                    message: "comment ends before closing delimiter".to_string(),
                });
            }
        } else {
            items.push(Item::Action {
                body: body.to_string(),
                line,
            });
        }

        line += raw_body.matches('\n').count();
        rest = &inner[consumed..];
    }

    let text = if trim_next {
        rest.trim_start_matches(is_space)
    } else {
        rest
    };
    if !text.is_empty() {
        items.push(Item::Text(text.to_string()));
    }

    Ok(items)
}

/// Find the closing delimiter of an action. Returns the body and the number of
/// bytes consumed including the delimiter.
fn scan_action(input: &str) -> Option<(&str, usize)> {
    let leading = input.len() - input.trim_start_matches(is_space).len();
    if input[leading..].starts_with("/*") {
        let close = leading + input[leading..].find("*/")? + 2;
        let end = close + input[close..].find(RIGHT)?;
        return Some((&input[..end], end + RIGHT.len()));
    }

    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if input[i..].starts_with(RIGHT) {
            return Some((&input[..i], i + RIGHT.len()));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    /// `.` followed by zero or more field names.
    Dot(Vec<String>),
    /// `$name` (or `$`) followed by zero or more field names.
    Var(String, Vec<String>),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Len,
    Lower,
    Upper,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        match name {
            "len" => Some(Func::Len),
            "lower" => Some(Func::Lower),
            "upper" => Some(Func::Upper),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Func::Len => "len",
            Func::Lower => "lower",
            Func::Upper => "upper",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Operand(Operand),
    Call(Func, Operand),
}

/// A command whose value is passed through each piped function in turn.
#[derive(Debug, Clone, PartialEq)]
struct Expr {
    head: Command,
    pipe: Vec<Func>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Output {
        expr: Expr,
        line: usize,
    },
    Range {
        key: Option<String>,
        value: Option<String>,
        expr: Expr,
        body: Vec<Node>,
        otherwise: Vec<Node>,
        line: usize,
    },
    If {
        expr: Expr,
        body: Vec<Node>,
        otherwise: Vec<Node>,
        line: usize,
    },
    With {
        expr: Expr,
        body: Vec<Node>,
        otherwise: Vec<Node>,
        line: usize,
    },
}

/// Where a list of nodes stopped.
enum Stop {
    Else(usize),
    ElseIf { line: usize, cond: String },
    End(usize),
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    name: &'a str,
    items: Vec<Item>,
    pos: usize,
    /// Variables in scope, innermost last.
    vars: Vec<String>,
    /// Blocks currently open.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, line: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::Parse {
            name: self.name.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Parse nodes until `{{else}}`, `{{end}}` or end of input.
    fn parse_nodes(&mut self) -> Result<(Vec<Node>, Option<Stop>), TemplateError> {
        let mut nodes = Vec::new();

        while self.pos < self.items.len() {
            let (body, line) = match &self.items[self.pos] {
                Item::Text(text) => {
                    nodes.push(Node::Text(text.clone()));
                    self.pos += 1;
                    continue;
                }
                Item::Action { body, line } => (body.clone(), *line),
            };
            self.pos += 1;

            let (keyword, rest) = body
                .split_once(is_space)
                .map(|(k, r)| (k, r.trim()))
                .unwrap_or((body.as_str(), ""));

            match keyword {
                "end" if rest.is_empty() => return Ok((nodes, Some(Stop::End(line)))),
                "else" if rest.is_empty() => return Ok((nodes, Some(Stop::Else(line)))),
                "else" if rest.split_once(is_space).is_some_and(|(k, _)| k == "if") => {
                    let cond = rest["if".len()..].trim().to_string();
                    return Ok((nodes, Some(Stop::ElseIf { line, cond })));
                }
                "end" | "else" => {
                    return Err(self.error(line, format!("unexpected `{}` after {}", rest, keyword)))
                }
                "range" => nodes.push(self.parse_range(rest, line)?),
                "if" | "with" => {
                    let expr = self.parse_expr(rest, line)?;
                    let (body, otherwise) = self.parse_block(keyword, line)?;
                    nodes.push(if keyword == "if" {
                        Node::If {
                            expr,
                            body,
                            otherwise,
                            line,
                        }
                    } else {
                        Node::With {
                            expr,
                            body,
                            otherwise,
                            line,
                        }
                    });
                }
                "" => return Err(self.error(line, "missing value for command")),
                _ => nodes.push(Node::Output {
                    expr: self.parse_expr(&body, line)?,
                    line,
                }),
            }
        }

        Ok((nodes, None))
    }

    fn parse_range(&mut self, rest: &str, line: usize) -> Result<Node, TemplateError> {
        let (decl, pipeline) = match rest.split_once(":=") {
            Some((decl, pipeline)) => (Some(decl), pipeline.trim()),
            None => (None, rest),
        };

        let expr = self.parse_expr(pipeline, line)?;

        let names: Vec<String> = match decl {
            Some(decl) => decl.split(',').map(|v| v.trim().to_string()).collect(),
            None => Vec::new(),
        };
        if names.len() > 2 {
            return Err(self.error(line, "too many declarations in range"));
        }
        for name in &names {
            if !is_variable_name(name) || name == "$" {
                return Err(self.error(line, format!("invalid variable `{}` in range", name)));
            }
        }
        let (key, value) = match names.as_slice() {
            [value] => (None, Some(value.clone())),
            [key, value] => (Some(key.clone()), Some(value.clone())),
            _ => (None, None),
        };

        let scope = self.vars.len();
        self.vars.extend(names);
        let block = self.parse_block("range", line);
        self.vars.truncate(scope);
        let (body, otherwise) = block?;

        Ok(Node::Range {
            key,
            value,
            expr,
            body,
            otherwise,
            line,
        })
    }

    /// Parse a block body, an optional `{{else}}` branch and the closing `{{end}}`.
    /// `{{else if …}}` becomes an `if` nested in the else branch that shares
    /// the closing `{{end}}`.
    fn parse_block(&mut self, keyword: &str, line: usize) -> Result<(Vec<Node>, Vec<Node>), TemplateError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(line, too_deep()));
        }
        self.depth += 1;

        let (body, stop) = self.parse_nodes()?;
        let otherwise = match stop {
            Some(Stop::End(_)) => Vec::new(),
            Some(Stop::Else(_)) => match self.parse_nodes()? {
                (otherwise, Some(Stop::End(_))) => otherwise,
                (_, Some(Stop::Else(else_line) | Stop::ElseIf { line: else_line, .. })) => {
                    return Err(self.error(else_line, format!("second else in {}", keyword)))
                }
                (_, None) => return Err(self.error(line, format!("unexpected EOF: {} has no end", keyword))),
            },
            Some(Stop::ElseIf { line: else_line, cond }) => {
                let expr = self.parse_expr(&cond, else_line)?;
                let (then, rest) = self.parse_block("if", else_line)?;
                vec![Node::If {
                    expr,
                    body: then,
                    otherwise: rest,
                    line: else_line,
                }]
            }
            None => return Err(self.error(line, format!("unexpected EOF: {} has no end", keyword))),
        };

        self.depth -= 1;
        Ok((body, otherwise))
    }

    fn parse_expr(&self, source: &str, line: usize) -> Result<Expr, TemplateError> {
        let words = split_words(source).map_err(|msg| self.error(line, msg))?;
        let mut stages = words.split(|w| w == "|");
        let head = self.parse_command(stages.next().unwrap_or_default(), line)?;
        let pipe = stages
            .map(|stage| self.parse_stage(stage, line))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr { head, pipe })
    }

    fn parse_command(&self, words: &[String], line: usize) -> Result<Command, TemplateError> {
        match words {
            [] => Err(self.error(line, "missing value for command")),
            [word] if Func::lookup(word).is_none() => Ok(Command::Operand(self.parse_operand(word, line)?)),
            [func, args @ ..] => {
                if !is_identifier(func) {
                    return Err(self.error(line, format!("unexpected `{}` in command", args[0])));
                }
                let func = Func::lookup(func)
                    .ok_or_else(|| self.error(line, format!("function `{}` not defined", func)))?;
                match args {
                    [arg] => Ok(Command::Call(func, self.parse_operand(arg, line)?)),
                    _ => Err(self.error(
                        line,
                        format!("wrong number of args for {}: want 1 got {}", func.name(), args.len()),
                    )),
                }
            }
        }
    }

    /// A stage after `|`: a function name whose only argument is the piped value.
    fn parse_stage(&self, words: &[String], line: usize) -> Result<Func, TemplateError> {
        let (name, args) = words
            .split_first()
            .ok_or_else(|| self.error(line, "missing command in pipeline"))?;
        let func = match Func::lookup(name) {
            Some(func) => func,
            None if is_identifier(name) => {
                return Err(self.error(line, format!("function `{}` not defined", name)))
            }
            None => return Err(self.error(line, format!("can't pipe into `{}`", name))),
        };
        if !args.is_empty() {
            return Err(self.error(
                line,
                format!("wrong number of args for {}: want 1 got {}", func.name(), args.len() + 1),
            ));
        }
        Ok(func)
    }

    fn parse_operand(&self, word: &str, line: usize) -> Result<Operand, TemplateError> {
        if let Some(literal) = word.strip_prefix('"') {
            return unquote(literal)
                .map(Operand::Str)
                .ok_or_else(|| self.error(line, format!("malformed string {}", word)));
        }

        if let Some(path) = word.strip_prefix('.') {
            if path.is_empty() {
                return Ok(Operand::Dot(Vec::new()));
            }
            return parse_fields(path)
                .map(Operand::Dot)
                .ok_or_else(|| self.error(line, format!("bad field reference `{}`", word)));
        }

        if word.starts_with('$') {
            let (name, fields) = match word.split_once('.') {
                Some((name, path)) => (
                    name,
                    parse_fields(path)
                        .ok_or_else(|| self.error(line, format!("bad field reference `{}`", word)))?,
                ),
                None => (word, Vec::new()),
            };
            if !is_variable_name(name) {
                return Err(self.error(line, format!("bad variable name `{}`", name)));
            }
            if !self.vars.iter().any(|v| v == name) {
                return Err(self.error(line, format!("undefined variable \"{}\"", name)));
            }
            return Ok(Operand::Var(name.to_string(), fields));
        }

        Err(self.error(line, format!("unexpected `{}` in command", word)))
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn is_variable_name(s: &str) -> bool {
    match s.strip_prefix('$') {
        Some(rest) => rest.is_empty() || is_identifier(rest),
        None => false,
    }
}

fn parse_fields(path: &str) -> Option<Vec<String>> {
    path.split('.')
        .map(|f| is_identifier(f).then(|| f.to_string()))
        .collect()
}

/// Split an action body on whitespace, keeping string literals whole. A `|`
/// outside a string is always its own word.
fn split_words(source: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in source.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if is_space(c) || c == '|' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            if c == '|' {
                words.push("|".to_string());
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            current.push(c);
        }
    }

    if in_string {
        return Err("unterminated quoted string".to_string());
    }
    if !current.is_empty() {
        words.push(current);
    }
    Ok(words)
}

/// Decode the remainder of a string literal after its opening quote.
fn unquote(literal: &str) -> Option<String> {
    let inner = literal.strip_suffix('"')?;
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            _ => return None,
        }
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// A parsed template, ready to be executed against JSON-shaped data.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(name: &str, source: &str) -> Result<Self, TemplateError> {
        let mut parser = Parser {
            name,
            items: lex(name, source)?,
            pos: 0,
            vars: vec!["$".to_string()],
            depth: 0,
        };

        let (nodes, stop) = parser.parse_nodes()?;
        match stop {
            Some(Stop::End(line)) => Err(parser.error(line, "unexpected {{end}}")),
            Some(Stop::Else(line) | Stop::ElseIf { line, .. }) => Err(parser.error(line, "unexpected {{else}}")),
            None => Ok(Self {
                name: name.to_string(),
                nodes,
            }),
        }
    }

    /// Execute against `data`. Output is only returned if execution completes.
    pub fn render(&self, data: &Value) -> Result<String, TemplateError> {
        let mut out = String::new();
        let mut vars = vec![("$".to_string(), data.clone())];
        self.exec(&self.nodes, data, &mut vars, &mut out, 0)?;
        Ok(out)
    }

    fn error(&self, line: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::Render {
            name: self.name.clone(),
            line,
            message: message.into(),
        }
    }

    /// Depth of the next block, or a render error past [`MAX_DEPTH`].
    fn descend(&self, depth: usize, line: usize) -> Result<usize, TemplateError> {
        if depth >= MAX_DEPTH {
            return Err(self.error(line, too_deep()));
        }
        Ok(depth + 1)
    }

    fn exec(
        &self,
        nodes: &[Node],
        dot: &Value,
        vars: &mut Vec<(String, Value)>,
        out: &mut String,
        depth: usize,
    ) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output { expr, line } => {
                    let value = self.eval(expr, dot, vars, *line)?;
                    print_value(&value, out);
                }
                Node::If {
                    expr,
                    body,
                    otherwise,
                    line,
                } => {
                    let depth = self.descend(depth, *line)?;
                    let value = self.eval(expr, dot, vars, *line)?;
                    let branch = if is_truthy(&value) { body } else { otherwise };
                    self.exec(branch, dot, vars, out, depth)?;
                }
                Node::With {
                    expr,
                    body,
                    otherwise,
                    line,
                } => {
                    let depth = self.descend(depth, *line)?;
                    let value = self.eval(expr, dot, vars, *line)?;
                    if is_truthy(&value) {
                        self.exec(body, &value, vars, out, depth)?;
                    } else {
                        self.exec(otherwise, dot, vars, out, depth)?;
                    }
                }
                Node::Range {
                    key,
                    value,
                    expr,
                    body,
                    otherwise,
                    line,
                } => {
                    let depth = self.descend(depth, *line)?;
                    let collection = self.eval(expr, dot, vars, *line)?;
                    let entries = self.entries(&collection, *line)?;
                    if entries.is_empty() {
                        self.exec(otherwise, dot, vars, out, depth)?;
                        continue;
                    }

                    for (k, v) in entries {
                        let scope = vars.len();
                        if let Some(name) = key {
                            vars.push((name.clone(), k));
                        }
                        if let Some(name) = value {
                            vars.push((name.clone(), v.clone()));
                        }
                        let result = self.exec(body, &v, vars, out, depth);
                        vars.truncate(scope);
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Iteration entries: `(index, element)` for lists, `(key, value)` sorted by key for maps.
    fn entries(&self, value: &Value, line: usize) -> Result<Vec<(Value, Value)>, TemplateError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => Ok(items
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v.clone()))
                .collect()),
            Value::Object(map) => {
                let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
                pairs.sort_by(|a, b| a.0.cmp(b.0));
                Ok(pairs
                    .into_iter()
                    .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                    .collect())
            }
            other => Err(self.error(
                line,
                format!("range can't iterate over {}", kind(other)),
            )),
        }
    }

    fn eval(&self, expr: &Expr, dot: &Value, vars: &[(String, Value)], line: usize) -> Result<Value, TemplateError> {
        let mut value = match &expr.head {
            Command::Operand(operand) => self.eval_operand(operand, dot, vars, line)?,
            Command::Call(func, arg) => {
                let arg = self.eval_operand(arg, dot, vars, line)?;
                self.call(*func, &arg, line)?
            }
        };
        for func in &expr.pipe {
            value = self.call(*func, &value, line)?;
        }
        Ok(value)
    }

    fn eval_operand(
        &self,
        operand: &Operand,
        dot: &Value,
        vars: &[(String, Value)],
        line: usize,
    ) -> Result<Value, TemplateError> {
        match operand {
            Operand::Str(s) => Ok(Value::String(s.clone())),
            Operand::Dot(fields) => self.walk(dot, fields, line),
            Operand::Var(name, fields) => {
                let base = vars
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| self.error(line, format!("undefined variable \"{}\"", name)))?;
                self.walk(base, fields, line)
            }
        }
    }

    fn walk(&self, base: &Value, fields: &[String], line: usize) -> Result<Value, TemplateError> {
        let mut current = base;
        for field in fields {
            current = match current {
                Value::Object(map) => map
                    .get(field)
                    .ok_or_else(|| self.error(line, format!("can't evaluate field {}", field)))?,
                other => {
                    return Err(self.error(
                        line,
                        format!("can't evaluate field {} in {}", field, kind(other)),
                    ))
                }
            };
        }
        Ok(current.clone())
    }

    fn call(&self, func: Func, arg: &Value, line: usize) -> Result<Value, TemplateError> {
        match (func, arg) {
            (Func::Len, Value::String(s)) => Ok(Value::from(s.len())),
            (Func::Len, Value::Array(items)) => Ok(Value::from(items.len())),
            (Func::Len, Value::Object(map)) => Ok(Value::from(map.len())),
            (Func::Lower, Value::String(s)) => Ok(Value::String(s.to_lowercase())),
            (Func::Upper, Value::String(s)) => Ok(Value::String(s.to_uppercase())),
            (func, other) => Err(self.error(
                line,
                format!("{} of {} is not supported", func.name(), kind(other)),
            )),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn print_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("<no value>"),
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(&b.to_string()),
        Value::Number(n) => out.push_str(&n.to_string()),
        other => out.push_str(&other.to_string()),
    }
}
