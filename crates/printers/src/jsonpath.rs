//! JSONPath templates in the kubectl dialect: literal text interleaved with `{...}`
//! actions, e.g. `{range .items[*]}{.metadata.name}{"\n"}{end}`.

use std::io::Write;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::{text_of, PrintError, PrinterKind, ResourcePrinter};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsonPathError {
    #[error("{0}")]
    Parse(String),
    #[error("{0} is not found")]
    NotFound(String),
    #[error("{0}")]
    Eval(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Path(Path),
    Range(Path, Vec<Node>),
}

#[derive(Debug, Clone, PartialEq)]
struct Path {
    from_root: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Field(String),
    Wildcard,
    Index(i64),
    Slice(Option<i64>, Option<i64>, Option<i64>),
    Union(Vec<Step>),
    Filter(Box<Filter>),
    Descend(Box<Step>),
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    left: Operand,
    cmp: Option<(CmpOp, Operand)>,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Path(Path),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A compiled JSONPath template.
#[derive(Debug, Clone)]
pub struct JsonPath {
    source: String,
    nodes: Vec<Node>,
    allow_missing_keys: bool,
}

impl JsonPath {
    pub fn parse(source: &str) -> Result<Self, JsonPathError> {
        Ok(Self { source: source.to_string(), nodes: parse_template(source)?, allow_missing_keys: false })
    }

    /// Missing fields yield no output instead of an error.
    pub fn allow_missing_keys(mut self, allow: bool) -> Self {
        self.allow_missing_keys = allow;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the template against `data`.
    pub fn execute(&self, data: &Value) -> Result<String, JsonPathError> {
        let mut out = String::new();
        self.walk(&self.nodes, data, data, &mut out)?;
        Ok(out)
    }

    /// Values produced by each top-level node, without rendering them.
    pub fn find_results(&self, data: &Value) -> Result<Vec<Vec<Value>>, JsonPathError> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            match node {
                Node::Text(t) => out.push(vec![Value::String(t.clone())]),
                Node::Path(p) => out.push(self.eval(p, data, data, !self.allow_missing_keys)?.into_iter().cloned().collect()),
                Node::Range(p, body) => {
                    let mut acc = Vec::new();
                    for item in self.eval(p, data, data, !self.allow_missing_keys)? {
                        let mut s = String::new();
                        self.walk(body, data, item, &mut s)?;
                        acc.push(Value::String(s));
                    }
                    out.push(acc);
                }
            }
        }
        Ok(out)
    }

    fn walk(&self, nodes: &[Node], root: &Value, cur: &Value, out: &mut String) -> Result<(), JsonPathError> {
        for node in nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Path(p) => {
                    let vals = self.eval(p, root, cur, !self.allow_missing_keys)?;
                    let parts: Vec<String> = vals.iter().map(|v| text_of(v)).collect();
                    out.push_str(&parts.join(" "));
                }
                Node::Range(p, body) => {
                    for item in self.eval(p, root, cur, !self.allow_missing_keys)? {
                        self.walk(body, root, item, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn eval<'a>(&self, path: &Path, root: &'a Value, cur: &'a Value, strict: bool) -> Result<Vec<&'a Value>, JsonPathError> {
        let mut set = vec![if path.from_root { root } else { cur }];
        for step in &path.steps {
            let mut next = Vec::new();
            for v in set {
                self.apply(step, root, v, strict, &mut next)?;
            }
            set = next;
        }
        Ok(set)
    }

    fn apply<'a>(&self, step: &Step, root: &'a Value, v: &'a Value, strict: bool, out: &mut Vec<&'a Value>) -> Result<(), JsonPathError> {
        match step {
            Step::Field(name) => match v.as_object().and_then(|m| m.get(name)) {
                Some(x) => out.push(x),
                None if strict => return Err(JsonPathError::NotFound(name.clone())),
                None => {}
            },
            Step::Wildcard => match v {
                Value::Object(m) => out.extend(m.values()),
                Value::Array(a) => out.extend(a.iter()),
                _ => {}
            },
            Step::Index(i) => {
                let Some(arr) = v.as_array() else {
                    if strict {
                        return Err(JsonPathError::NotFound(format!("[{}]", i)));
                    }
                    return Ok(());
                };
                let len = arr.len() as i64;
                let idx = if *i < 0 { len + i } else { *i };
                if idx >= 0 && idx < len {
                    out.push(&arr[idx as usize]);
                } else if strict {
                    return Err(JsonPathError::Eval(format!("array index out of bounds: index {}, length {}", i, len)));
                }
            }
            Step::Slice(start, end, step) => {
                let Some(arr) = v.as_array() else { return Ok(()) };
                let len = arr.len() as i64;
                let step = step.unwrap_or(1);
                if step <= 0 {
                    return Err(JsonPathError::Eval(format!("step must be positive, got {}", step)));
                }
                let clamp = |x: i64| if x < 0 { (len + x).max(0) } else { x.min(len) };
                let (s, e) = (clamp(start.unwrap_or(0)), clamp(end.unwrap_or(len)));
                let mut ix = s;
                while ix < e {
                    out.push(&arr[ix as usize]);
                    ix += step;
                }
            }
            Step::Union(parts) => {
                for part in parts {
                    self.apply(part, root, v, strict, out)?;
                }
            }
            Step::Filter(filter) => {
                if let Some(arr) = v.as_array() {
                    for el in arr {
                        if self.matches(filter, root, el)? {
                            out.push(el);
                        }
                    }
                }
            }
            Step::Descend(inner) => {
                let mut all = Vec::new();
                descendants(v, &mut all);
                for node in all {
                    self.apply(inner, root, node, false, out)?;
                }
            }
        }
        Ok(())
    }

    fn operand<'a>(&self, op: &'a Operand, root: &'a Value, cur: &'a Value) -> Result<Option<&'a Value>, JsonPathError> {
        match op {
            Operand::Literal(v) => Ok(Some(v)),
            Operand::Path(p) => Ok(self.eval(p, root, cur, false)?.into_iter().next()),
        }
    }

    fn matches(&self, filter: &Filter, root: &Value, el: &Value) -> Result<bool, JsonPathError> {
        let left = self.operand(&filter.left, root, el)?;
        let Some((op, right)) = &filter.cmp else {
            return Ok(left.is_some());
        };
        let right = self.operand(right, root, el)?;
        let (Some(l), Some(r)) = (left, right) else { return Ok(false) };
        Ok(compare(l, r, *op))
    }
}

fn descendants<'a>(v: &'a Value, out: &mut Vec<&'a Value>) {
    out.push(v);
    match v {
        Value::Object(m) => m.values().for_each(|c| descendants(c, out)),
        Value::Array(a) => a.iter().for_each(|c| descendants(c, out)),
        _ => {}
    }
}

fn compare(l: &Value, r: &Value, op: CmpOp) -> bool {
    use std::cmp::Ordering;
    let ord: Option<Ordering> = match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    match (op, ord) {
        (CmpOp::Eq, Some(o)) => o == Ordering::Equal,
        (CmpOp::Ne, Some(o)) => o != Ordering::Equal,
        (CmpOp::Eq, None) => l == r,
        (CmpOp::Ne, None) => l != r,
        (CmpOp::Lt, Some(o)) => o == Ordering::Less,
        (CmpOp::Le, Some(o)) => o != Ordering::Greater,
        (CmpOp::Gt, Some(o)) => o == Ordering::Greater,
        (CmpOp::Ge, Some(o)) => o != Ordering::Less,
        (_, None) => false,
    }
}

// ---------------- parsing ----------------

fn parse_template(source: &str) -> Result<Vec<Node>, JsonPathError> {
    let mut root: Vec<Node> = Vec::new();
    let mut open: Vec<(Path, Vec<Node>)> = Vec::new();
    let mut text = String::new();
    let mut rest = source;

    fn push(node: Node, root: &mut Vec<Node>, open: &mut [(Path, Vec<Node>)]) {
        match open.last_mut() {
            Some((_, body)) => body.push(node),
            None => root.push(node),
        }
    }

    while let Some(start) = rest.find('{') {
        text.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = action_end(after).ok_or_else(|| JsonPathError::Parse(format!("unclosed action in {:?}", source)))?;
        let action = after[..end].trim();
        rest = &after[end + 1..];

        if !text.is_empty() {
            push(Node::Text(std::mem::take(&mut text)), &mut root, &mut open);
        }
        if action.is_empty() {
            return Err(JsonPathError::Parse("empty action".into()));
        }
        if action == "end" {
            let (path, body) = open.pop().ok_or_else(|| JsonPathError::Parse("not in range, nothing to end".into()))?;
            push(Node::Range(path, body), &mut root, &mut open);
        } else if let Some(expr) = action.strip_prefix("range ") {
            open.push((parse_path(expr)?, Vec::new()));
        } else if action.starts_with('"') || action.starts_with('\'') {
            let (lit, consumed) = parse_quoted(action)?;
            if consumed != action.len() {
                return Err(JsonPathError::Parse(format!("unexpected text after literal in {:?}", action)));
            }
            push(Node::Text(lit), &mut root, &mut open);
        } else {
            push(Node::Path(parse_path(action)?), &mut root, &mut open);
        }
    }
    text.push_str(rest);
    if !text.is_empty() {
        push(Node::Text(text), &mut root, &mut open);
    }
    if !open.is_empty() {
        return Err(JsonPathError::Parse("unclosed range".into()));
    }
    Ok(root)
}

/// Byte offset of the `}` closing an action, skipping quoted text.
fn action_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '}' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Parse a quoted literal at the start of `s`; returns the value and bytes consumed.
fn parse_quoted(s: &str) -> Result<(String, usize), JsonPathError> {
    let mut chars = s.char_indices();
    let Some((_, q)) = chars.next() else { return Err(JsonPathError::Parse("expected quoted string".into())) };
    let mut out = String::new();
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            out.push(match c {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == q {
            return Ok((out, i + c.len_utf8()));
        } else {
            out.push(c);
        }
    }
    Err(JsonPathError::Parse(format!("unterminated quoted string {}", s)))
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                if let Some(n) = self.peek() {
                    out.push(n);
                    self.bump();
                }
                continue;
            }
            if c == '.' || c == '[' || c == ']' || c == ')' || c.is_whitespace() || "=!<>,".contains(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    /// Body of a `[...]` whose opening bracket was consumed.
    fn bracket(&mut self) -> Result<Step, JsonPathError> {
        let rest = &self.src[self.pos..];
        let mut depth = 0i32;
        let mut quote: Option<char> = None;
        let mut end = None;
        for (i, c) in rest.char_indices() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None => match c {
                    '"' | '\'' => quote = Some(c),
                    '[' | '(' => depth += 1,
                    ')' => depth -= 1,
                    ']' if depth == 0 => {
                        end = Some(i);
                        break;
                    }
                    ']' => depth -= 1,
                    _ => {}
                },
            }
        }
        let end = end.ok_or_else(|| JsonPathError::Parse(format!("unterminated [ in {:?}", self.src)))?;
        let body = rest[..end].trim().to_string();
        self.pos += end + 1;
        parse_bracket_body(&body)
    }
}

fn parse_bracket_body(body: &str) -> Result<Step, JsonPathError> {
    if let Some(filter) = body.strip_prefix('?') {
        let inner = filter
            .trim()
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| JsonPathError::Parse(format!("invalid filter [{}]", body)))?;
        return Ok(Step::Filter(Box::new(parse_filter(inner)?)));
    }
    if body == "*" {
        return Ok(Step::Wildcard);
    }
    if body.contains(',') {
        let parts = body.split(',').map(|p| parse_bracket_body(p.trim())).collect::<Result<Vec<_>, _>>()?;
        return Ok(Step::Union(parts));
    }
    if body.starts_with('\'') || body.starts_with('"') {
        let (name, _) = parse_quoted(body)?;
        return Ok(Step::Field(name));
    }
    if body.contains(':') {
        let mut bounds = body.split(':').map(|p| {
            let p = p.trim();
            if p.is_empty() {
                Ok(None)
            } else {
                p.parse::<i64>().map(Some).map_err(|_| JsonPathError::Parse(format!("invalid slice bound {:?}", p)))
            }
        });
        let start = bounds.next().transpose()?.flatten();
        let end = bounds.next().transpose()?.flatten();
        let step = bounds.next().transpose()?.flatten();
        return Ok(Step::Slice(start, end, step));
    }
    body.parse::<i64>().map(Step::Index).map_err(|_| JsonPathError::Parse(format!("invalid array index [{}]", body)))
}

fn parse_filter(inner: &str) -> Result<Filter, JsonPathError> {
    const OPS: [(&str, CmpOp); 6] = [
        ("==", CmpOp::Eq),
        ("!=", CmpOp::Ne),
        ("<=", CmpOp::Le),
        (">=", CmpOp::Ge),
        ("<", CmpOp::Lt),
        (">", CmpOp::Gt),
    ];
    let mut quote: Option<char> = None;
    for (i, c) in inner.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None => {
                for (tok, op) in OPS {
                    if inner[i..].starts_with(tok) {
                        let left = parse_operand(inner[..i].trim())?;
                        let right = parse_operand(inner[i + tok.len()..].trim())?;
                        return Ok(Filter { left, cmp: Some((op, right)) });
                    }
                }
            }
        }
    }
    Ok(Filter { left: parse_operand(inner.trim())?, cmp: None })
}

fn parse_operand(s: &str) -> Result<Operand, JsonPathError> {
    if s.starts_with('@') || s.starts_with('$') || s.starts_with('.') {
        return Ok(Operand::Path(parse_path(s)?));
    }
    if s.starts_with('"') || s.starts_with('\'') {
        return Ok(Operand::Literal(Value::String(parse_quoted(s)?.0)));
    }
    match s {
        "true" => return Ok(Operand::Literal(Value::Bool(true))),
        "false" => return Ok(Operand::Literal(Value::Bool(false))),
        "null" => return Ok(Operand::Literal(Value::Null)),
        _ => {}
    }
    serde_json::from_str::<serde_json::Number>(s)
        .map(|n| Operand::Literal(Value::Number(n)))
        .map_err(|_| JsonPathError::Parse(format!("unrecognized filter operand {:?}", s)))
}

fn parse_path(expr: &str) -> Result<Path, JsonPathError> {
    let expr = expr.trim();
    let mut cur = Cursor { src: expr, pos: 0 };
    let mut from_root = false;
    match cur.peek() {
        Some('$') => {
            cur.bump();
            from_root = true;
        }
        Some('@') => cur.bump(),
        _ => {}
    }
    let mut steps = Vec::new();
    while let Some(c) = cur.peek() {
        match c {
            '.' => {
                cur.bump();
                match cur.peek() {
                    Some('.') => {
                        cur.bump();
                        let inner = match cur.peek() {
                            Some('*') => {
                                cur.bump();
                                Step::Wildcard
                            }
                            Some('[') => {
                                cur.bump();
                                cur.bracket()?
                            }
                            _ => Step::Field(cur.ident()),
                        };
                        steps.push(Step::Descend(Box::new(inner)));
                    }
                    Some('*') => {
                        cur.bump();
                        steps.push(Step::Wildcard);
                    }
                    Some('[') | None => {}
                    Some(_) => {
                        let name = cur.ident();
                        if name.is_empty() {
                            return Err(JsonPathError::Parse(format!("unexpected character in {:?}", expr)));
                        }
                        steps.push(Step::Field(name));
                    }
                }
            }
            '[' => {
                cur.bump();
                steps.push(cur.bracket()?);
            }
            c if steps.is_empty() && !from_root && (c.is_alphanumeric() || c == '_') => {
                steps.push(Step::Field(cur.ident()));
            }
            _ => return Err(JsonPathError::Parse(format!("unrecognized character {:?} in {:?}", c, expr))),
        }
    }
    debug_assert!(cur.eof());
    Ok(Path { from_root, steps })
}

static RELAXED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\{?(\.?[^{}]+)\}?$").expect("static pattern"));

/// Accept `a.b`, `.a.b`, `{a.b}` and `{.a.b}`; return the braced, dotted form.
pub fn relaxed_expression(expr: &str) -> Result<String, JsonPathError> {
    let caps = RELAXED.captures(expr.trim()).ok_or_else(|| {
        JsonPathError::Parse(format!(
            "unexpected path string {:?}, expected a 'name1.name2' or '.name1.name2' or '{{name1.name2}}' or '{{.name1.name2}}'",
            expr
        ))
    })?;
    let inner = &caps[1];
    if inner.starts_with('.') {
        Ok(format!("{{{}}}", inner))
    } else {
        Ok(format!("{{.{}}}", inner))
    }
}

/// Prints the result of a JSONPath template per object, without a trailing newline.
pub struct JsonPathPrinter {
    path: JsonPath,
}

impl JsonPathPrinter {
    pub fn new(expr: &str, allow_missing_keys: bool) -> Result<Self, PrintError> {
        let path = JsonPath::parse(expr)
            .map_err(|e| PrintError::JsonPath { expr: expr.to_string(), reason: e.to_string() })?
            .allow_missing_keys(allow_missing_keys);
        Ok(Self { path })
    }
}

impl ResourcePrinter for JsonPathPrinter {
    fn print_obj(&mut self, obj: &Value, out: &mut dyn Write) -> Result<(), PrintError> {
        match self.path.execute(obj) {
            Ok(text) => {
                out.write_all(text.as_bytes())?;
                Ok(())
            }
            Err(e @ JsonPathError::NotFound(_)) => {
                Err(PrintError::MissingKey(format!("error executing jsonpath {:?}: {}", self.path.source(), e)))
            }
            Err(e) => Err(PrintError::Render(format!("error executing jsonpath {:?}: {}", self.path.source(), e))),
        }
    }

    fn is_generic(&self) -> bool {
        true
    }

    fn kind(&self) -> PrinterKind {
        PrinterKind::JsonPath
    }
}
