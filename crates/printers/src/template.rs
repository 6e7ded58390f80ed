//! Go-template subset used by `-o go-template`.
//!
//! Supported: text with `{{ }}` actions (`{{-`/`-}}` trimming, `/* */` comments), field
//! chains on `.` and variables, `if`/`else if`/`else`, `range` (with `$i, $v :=` and
//! `else`), `with`, variable declaration and assignment, pipelines, parenthesised
//! sub-pipelines and the builtins `index len printf print println eq ne lt le gt ge not
//! and or`.

use std::cmp::Ordering;
use std::io::Write;

use serde_json::Value;

use crate::{PrintError, PrinterKind, ResourcePrinter};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("{0}")]
    Parse(String),
    #[error("map has no entry for key \"{0}\"")]
    MissingKey(String),
    #[error("{0}")]
    Exec(String),
}

fn parse_err<T>(msg: impl Into<String>) -> Result<T, TemplateError> {
    Err(TemplateError::Parse(msg.into()))
}

fn exec_err<T>(msg: impl Into<String>) -> Result<T, TemplateError> {
    Err(TemplateError::Exec(msg.into()))
}

// ---------------- syntax ----------------

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Action(Pipeline),
    If { branches: Vec<(Pipeline, Vec<Node>)>, otherwise: Option<Vec<Node>> },
    Range { pipe: Pipeline, body: Vec<Node>, otherwise: Option<Vec<Node>> },
    With { pipe: Pipeline, body: Vec<Node>, otherwise: Option<Vec<Node>> },
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Pipeline {
    decl: Vec<String>,
    assign: bool,
    cmds: Vec<Vec<Arg>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Field(Vec<String>),
    Var(String, Vec<String>),
    Func(String),
    Literal(Value),
    Sub(Pipeline, Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Field(Vec<String>),
    Chain(Vec<String>),
    Var(String, Vec<String>),
    Ident(String),
    Str(String),
    Num(String),
    LParen,
    RParen,
    Pipe,
    Declare,
    Assign,
    Comma,
}

enum Seg {
    Text(String),
    Action(String),
}

/// Split source into text and action segments, applying trim markers and dropping comments.
fn segment(src: &str) -> Result<Vec<Seg>, TemplateError> {
    let mut segs = Vec::new();
    let mut rest = src;
    let mut trim_next = false;
    while let Some(open) = rest.find("{{") {
        let mut text = &rest[..open];
        if trim_next {
            text = text.trim_start();
        }
        let after = &rest[open + 2..];
        let (trim_prev, body_start) = match after.strip_prefix('-') {
            Some(r) if r.starts_with(char::is_whitespace) => (true, r),
            _ => (false, after),
        };
        if trim_prev {
            text = text.trim_end();
        }
        if !text.is_empty() {
            segs.push(Seg::Text(text.to_string()));
        }
        let close = find_close(body_start).ok_or_else(|| TemplateError::Parse("unclosed action".into()))?;
        let mut body = &body_start[..close];
        trim_next = false;
        if let Some(b) = body.strip_suffix('-') {
            if b.ends_with(char::is_whitespace) {
                body = b;
                trim_next = true;
            }
        }
        rest = &body_start[close + 2..];
        let body = body.trim();
        if body.starts_with("/*") {
            if !body.ends_with("*/") {
                return parse_err("unclosed comment");
            }
            continue;
        }
        segs.push(Seg::Action(body.to_string()));
    }
    let tail = if trim_next { rest.trim_start() } else { rest };
    if !tail.is_empty() {
        segs.push(Seg::Text(tail.to_string()));
    }
    Ok(segs)
}

/// Offset of the `}}` ending an action, ignoring braces inside string literals.
fn find_close(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' && q == b'"' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'"' || b == b'`' {
                    quote = Some(b);
                } else if b == b'}' && bytes.get(i + 1) == Some(&b'}') {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn lex(src: &str) -> Result<Vec<Tok>, TemplateError> {
    let chars: Vec<char> = src.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;

    let read_ident = |i: &mut usize| {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect::<String>()
    };
    let read_chain = |i: &mut usize| {
        let mut chain = Vec::new();
        while *i < chars.len() && chars[*i] == '.' {
            *i += 1;
            let start = *i;
            while *i < chars.len() && is_ident_char(chars[*i]) {
                *i += 1;
            }
            let seg: String = chars[start..*i].iter().collect();
            if seg.is_empty() {
                break;
            }
            chain.push(seg);
        }
        chain
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
                if i < chars.len() && chars[i] == '.' {
                    toks.push(Tok::Chain(read_chain(&mut i)));
                }
            }
            '|' => {
                toks.push(Tok::Pipe);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&'=') => {
                toks.push(Tok::Declare);
                i += 2;
            }
            '=' => {
                toks.push(Tok::Assign);
                i += 1;
            }
            '.' => {
                if chars.get(i + 1).map(|c| is_ident_char(*c) && !c.is_ascii_digit()).unwrap_or(false) {
                    toks.push(Tok::Field(read_chain(&mut i)));
                } else {
                    toks.push(Tok::Field(Vec::new()));
                    i += 1;
                }
            }
            '$' => {
                i += 1;
                let name = format!("${}", read_ident(&mut i));
                toks.push(Tok::Var(name, read_chain(&mut i)));
            }
            '"' => {
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        None => return parse_err("unterminated quoted string"),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let esc = chars.get(i + 1).copied().unwrap_or('\\');
                            s.push(match esc {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => other,
                            });
                            i += 2;
                        }
                        Some(c) => {
                            s.push(*c);
                            i += 1;
                        }
                    }
                }
                toks.push(Tok::Str(s));
            }
            '`' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != '`' {
                    i += 1;
                }
                if i >= chars.len() {
                    return parse_err("unterminated raw quoted string");
                }
                toks.push(Tok::Str(chars[start..i].iter().collect()));
                i += 1;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).map(|d| d.is_ascii_digit()).unwrap_or(false)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == 'e') {
                    i += 1;
                }
                toks.push(Tok::Num(chars[start..i].iter().collect()));
            }
            c if is_ident_char(c) => toks.push(Tok::Ident(read_ident(&mut i))),
            other => return parse_err(format!("unexpected {:?} in command", other)),
        }
    }
    Ok(toks)
}

fn parse_pipeline(toks: &[Tok]) -> Result<Pipeline, TemplateError> {
    let mut pipe = Pipeline::default();
    let mut rest = toks;
    match toks {
        [Tok::Var(a, p1), Tok::Comma, Tok::Var(b, p2), Tok::Declare, tail @ ..] if p1.is_empty() && p2.is_empty() => {
            pipe.decl = vec![a.clone(), b.clone()];
            rest = tail;
        }
        [Tok::Var(a, p), Tok::Declare, tail @ ..] if p.is_empty() => {
            pipe.decl = vec![a.clone()];
            rest = tail;
        }
        [Tok::Var(a, p), Tok::Assign, tail @ ..] if p.is_empty() => {
            pipe.decl = vec![a.clone()];
            pipe.assign = true;
            rest = tail;
        }
        _ => {}
    }
    if rest.is_empty() {
        return parse_err("missing value for command");
    }

    let mut depth = 0usize;
    let mut start = 0;
    for (i, t) in rest.iter().enumerate() {
        match t {
            Tok::LParen => depth += 1,
            Tok::RParen => depth = depth.saturating_sub(1),
            Tok::Pipe if depth == 0 => {
                pipe.cmds.push(parse_command(&rest[start..i])?);
                start = i + 1;
            }
            _ => {}
        }
    }
    pipe.cmds.push(parse_command(&rest[start..])?);
    Ok(pipe)
}

fn parse_command(toks: &[Tok]) -> Result<Vec<Arg>, TemplateError> {
    if toks.is_empty() {
        return parse_err("missing command");
    }
    let mut args = Vec::new();
    let mut i = 0;
    while i < toks.len() {
        let arg = match &toks[i] {
            Tok::Field(path) => Arg::Field(path.clone()),
            Tok::Var(name, path) => Arg::Var(name.clone(), path.clone()),
            Tok::Str(s) => Arg::Literal(Value::String(s.clone())),
            Tok::Num(n) => match serde_json::from_str::<serde_json::Number>(n) {
                Ok(num) => Arg::Literal(Value::Number(num)),
                Err(_) => return parse_err(format!("bad number syntax: {:?}", n)),
            },
            Tok::Ident(id) => match id.as_str() {
                "true" => Arg::Literal(Value::Bool(true)),
                "false" => Arg::Literal(Value::Bool(false)),
                "nil" => Arg::Literal(Value::Null),
                name if FUNCS.contains(&name) => Arg::Func(name.to_string()),
                name => return parse_err(format!("function {:?} not defined", name)),
            },
            Tok::LParen => {
                let mut depth = 1usize;
                let mut j = i + 1;
                while j < toks.len() {
                    match toks[j] {
                        Tok::LParen => depth += 1,
                        Tok::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                if j >= toks.len() {
                    return parse_err("unclosed left paren");
                }
                let inner = parse_pipeline(&toks[i + 1..j])?;
                i = j;
                let chain = match toks.get(j + 1) {
                    Some(Tok::Chain(c)) => {
                        i += 1;
                        c.clone()
                    }
                    _ => Vec::new(),
                };
                Arg::Sub(inner, chain)
            }
            other => return parse_err(format!("unexpected {:?} in operand", other)),
        };
        args.push(arg);
        i += 1;
    }
    Ok(args)
}

enum Stop {
    End,
    Else,
    ElseIf(Pipeline),
    Eof,
}

struct Parser {
    segs: std::vec::IntoIter<Seg>,
}

impl Parser {
    fn list(&mut self) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes = Vec::new();
        while let Some(seg) = self.segs.next() {
            let body = match seg {
                Seg::Text(t) => {
                    nodes.push(Node::Text(t));
                    continue;
                }
                Seg::Action(body) => body,
            };
            let toks = lex(&body)?;
            match toks.first() {
                None => return parse_err("missing value for command"),
                Some(Tok::Ident(kw)) if kw == "end" => return Ok((nodes, Stop::End)),
                Some(Tok::Ident(kw)) if kw == "else" => {
                    return match toks.get(1) {
                        None => Ok((nodes, Stop::Else)),
                        Some(Tok::Ident(k)) if k == "if" => Ok((nodes, Stop::ElseIf(parse_pipeline(&toks[2..])?))),
                        Some(_) => parse_err("unexpected tokens after else"),
                    };
                }
                Some(Tok::Ident(kw)) if kw == "if" => nodes.push(self.if_node(parse_pipeline(&toks[1..])?)?),
                Some(Tok::Ident(kw)) if kw == "range" => {
                    let pipe = parse_pipeline(&toks[1..])?;
                    let (body, otherwise) = self.body_with_else("range")?;
                    nodes.push(Node::Range { pipe, body, otherwise });
                }
                Some(Tok::Ident(kw)) if kw == "with" => {
                    let pipe = parse_pipeline(&toks[1..])?;
                    let (body, otherwise) = self.body_with_else("with")?;
                    nodes.push(Node::With { pipe, body, otherwise });
                }
                Some(_) => nodes.push(Node::Action(parse_pipeline(&toks)?)),
            }
        }
        Ok((nodes, Stop::Eof))
    }

    fn if_node(&mut self, cond: Pipeline) -> Result<Node, TemplateError> {
        let mut branches = Vec::new();
        let mut cond = cond;
        loop {
            let (body, stop) = self.list()?;
            branches.push((cond, body));
            match stop {
                Stop::End => return Ok(Node::If { branches, otherwise: None }),
                Stop::Else => {
                    let (otherwise, stop) = self.list()?;
                    if !matches!(stop, Stop::End) {
                        return parse_err("expected end after else");
                    }
                    return Ok(Node::If { branches, otherwise: Some(otherwise) });
                }
                Stop::ElseIf(next) => cond = next,
                Stop::Eof => return parse_err("unexpected EOF in if"),
            }
        }
    }

    fn body_with_else(&mut self, what: &str) -> Result<(Vec<Node>, Option<Vec<Node>>), TemplateError> {
        let (body, stop) = self.list()?;
        match stop {
            Stop::End => Ok((body, None)),
            Stop::Else => {
                let (otherwise, stop) = self.list()?;
                if !matches!(stop, Stop::End) {
                    return parse_err(format!("expected end after else in {}", what));
                }
                Ok((body, Some(otherwise)))
            }
            Stop::ElseIf(_) => parse_err(format!("else if is not allowed in {}", what)),
            Stop::Eof => parse_err(format!("unexpected EOF in {}", what)),
        }
    }
}

// ---------------- evaluation ----------------

const FUNCS: &[&str] = &["index", "len", "printf", "print", "println", "eq", "ne", "lt", "le", "gt", "ge", "not", "and", "or"];

/// Go's notion of emptiness.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "[]interface {}",
        Value::Object(_) => "map[string]interface {}",
    }
}

/// `%v` rendering of a value.
fn display(v: &Value) -> String {
    fn inner(v: &Value, top: bool, out: &mut String) {
        match v {
            Value::Null if top => out.push_str("<no value>"),
            Value::Null => out.push_str("<nil>"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => out.push_str(&n.to_string()),
            Value::String(s) => out.push_str(s),
            Value::Array(a) => {
                out.push('[');
                for (i, x) in a.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    inner(x, false, out);
                }
                out.push(']');
            }
            Value::Object(m) => {
                let mut keys: Vec<&String> = m.keys().collect();
                keys.sort();
                out.push_str("map[");
                for (i, k) in keys.into_iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str(k);
                    out.push(':');
                    inner(&m[k], false, out);
                }
                out.push(']');
            }
        }
    }
    let mut out = String::new();
    inner(v, true, &mut out);
    out
}

fn basic_cmp(a: &Value, b: &Value) -> Result<Option<Ordering>, TemplateError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(x.as_f64().zip(y.as_f64()).and_then(|(x, y)| x.partial_cmp(&y))),
        (Value::String(x), Value::String(y)) => Ok(Some(x.cmp(y))),
        (Value::Bool(x), Value::Bool(y)) => Ok(if x == y { Some(Ordering::Equal) } else { None }),
        (Value::Null, _) | (_, Value::Null) => Ok(None),
        _ => exec_err("incompatible types for comparison"),
    }
}

fn ordered(a: &Value, b: &Value) -> Result<Ordering, TemplateError> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
            basic_cmp(a, b)?.ok_or_else(|| TemplateError::Exec("invalid type for comparison".into()))
        }
        _ => exec_err("invalid type for comparison"),
    }
}

fn printf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut next_arg = args.iter();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut left = false;
        while let Some('-') = chars.peek() {
            left = true;
            chars.next();
        }
        let mut width = String::new();
        while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(*d);
            chars.next();
        }
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = String::new();
            while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                p.push(*d);
                chars.next();
            }
            precision = Some(p.parse().unwrap_or(0));
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = next_arg.next() else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        let text = match (verb, arg) {
            ('d', Value::Number(n)) => n.as_i64().map(|i| i.to_string()).unwrap_or_else(|| n.to_string()),
            ('f', Value::Number(n)) => format!("{:.*}", precision.unwrap_or(6), n.as_f64().unwrap_or(0.0)),
            ('t', Value::Bool(b)) => b.to_string(),
            ('q', Value::String(s)) => Value::String(s.clone()).to_string(),
            ('s' | 'v', v) => display(v),
            (verb, v) => format!("%!{}({}={})", verb, type_name(v), display(v)),
        };
        let width: usize = width.parse().unwrap_or(0);
        let pad = width.saturating_sub(text.chars().count());
        if left {
            out.push_str(&text);
            out.extend(std::iter::repeat(' ').take(pad));
        } else {
            out.extend(std::iter::repeat(' ').take(pad));
            out.push_str(&text);
        }
    }
    out
}

fn call(name: &str, args: Vec<Value>) -> Result<Value, TemplateError> {
    let argc = args.len();
    let want = |n: usize| -> Result<(), TemplateError> {
        if argc == n {
            Ok(())
        } else {
            exec_err(format!("wrong number of args for {}: want {} got {}", name, n, argc))
        }
    };
    match name {
        "index" => {
            let mut it = args.into_iter();
            let Some(mut cur) = it.next() else { return exec_err("wrong number of args for index: want at least 1 got 0") };
            for key in it {
                cur = match (&cur, &key) {
                    (Value::Object(m), Value::String(k)) => m.get(k).cloned().unwrap_or(Value::Null),
                    (Value::Array(a), Value::Number(n)) => {
                        let ix = n.as_i64().unwrap_or(-1);
                        if ix < 0 || ix as usize >= a.len() {
                            return exec_err(format!("error calling index: index out of range: {}", ix));
                        }
                        a[ix as usize].clone()
                    }
                    (Value::Null, _) => Value::Null,
                    (c, k) => return exec_err(format!("error calling index: cannot index {} with {}", type_name(c), type_name(k))),
                };
            }
            Ok(cur)
        }
        "len" => {
            want(1)?;
            let n = match &args[0] {
                Value::String(s) => s.len(),
                Value::Array(a) => a.len(),
                Value::Object(m) => m.len(),
                other => return exec_err(format!("error calling len: len of type {}", type_name(other))),
            };
            Ok(Value::from(n as u64))
        }
        "printf" => {
            let Some((fmt, rest)) = args.split_first() else { return exec_err("wrong number of args for printf: want at least 1 got 0") };
            Ok(Value::String(printf(&display(fmt), rest)))
        }
        "print" => {
            let mut out = String::new();
            for (i, a) in args.iter().enumerate() {
                if i > 0 && !a.is_string() && !args[i - 1].is_string() {
                    out.push(' ');
                }
                out.push_str(&display(a));
            }
            Ok(Value::String(out))
        }
        "println" => {
            let parts: Vec<String> = args.iter().map(display).collect();
            Ok(Value::String(format!("{}\n", parts.join(" "))))
        }
        "eq" | "ne" => {
            let Some((first, rest)) = args.split_first() else { return exec_err(format!("wrong number of args for {}", name)) };
            if rest.is_empty() {
                return exec_err(format!("missing argument for comparison in {}", name));
            }
            let mut equal = false;
            for other in rest {
                if basic_cmp(first, other)? == Some(Ordering::Equal) || (first.is_null() && other.is_null()) {
                    equal = true;
                    break;
                }
            }
            Ok(Value::Bool(if name == "eq" { equal } else { !equal }))
        }
        "lt" | "le" | "gt" | "ge" => {
            want(2)?;
            let ord = ordered(&args[0], &args[1])?;
            Ok(Value::Bool(match name {
                "lt" => ord == Ordering::Less,
                "le" => ord != Ordering::Greater,
                "gt" => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        "not" => {
            want(1)?;
            Ok(Value::Bool(!truthy(&args[0])))
        }
        "and" | "or" => {
            if args.is_empty() {
                return exec_err(format!("wrong number of args for {}: want at least 1 got 0", name));
            }
            let stop_on = name == "or";
            let last = args.len() - 1;
            for (i, a) in args.into_iter().enumerate() {
                if truthy(&a) == stop_on || i == last {
                    return Ok(a);
                }
            }
            Ok(Value::Null)
        }
        other => exec_err(format!("function {:?} not defined", other)),
    }
}

struct Exec<'t> {
    allow_missing_keys: bool,
    vars: Vec<(String, Value)>,
    out: &'t mut String,
}

impl Exec<'_> {
    fn var(&self, name: &str) -> Result<Value, TemplateError> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| TemplateError::Exec(format!("undefined variable: {}", name)))
    }

    fn set_var(&mut self, name: &str, value: Value, declare: bool) -> Result<(), TemplateError> {
        if declare {
            self.vars.push((name.to_string(), value));
            return Ok(());
        }
        match self.vars.iter_mut().rev().find(|(n, _)| n == name) {
            Some(slot) => {
                slot.1 = value;
                Ok(())
            }
            None => exec_err(format!("undefined variable: {}", name)),
        }
    }

    fn field(&self, mut base: Value, path: &[String]) -> Result<Value, TemplateError> {
        for seg in path {
            base = match base {
                Value::Object(mut m) => match m.remove(seg) {
                    Some(v) => v,
                    None if self.allow_missing_keys => Value::Null,
                    None => return Err(TemplateError::MissingKey(seg.clone())),
                },
                Value::Null if self.allow_missing_keys => Value::Null,
                Value::Null => return exec_err(format!("nil data; no entry for key \"{}\"", seg)),
                other => return exec_err(format!("can't evaluate field {} in type {}", seg, type_name(&other))),
            };
        }
        Ok(base)
    }

    fn arg(&mut self, arg: &Arg, dot: &Value) -> Result<Value, TemplateError> {
        match arg {
            Arg::Field(path) => self.field(dot.clone(), path),
            Arg::Var(name, path) => {
                let v = self.var(name)?;
                self.field(v, path)
            }
            Arg::Literal(v) => Ok(v.clone()),
            Arg::Sub(pipe, chain) => {
                let v = self.pipeline(pipe, dot)?;
                self.field(v, chain)
            }
            Arg::Func(name) => call(name, Vec::new()),
        }
    }

    fn command(&mut self, cmd: &[Arg], dot: &Value, piped: Option<Value>) -> Result<Value, TemplateError> {
        match cmd.split_first() {
            Some((Arg::Func(name), rest)) => {
                let mut args = Vec::with_capacity(rest.len() + 1);
                for a in rest {
                    args.push(self.arg(a, dot)?);
                }
                args.extend(piped);
                call(name, args)
            }
            Some((only, [])) => {
                if piped.is_some() {
                    return exec_err("can't give argument to non-function");
                }
                self.arg(only, dot)
            }
            Some(_) => exec_err("can't give argument to non-function"),
            None => exec_err("empty command"),
        }
    }

    fn pipeline(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value, TemplateError> {
        let mut value = None;
        for cmd in &pipe.cmds {
            value = Some(self.command(cmd, dot, value.take())?);
        }
        Ok(value.unwrap_or(Value::Null))
    }

    fn run(&mut self, nodes: &[Node], dot: &Value) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(t) => self.out.push_str(t),
                Node::Action(pipe) => {
                    let v = self.pipeline(pipe, dot)?;
                    match pipe.decl.first() {
                        Some(name) => self.set_var(name, v, !pipe.assign)?,
                        None => self.out.push_str(&display(&v)),
                    }
                }
                Node::If { branches, otherwise } => {
                    let mut taken = false;
                    for (cond, body) in branches {
                        if truthy(&self.pipeline(cond, dot)?) {
                            self.scoped(body, dot)?;
                            taken = true;
                            break;
                        }
                    }
                    if let (false, Some(body)) = (taken, otherwise) {
                        self.scoped(body, dot)?;
                    }
                }
                Node::With { pipe, body, otherwise } => {
                    let v = self.pipeline(pipe, dot)?;
                    if truthy(&v) {
                        let mark = self.vars.len();
                        if let Some(name) = pipe.decl.first() {
                            self.vars.push((name.clone(), v.clone()));
                        }
                        self.run(body, &v)?;
                        self.vars.truncate(mark);
                    } else if let Some(body) = otherwise {
                        self.scoped(body, dot)?;
                    }
                }
                Node::Range { pipe, body, otherwise } => {
                    let v = self.pipeline(pipe, dot)?;
                    let items: Vec<(Value, Value)> = match v {
                        Value::Array(a) => a.into_iter().enumerate().map(|(i, x)| (Value::from(i as u64), x)).collect(),
                        Value::Object(m) => {
                            let mut pairs: Vec<(String, Value)> = m.into_iter().collect();
                            pairs.sort_by(|a, b| a.0.cmp(&b.0));
                            pairs.into_iter().map(|(k, x)| (Value::String(k), x)).collect()
                        }
                        Value::Null => Vec::new(),
                        other => return exec_err(format!("range can't iterate over {}", display(&other))),
                    };
                    if items.is_empty() {
                        if let Some(body) = otherwise {
                            self.scoped(body, dot)?;
                        }
                        continue;
                    }
                    for (key, item) in items {
                        let mark = self.vars.len();
                        match pipe.decl.as_slice() {
                            [v] => self.vars.push((v.clone(), item.clone())),
                            [k, v] => {
                                self.vars.push((k.clone(), key));
                                self.vars.push((v.clone(), item.clone()));
                            }
                            _ => {}
                        }
                        self.run(body, &item)?;
                        self.vars.truncate(mark);
                    }
                }
            }
        }
        Ok(())
    }

    fn scoped(&mut self, body: &[Node], dot: &Value) -> Result<(), TemplateError> {
        let mark = self.vars.len();
        let res = self.run(body, dot);
        self.vars.truncate(mark);
        res
    }
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
    allow_missing_keys: bool,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut parser = Parser { segs: segment(source)?.into_iter() };
        let (nodes, stop) = parser.list()?;
        match stop {
            Stop::Eof => Ok(Self { source: source.to_string(), nodes, allow_missing_keys: false }),
            Stop::End => parse_err("unexpected {{end}}"),
            Stop::Else | Stop::ElseIf(_) => parse_err("unexpected {{else}}"),
        }
    }

    /// Missing map keys render as `<no value>` instead of failing.
    pub fn allow_missing_keys(mut self, allow: bool) -> Self {
        self.allow_missing_keys = allow;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn execute(&self, data: &Value) -> Result<String, TemplateError> {
        let mut out = String::new();
        let mut exec = Exec { allow_missing_keys: self.allow_missing_keys, vars: vec![("$".to_string(), data.clone())], out: &mut out };
        exec.run(&self.nodes, data)?;
        Ok(out)
    }
}

/// Renders each object through a go-template.
pub struct GoTemplatePrinter {
    template: Template,
}

impl GoTemplatePrinter {
    pub fn new(source: &str, allow_missing_keys: bool) -> Result<Self, PrintError> {
        let template = Template::parse(source)
            .map_err(|e| PrintError::Template { template: source.to_string(), reason: e.to_string() })?
            .allow_missing_keys(allow_missing_keys);
        Ok(Self { template })
    }
}

impl ResourcePrinter for GoTemplatePrinter {
    fn print_obj(&mut self, obj: &Value, out: &mut dyn Write) -> Result<(), PrintError> {
        match self.template.execute(obj) {
            Ok(text) => {
                out.write_all(text.as_bytes())?;
                Ok(())
            }
            Err(e @ TemplateError::MissingKey(_)) => {
                Err(PrintError::MissingKey(format!("error executing template {:?}: {}", self.template.source(), e)))
            }
            Err(e) => Err(PrintError::Render(format!("error executing template {:?}: {}", self.template.source(), e))),
        }
    }

    fn is_generic(&self) -> bool {
        true
    }

    fn kind(&self) -> PrinterKind {
        PrinterKind::GoTemplate
    }
}
