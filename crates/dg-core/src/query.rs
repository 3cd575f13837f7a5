//! Filter expressions over JSON records.
//!
//! A jq-flavoured subset used by `query` search clauses and advanced rules:
//!
//! ```text
//! .  .a.b  .[0]  .[]  f | g  f, g  (f)  [f]
//! select(f)  not  f and g  f or g  == != < <= > >=
//! length  keys  has(k)  contains(x)  startswith(s)  endswith(s)  test(re)  any  any(f)
//! "str"  12.5  true  false  null
//! ```
//!
//! Evaluation produces a stream of values. Parsing is built on `winnow` 0.7.

use crate::error::QueryError;
use regex::Regex;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take_while;

/// Deepest `(`, `[` or `{` nesting the parser accepts.
pub const MAX_QUERY_NESTING: usize = 64;

/// Tallest filter tree accepted for evaluation.
pub const MAX_QUERY_DEPTH: usize = 256;

/// Evaluates an expression against an input record.
pub trait QueryEvaluator {
    fn evaluate(&self, expression: &str, input: &Value) -> Result<Vec<Value>, QueryError>;
}

/// jq-style truthiness: everything except `null` and `false`.
pub fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

// ─── AST ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Select,
    Not,
    Length,
    Keys,
    Has,
    Contains,
    StartsWith,
    EndsWith,
    Test,
    Any,
}

impl Builtin {
    fn lookup(name: &str) -> Option<(Builtin, &'static [usize])> {
        Some(match name {
            "select" => (Builtin::Select, &[1]),
            "not" => (Builtin::Not, &[0]),
            "length" => (Builtin::Length, &[0]),
            "keys" => (Builtin::Keys, &[0]),
            "has" => (Builtin::Has, &[1]),
            "contains" => (Builtin::Contains, &[1]),
            "startswith" => (Builtin::StartsWith, &[1]),
            "endswith" => (Builtin::EndsWith, &[1]),
            "test" => (Builtin::Test, &[1]),
            "any" => (Builtin::Any, &[0, 1]),
            _ => return None,
        })
    }
}

/// A parsed filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Identity,
    Literal(Value),
    Field(Box<Filter>, String),
    Index(Box<Filter>, i64),
    Iterate(Box<Filter>),
    Collect(Box<Filter>),
    /// `{key: filter, ...}`; one object per combination of value outputs.
    Object(Vec<(String, Filter)>),
    Pipe(Box<Filter>, Box<Filter>),
    Comma(Box<Filter>, Box<Filter>),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Compare(Box<Filter>, CmpOp, Box<Filter>),
    Call(Builtin, Vec<Filter>),
}

impl Filter {
    /// Parse an expression. The whole input must be consumed.
    pub fn parse(expression: &str) -> Result<Filter, QueryError> {
        let mut rest = expression;
        skip_ws(&mut rest);
        if rest.is_empty() {
            return Err(QueryError::Parse {
                offset: 0,
                message: "empty expression".into(),
            });
        }
        check_nesting(expression)?;
        let offset = |rest: &str| expression.len() - rest.len();
        let filter = parse_pipe.parse_next(&mut rest).map_err(|_| QueryError::Parse {
            offset: offset(rest),
            message: "unexpected token".into(),
        })?;
        skip_ws(&mut rest);
        if !rest.is_empty() {
            return Err(QueryError::Parse {
                offset: offset(rest),
                message: format!("unexpected trailing input `{rest}`"),
            });
        }
        if filter.depth() > MAX_QUERY_DEPTH {
            return Err(QueryError::Parse {
                offset: 0,
                message: format!("expression nests deeper than {MAX_QUERY_DEPTH}"),
            });
        }
        Ok(filter)
    }

    /// Height of the filter tree, walked without recursion.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((filter, level)) = stack.pop() {
            deepest = deepest.max(level);
            let next = level + 1;
            match filter {
                Filter::Identity | Filter::Literal(_) => {}
                Filter::Field(inner, _)
                | Filter::Index(inner, _)
                | Filter::Iterate(inner)
                | Filter::Collect(inner) => stack.push((inner.as_ref(), next)),
                Filter::Object(entries) => stack.extend(entries.iter().map(|(_, f)| (f, next))),
                Filter::Pipe(a, b)
                | Filter::Comma(a, b)
                | Filter::And(a, b)
                | Filter::Or(a, b)
                | Filter::Compare(a, _, b) => {
                    stack.push((a.as_ref(), next));
                    stack.push((b.as_ref(), next));
                }
                Filter::Call(_, args) => stack.extend(args.iter().map(|f| (f, next))),
            }
        }
        deepest
    }

    /// Run against `input`, collecting the output stream.
    pub fn run(&self, input: &Value) -> Result<Vec<Value>, QueryError> {
        eval(self, input)
    }
}

// ─── Parser ──────────────────────────────────────────────────────────────

/// Reject bracket nesting past [`MAX_QUERY_NESTING`] before the recursive
/// descent sees it. String literals are skipped.
fn check_nesting(expression: &str) -> Result<(), QueryError> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in expression.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '[' | '{' => {
                depth += 1;
                if depth > MAX_QUERY_NESTING {
                    return Err(QueryError::Parse {
                        offset,
                        message: format!("brackets nest deeper than {MAX_QUERY_NESTING}"),
                    });
                }
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn backtrack<T>() -> ModalResult<T> {
    Err(ErrMode::Backtrack(ContextError::new()))
}

fn skip_ws(input: &mut &str) {
    *input = input.trim_start();
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// True if `input` starts with the keyword `kw` followed by a non-identifier char.
fn at_keyword(input: &str, kw: &str) -> bool {
    input.starts_with(kw) && !input[kw.len()..].starts_with(is_ident_char)
}

fn eat(input: &mut &str, token: &str) -> bool {
    if input.starts_with(token) {
        *input = &input[token.len()..];
        true
    } else {
        false
    }
}

fn parse_identifier<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    if !input.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        return backtrack();
    }
    take_while(1.., is_ident_char).parse_next(input)
}

fn parse_number(input: &mut &str) -> ModalResult<f64> {
    let start = *input;
    if input.starts_with('-') {
        *input = &input[1..];
    }
    let _ = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    if input.starts_with('.') {
        *input = &input[1..];
        let _ =
            take_while::<_, _, ContextError>(0.., |c: char| c.is_ascii_digit()).parse_next(input);
    }
    let matched = &start[..start.len() - input.len()];
    matched
        .parse::<f64>()
        .map_err(|_| ErrMode::Backtrack(ContextError::new()))
}

fn parse_string(input: &mut &str) -> ModalResult<String> {
    if !eat(input, "\"") {
        return backtrack();
    }
    let mut out = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                *input = &input[i + 1..];
                return Ok(out);
            }
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            other => out.push(other),
        }
    }
    backtrack()
}

/// `a | b | c` associates to the right.
fn parse_pipe(input: &mut &str) -> ModalResult<Filter> {
    let mut stages = vec![parse_comma(input)?];
    loop {
        skip_ws(input);
        if !eat(input, "|") {
            break;
        }
        stages.push(parse_comma(input)?);
    }
    let mut filter = stages.pop().unwrap_or(Filter::Identity);
    while let Some(left) = stages.pop() {
        filter = Filter::Pipe(Box::new(left), Box::new(filter));
    }
    Ok(filter)
}

fn parse_comma(input: &mut &str) -> ModalResult<Filter> {
    let mut left = parse_or(input)?;
    loop {
        skip_ws(input);
        if !eat(input, ",") {
            return Ok(left);
        }
        let right = parse_or(input)?;
        left = Filter::Comma(Box::new(left), Box::new(right));
    }
}

fn parse_or(input: &mut &str) -> ModalResult<Filter> {
    let mut left = parse_and(input)?;
    loop {
        skip_ws(input);
        if !at_keyword(input, "or") {
            return Ok(left);
        }
        *input = &input[2..];
        let right = parse_and(input)?;
        left = Filter::Or(Box::new(left), Box::new(right));
    }
}

fn parse_and(input: &mut &str) -> ModalResult<Filter> {
    let mut left = parse_compare(input)?;
    loop {
        skip_ws(input);
        if !at_keyword(input, "and") {
            return Ok(left);
        }
        *input = &input[3..];
        let right = parse_compare(input)?;
        left = Filter::And(Box::new(left), Box::new(right));
    }
}

fn parse_compare(input: &mut &str) -> ModalResult<Filter> {
    let left = parse_postfix(input)?;
    skip_ws(input);
    // Two-char operators first so `<=` is not read as `<`.
    let ops = [
        ("==", CmpOp::Eq),
        ("!=", CmpOp::Ne),
        ("<=", CmpOp::Le),
        (">=", CmpOp::Ge),
        ("<", CmpOp::Lt),
        (">", CmpOp::Gt),
    ];
    for (token, op) in ops {
        if eat(input, token) {
            let right = parse_postfix(input)?;
            return Ok(Filter::Compare(Box::new(left), op, Box::new(right)));
        }
    }
    Ok(left)
}

/// `[` already consumed: `]` for iterate, or an integer index then `]`.
fn parse_bracket_suffix(input: &mut &str, base: Filter) -> ModalResult<Filter> {
    skip_ws(input);
    if eat(input, "]") {
        return Ok(Filter::Iterate(Box::new(base)));
    }
    let n = parse_number(input)?;
    skip_ws(input);
    if !eat(input, "]") || n.fract() != 0.0 {
        return backtrack();
    }
    Ok(Filter::Index(Box::new(base), n as i64))
}

fn parse_postfix(input: &mut &str) -> ModalResult<Filter> {
    skip_ws(input);
    let mut filter = parse_primary(input)?;
    loop {
        if input.starts_with('.') && input[1..].starts_with(|c: char| c.is_alphabetic() || c == '_') {
            *input = &input[1..];
            let name = parse_identifier(input)?;
            filter = Filter::Field(Box::new(filter), name.to_string());
        } else if eat(input, ".[") || eat(input, "[") {
            filter = parse_bracket_suffix(input, filter)?;
        } else {
            let _ = eat(input, "?");
            return Ok(filter);
        }
    }
}

fn parse_primary(input: &mut &str) -> ModalResult<Filter> {
    if input.starts_with('.') {
        *input = &input[1..];
        if input.starts_with(|c: char| c.is_alphabetic() || c == '_') {
            let name = parse_identifier(input)?;
            return Ok(Filter::Field(Box::new(Filter::Identity), name.to_string()));
        }
        if eat(input, "[") {
            return parse_bracket_suffix(input, Filter::Identity);
        }
        return Ok(Filter::Identity);
    }
    if input.starts_with('"') {
        return parse_string.map(|s| Filter::Literal(Value::String(s))).parse_next(input);
    }
    if input.starts_with(|c: char| c.is_ascii_digit())
        || (input.starts_with('-') && input[1..].starts_with(|c: char| c.is_ascii_digit()))
    {
        let n = parse_number(input)?;
        return Ok(Filter::Literal(
            serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number),
        ));
    }
    if eat(input, "(") {
        let inner = parse_pipe(input)?;
        skip_ws(input);
        if !eat(input, ")") {
            return backtrack();
        }
        return Ok(inner);
    }
    if eat(input, "[") {
        skip_ws(input);
        if eat(input, "]") {
            return Ok(Filter::Literal(Value::Array(Vec::new())));
        }
        let inner = parse_pipe(input)?;
        skip_ws(input);
        if !eat(input, "]") {
            return backtrack();
        }
        return Ok(Filter::Collect(Box::new(inner)));
    }

    if eat(input, "{") {
        return parse_object_body(input);
    }

    let name = parse_identifier(input)?;
    match name {
        "true" => return Ok(Filter::Literal(Value::Bool(true))),
        "false" => return Ok(Filter::Literal(Value::Bool(false))),
        "null" => return Ok(Filter::Literal(Value::Null)),
        _ => {}
    }
    let Some((builtin, arities)) = Builtin::lookup(name) else {
        return backtrack();
    };
    let mut args = Vec::new();
    if eat(input, "(") {
        loop {
            args.push(parse_pipe(input)?);
            skip_ws(input);
            if eat(input, ";") {
                continue;
            }
            if eat(input, ")") {
                break;
            }
            return backtrack();
        }
    }
    if !arities.contains(&args.len()) {
        return backtrack();
    }
    Ok(Filter::Call(builtin, args))
}

/// `{` already consumed. Keys are identifiers or strings; `{id}` is short for `{id: .id}`.
fn parse_object_body(input: &mut &str) -> ModalResult<Filter> {
    let mut entries = Vec::new();
    loop {
        skip_ws(input);
        if eat(input, "}") {
            return Ok(Filter::Object(entries));
        }
        let key = if input.starts_with('"') {
            parse_string(input)?
        } else {
            parse_identifier(input)?.to_string()
        };
        skip_ws(input);
        let value = if eat(input, ":") {
            parse_or(input)?
        } else {
            Filter::Field(Box::new(Filter::Identity), key.clone())
        };
        entries.push((key, value));
        skip_ws(input);
        if eat(input, ",") {
            continue;
        }
        if !input.starts_with('}') {
            return backtrack();
        }
    }
}

// ─── Evaluation ──────────────────────────────────────────────────────────

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn runtime(msg: String) -> QueryError {
    QueryError::Runtime(msg)
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}

/// jq ordering: null < false < true < numbers < strings < arrays < objects.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(false) => 1,
            Value::Bool(true) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xk: Vec<_> = x.keys().collect();
            let mut yk: Vec<_> = y.keys().collect();
            xk.sort();
            yk.sort();
            xk.cmp(&yk).then_with(|| {
                xk.iter()
                    .map(|k| compare_values(&x[k.as_str()], &y[k.as_str()]))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            })
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// jq `contains`: substring for strings, recursive containment for containers.
fn json_contains(a: &Value, b: &Value) -> Result<bool, QueryError> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.contains(y.as_str())),
        (Value::Array(xs), Value::Array(ys)) => {
            for y in ys {
                let mut found = false;
                for x in xs {
                    if json_contains(x, y).unwrap_or(false) {
                        found = true;
                        break;
                    }
                }
                if !found {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::Object(xm), Value::Object(ym)) => {
            for (k, yv) in ym {
                match xm.get(k) {
                    Some(xv) if json_contains(xv, yv)? => {}
                    _ => return Ok(false),
                }
            }
            Ok(true)
        }
        _ if type_name(a) == type_name(b) => Ok(compare_values(a, b) == Ordering::Equal),
        _ => Err(runtime(format!(
            "{} and {} cannot have their containment checked",
            type_name(a),
            type_name(b)
        ))),
    }
}

fn expect_str<'a>(v: &'a Value, what: &str) -> Result<&'a str, QueryError> {
    v.as_str()
        .ok_or_else(|| runtime(format!("{what} requires a string, got {}", type_name(v))))
}

/// Evaluate `arg` against `input` and apply `f` to each output.
fn each_arg(
    arg: &Filter,
    input: &Value,
    mut f: impl FnMut(&Value) -> Result<Value, QueryError>,
) -> Result<Vec<Value>, QueryError> {
    eval(arg, input)?.iter().map(&mut f).collect()
}

fn eval_call(builtin: Builtin, args: &[Filter], input: &Value) -> Result<Vec<Value>, QueryError> {
    match builtin {
        Builtin::Select => {
            let mut out = Vec::new();
            for cond in eval(&args[0], input)? {
                if truthy(&cond) {
                    out.push(input.clone());
                }
            }
            Ok(out)
        }
        Builtin::Not => Ok(vec![Value::Bool(!truthy(input))]),
        Builtin::Length => {
            let len = match input {
                Value::Null => 0.0,
                Value::Bool(_) => {
                    return Err(runtime("boolean has no length".into()));
                }
                Value::Number(n) => n.as_f64().unwrap_or(0.0).abs(),
                Value::String(s) => s.chars().count() as f64,
                Value::Array(a) => a.len() as f64,
                Value::Object(o) => o.len() as f64,
            };
            Ok(vec![number(len)])
        }
        Builtin::Keys => match input {
            Value::Object(o) => {
                let mut keys: Vec<&String> = o.keys().collect();
                keys.sort();
                Ok(vec![Value::Array(
                    keys.into_iter().map(|k| Value::String(k.clone())).collect(),
                )])
            }
            Value::Array(a) => Ok(vec![Value::Array(
                (0..a.len()).map(|i| number(i as f64)).collect(),
            )]),
            other => Err(runtime(format!("{} has no keys", type_name(other)))),
        },
        Builtin::Has => each_arg(&args[0], input, |key| match (input, key) {
            (Value::Object(o), Value::String(k)) => Ok(Value::Bool(o.contains_key(k))),
            (Value::Array(a), Value::Number(n)) => Ok(Value::Bool(
                n.as_f64().is_some_and(|i| i >= 0.0 && (i as usize) < a.len()),
            )),
            _ => Err(runtime(format!(
                "cannot check whether {} has a {} key",
                type_name(input),
                type_name(key)
            ))),
        }),
        Builtin::Contains => each_arg(&args[0], input, |b| json_contains(input, b).map(Value::Bool)),
        Builtin::StartsWith => each_arg(&args[0], input, |prefix| {
            let s = expect_str(input, "startswith")?;
            Ok(Value::Bool(s.starts_with(expect_str(prefix, "startswith")?)))
        }),
        Builtin::EndsWith => each_arg(&args[0], input, |suffix| {
            let s = expect_str(input, "endswith")?;
            Ok(Value::Bool(s.ends_with(expect_str(suffix, "endswith")?)))
        }),
        Builtin::Test => each_arg(&args[0], input, |pattern| {
            let s = expect_str(input, "test")?;
            let re = Regex::new(expect_str(pattern, "test")?)
                .map_err(|e| runtime(format!("invalid regex: {e}")))?;
            Ok(Value::Bool(re.is_match(s)))
        }),
        Builtin::Any => {
            let items: Vec<&Value> = match input {
                Value::Array(a) => a.iter().collect(),
                Value::Object(o) => o.values().collect(),
                other => return Err(runtime(format!("cannot iterate over {}", type_name(other)))),
            };
            for item in items {
                let hit = match args.first() {
                    Some(cond) => eval(cond, item)?.iter().any(truthy),
                    None => truthy(item),
                };
                if hit {
                    return Ok(vec![Value::Bool(true)]);
                }
            }
            Ok(vec![Value::Bool(false)])
        }
    }
}

fn eval(filter: &Filter, input: &Value) -> Result<Vec<Value>, QueryError> {
    match filter {
        Filter::Identity => Ok(vec![input.clone()]),
        Filter::Literal(v) => Ok(vec![v.clone()]),
        Filter::Field(base, name) => {
            let mut out = Vec::new();
            for v in eval(base, input)? {
                match v {
                    Value::Object(map) => out.push(map.get(name).cloned().unwrap_or(Value::Null)),
                    Value::Null => out.push(Value::Null),
                    other => {
                        return Err(runtime(format!(
                            "cannot index {} with \"{name}\"",
                            type_name(&other)
                        )));
                    }
                }
            }
            Ok(out)
        }
        Filter::Index(base, i) => {
            let mut out = Vec::new();
            for v in eval(base, input)? {
                match v {
                    Value::Array(items) => {
                        let idx = if *i < 0 { items.len() as i64 + i } else { *i };
                        let item = usize::try_from(idx).ok().and_then(|ix| items.get(ix));
                        out.push(item.cloned().unwrap_or(Value::Null));
                    }
                    Value::Null => out.push(Value::Null),
                    other => {
                        return Err(runtime(format!(
                            "cannot index {} with number",
                            type_name(&other)
                        )));
                    }
                }
            }
            Ok(out)
        }
        Filter::Iterate(base) => {
            let mut out = Vec::new();
            for v in eval(base, input)? {
                match v {
                    Value::Array(items) => out.extend(items),
                    Value::Object(map) => out.extend(map.into_iter().map(|(_, v)| v)),
                    other => {
                        return Err(runtime(format!("cannot iterate over {}", type_name(&other))));
                    }
                }
            }
            Ok(out)
        }
        Filter::Collect(inner) => Ok(vec![Value::Array(eval(inner, input)?)]),
        Filter::Object(entries) => {
            let mut partial = vec![Map::new()];
            for (key, value) in entries {
                let values = eval(value, input)?;
                let mut next = Vec::with_capacity(partial.len() * values.len());
                for map in &partial {
                    for v in &values {
                        let mut map = map.clone();
                        map.insert(key.clone(), v.clone());
                        next.push(map);
                    }
                }
                partial = next;
            }
            Ok(partial.into_iter().map(Value::Object).collect())
        }
        Filter::Pipe(left, right) => {
            let mut out = Vec::new();
            for v in eval(left, input)? {
                out.extend(eval(right, &v)?);
            }
            Ok(out)
        }
        Filter::Comma(left, right) => {
            let mut out = eval(left, input)?;
            out.extend(eval(right, input)?);
            Ok(out)
        }
        Filter::And(left, right) => {
            let mut out = Vec::new();
            for l in eval(left, input)? {
                if !truthy(&l) {
                    out.push(Value::Bool(false));
                    continue;
                }
                for r in eval(right, input)? {
                    out.push(Value::Bool(truthy(&r)));
                }
            }
            Ok(out)
        }
        Filter::Or(left, right) => {
            let mut out = Vec::new();
            for l in eval(left, input)? {
                if truthy(&l) {
                    out.push(Value::Bool(true));
                    continue;
                }
                for r in eval(right, input)? {
                    out.push(Value::Bool(truthy(&r)));
                }
            }
            Ok(out)
        }
        Filter::Compare(left, op, right) => {
            let rights = eval(right, input)?;
            let mut out = Vec::new();
            for l in eval(left, input)? {
                for r in &rights {
                    let ord = compare_values(&l, r);
                    let result = match op {
                        CmpOp::Eq => ord == Ordering::Equal,
                        CmpOp::Ne => ord != Ordering::Equal,
                        CmpOp::Lt => ord == Ordering::Less,
                        CmpOp::Le => ord != Ordering::Greater,
                        CmpOp::Gt => ord == Ordering::Greater,
                        CmpOp::Ge => ord != Ordering::Less,
                    };
                    out.push(Value::Bool(result));
                }
            }
            Ok(out)
        }
        Filter::Call(builtin, args) => eval_call(*builtin, args, input),
    }
}

// ─── Built-in evaluator ──────────────────────────────────────────────────

/// The built-in [`QueryEvaluator`]. Parsed filters are cached by source text.
#[derive(Debug, Default)]
pub struct FilterQuery {
    cache: RefCell<HashMap<String, Rc<Filter>>>,
}

impl FilterQuery {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, expression: &str) -> Result<Rc<Filter>, QueryError> {
        if let Some(filter) = self.cache.borrow().get(expression) {
            return Ok(filter.clone());
        }
        let filter = Rc::new(Filter::parse(expression)?);
        self.cache
            .borrow_mut()
            .insert(expression.to_string(), filter.clone());
        Ok(filter)
    }
}

impl QueryEvaluator for FilterQuery {
    fn evaluate(&self, expression: &str, input: &Value) -> Result<Vec<Value>, QueryError> {
        self.compile(expression)?.run(input)
    }
}
