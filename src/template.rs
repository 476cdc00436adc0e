//! Output-path template engine.
//!
//! A template is literal text with `{field|operation|...}` tokens. Each
//! operation is `namespace.name` or `namespace.name:arg:arg` with namespaces
//! `date` and `str`. Operations chain left to right; the first receives the
//! raw field value, later ones receive the previous stage's output.

use crate::error::TemplateError;
use crate::types::{CellValue, Record};
use chrono::{NaiveDate, NaiveDateTime};

/// Field the relocation caller injects when a template uses date operations
/// and the matched row supplied no date of its own.
pub const RESERVED_DATE_FIELD: &str = "date";

/// Date string formats accepted when a date operation receives text.
const DATE_PARSE_FORMATS: &[&str] = &["%d_%m_%Y", "%Y-%m-%d", "%d/%m/%Y"];

/// Directive letters honored by `date.format` after literal `%` stripping.
const FORMAT_DIRECTIVES: &[char] = &['Y', 'y', 'm', 'd', 'H', 'M', 'S', 'j', 'B', 'b', 'A', 'a', 'e'];

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Token { field: String, ops: Vec<Op> },
}

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Date(DateOp),
    Str(StrOp),
}

#[derive(Debug, Clone, PartialEq)]
enum DateOp {
    Year,
    Month,
    YearMonth,
    Format(String),
}

#[derive(Debug, Clone, PartialEq)]
enum StrOp {
    Upper,
    Lower,
    Title,
    Replace(String, String),
    Slice(i64, Option<i64>),
    Sanitize,
    FirstWord,
}

/// Intermediate value flowing through an operation chain.
#[derive(Debug, Clone)]
enum Stage {
    Date(NaiveDateTime),
    Text(String),
}

impl Stage {
    fn from_cell(value: &CellValue) -> Stage {
        match value {
            CellValue::Date(d) => Stage::Date(*d),
            other => Stage::Text(other.as_display()),
        }
    }

    fn into_text(self) -> String {
        match self {
            Stage::Text(s) => s,
            Stage::Date(d) => d.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Final rendering: a date that went through no operation renders in its
    /// display form, not the verbose coercion form.
    fn finish(self) -> String {
        match self {
            Stage::Text(s) => s,
            Stage::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Render `template` against `record`. Pure function; recompiled per call.
pub fn render(template: &str, record: &Record) -> Result<String, TemplateError> {
    let segments = compile(template)?;
    let mut out = String::with_capacity(template.len());
    for segment in &segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Token { field, ops } => {
                let value = record
                    .get(field)
                    .ok_or_else(|| TemplateError::MissingField(field.clone()))?;
                out.push_str(&apply_ops(value, ops)?);
            }
        }
    }
    Ok(out)
}

/// True when any token in the template carries a `date.*` operation.
/// Malformed templates report false; render will surface the real error.
pub fn uses_date_operations(template: &str) -> bool {
    compile(template)
        .map(|segments| {
            segments.iter().any(|s| match s {
                Segment::Token { ops, .. } => ops.iter().any(|op| matches!(op, Op::Date(_))),
                Segment::Literal(_) => false,
            })
        })
        .unwrap_or(false)
}

/// Fields referenced by the template's tokens, in order of appearance.
pub fn referenced_fields(template: &str) -> Vec<String> {
    compile(template)
        .map(|segments| {
            segments
                .into_iter()
                .filter_map(|s| match s {
                    Segment::Token { field, .. } => Some(field),
                    Segment::Literal(_) => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn compile(template: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close_rel) = rest[open..].find('}') else {
            // Unmatched brace: everything from here on is literal.
            break;
        };
        let close = open + close_rel;
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        segments.push(parse_token(&rest[open + 1..close])?);
        rest = &rest[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

fn parse_token(content: &str) -> Result<Segment, TemplateError> {
    let mut parts = content.split('|');
    let field = parts.next().unwrap_or_default().trim().to_string();
    if field.is_empty() {
        return Err(TemplateError::MalformedOperation(
            "empty field name in template token".to_string(),
        ));
    }
    let ops = parts.map(parse_op).collect::<Result<Vec<_>, _>>()?;
    Ok(Segment::Token { field, ops })
}

fn parse_op(op: &str) -> Result<Op, TemplateError> {
    let op = op.trim();
    let Some((namespace, rest)) = op.split_once('.') else {
        return Err(TemplateError::MalformedOperation(format!(
            "operation '{}' is missing its namespace",
            op
        )));
    };
    match namespace {
        "date" => parse_date_op(rest).map(Op::Date),
        "str" => parse_str_op(rest).map(Op::Str),
        other => Err(TemplateError::UnknownOperation(format!("{}.{}", other, rest))),
    }
}

fn parse_date_op(rest: &str) -> Result<DateOp, TemplateError> {
    // `format` takes the remainder verbatim so the pattern may contain ':'.
    let (name, arg) = match rest.split_once(':') {
        Some((n, a)) => (n, Some(a)),
        None => (rest, None),
    };
    match (name, arg) {
        ("year", None) => Ok(DateOp::Year),
        ("month", None) => Ok(DateOp::Month),
        ("year_month", None) => Ok(DateOp::YearMonth),
        ("format", Some(fmt)) => Ok(DateOp::Format(fmt.to_string())),
        ("year" | "month" | "year_month", Some(_)) | ("format", None) => Err(
            TemplateError::MalformedOperation(format!("wrong argument count for date.{}", name)),
        ),
        _ => Err(TemplateError::UnknownOperation(format!("date.{}", name))),
    }
}

fn parse_str_op(rest: &str) -> Result<StrOp, TemplateError> {
    let mut parts = rest.split(':');
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();
    let arity_err =
        || TemplateError::MalformedOperation(format!("wrong argument count for str.{}", name));
    match name {
        "upper" => args.is_empty().then_some(StrOp::Upper).ok_or_else(arity_err),
        "lower" => args.is_empty().then_some(StrOp::Lower).ok_or_else(arity_err),
        "title" => args.is_empty().then_some(StrOp::Title).ok_or_else(arity_err),
        "sanitize" => args.is_empty().then_some(StrOp::Sanitize).ok_or_else(arity_err),
        "first_word" => args.is_empty().then_some(StrOp::FirstWord).ok_or_else(arity_err),
        "replace" => {
            if args.len() == 2 {
                Ok(StrOp::Replace(args[0].to_string(), args[1].to_string()))
            } else {
                Err(arity_err())
            }
        }
        "slice" => {
            if args.is_empty() || args.len() > 2 {
                return Err(arity_err());
            }
            let start = args[0]
                .parse::<i64>()
                .map_err(|_| TemplateError::MalformedOperation(format!(
                    "str.slice start index '{}' is not an integer",
                    args[0]
                )))?;
            let end = match args.get(1) {
                None => None,
                Some(s) if s.is_empty() => None,
                Some(s) => Some(s.parse::<i64>().map_err(|_| {
                    TemplateError::MalformedOperation(format!(
                        "str.slice end index '{}' is not an integer",
                        s
                    ))
                })?),
            };
            Ok(StrOp::Slice(start, end))
        }
        other => Err(TemplateError::UnknownOperation(format!("str.{}", other))),
    }
}

fn apply_ops(value: &CellValue, ops: &[Op]) -> Result<String, TemplateError> {
    let mut stage = Stage::from_cell(value);
    for op in ops {
        stage = match op {
            Op::Date(date_op) => {
                let dt = match stage {
                    Stage::Date(dt) => dt,
                    Stage::Text(s) => parse_date_text(&s)?,
                };
                Stage::Text(apply_date_op(dt, date_op))
            }
            Op::Str(str_op) => Stage::Text(apply_str_op(&stage.into_text(), str_op)),
        };
    }
    Ok(stage.finish())
}

fn parse_date_text(s: &str) -> Result<NaiveDateTime, TemplateError> {
    for fmt in DATE_PARSE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s.trim(), fmt) {
            return Ok(d.and_hms_opt(0, 0, 0).unwrap_or_default());
        }
    }
    Err(TemplateError::MalformedOperation(format!(
        "date operation applied to non-date value '{}'",
        s
    )))
}

fn apply_date_op(dt: NaiveDateTime, op: &DateOp) -> String {
    match op {
        DateOp::Year => dt.format("%Y").to_string(),
        DateOp::Month => dt.format("%m").to_string(),
        DateOp::YearMonth => dt.format("%Y-%m").to_string(),
        DateOp::Format(fmt) => dt.format(&rebuild_format(fmt)).to_string(),
    }
}

/// Strip literal `%` from the caller-supplied pattern, then re-mark the
/// directive letters chrono understands. "Y-m" and "%Y-%m" both become
/// the chrono pattern "%Y-%m".
fn rebuild_format(fmt: &str) -> String {
    let stripped: String = fmt.chars().filter(|c| *c != '%').collect();
    let mut out = String::with_capacity(stripped.len() * 2);
    for c in stripped.chars() {
        if FORMAT_DIRECTIVES.contains(&c) {
            out.push('%');
        }
        out.push(c);
    }
    out
}

fn apply_str_op(s: &str, op: &StrOp) -> String {
    match op {
        StrOp::Upper => s.to_uppercase(),
        StrOp::Lower => s.to_lowercase(),
        StrOp::Title => title_case(s),
        StrOp::Replace(old, new) => s.replace(old.as_str(), new),
        StrOp::Slice(start, end) => slice_chars(s, *start, *end),
        StrOp::Sanitize => sanitize_path_component(s),
        StrOp::FirstWord => s.split_whitespace().next().unwrap_or("").to_string(),
    }
}

/// Capitalize the first letter of every alphabetic run.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Python-style half-open character slicing with negative indices.
fn slice_chars(s: &str, start: i64, end: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let clamp = |i: i64| -> usize {
        if i < 0 {
            (len + i).max(0) as usize
        } else {
            i.min(len) as usize
        }
    };
    let a = clamp(start);
    let b = clamp(end.unwrap_or(len));
    if b <= a {
        String::new()
    } else {
        chars[a..b].iter().collect()
    }
}

/// Make a value safe for use inside a file path while keeping it readable.
pub fn sanitize_path_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '/' | '\\' => out.push('_'),
            ':' | '|' => out.push('-'),
            '*' => out.push('+'),
            '?' | '\0' => {}
            '"' => out.push('\''),
            '<' => out.push('('),
            '>' => out.push(')'),
            '\n' | '\r' | '\t' => out.push(' '),
            _ => out.push(c),
        }
    }
    let trimmed = out.trim_matches(|c| c == '.' || c == ' ');
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}
