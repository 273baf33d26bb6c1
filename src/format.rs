//! Event-to-record formatting.
//!
//! Formatting happens before events enter the batcher, so the batching core
//! only ever sees opaque records. [`TemplateFormatter`] turns JSON events into
//! line-protocol [`Point`]s by expanding `%{field}` references.

use serde_json::Value;

/// Transform a caller event into the record shape a sink expects.
pub trait RecordFormatter<E> {
    type Record;

    fn format(&self, event: &E) -> Self::Record;
}

/// One formatted event: a series name plus its rendered data points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    pub name: String,
    pub lines: Vec<String>,
}

impl Point {
    /// Encoded size of this point's lines including terminators.
    pub fn encoded_len(&self) -> usize {
        self.lines.iter().map(|line| line.len() + 1).sum()
    }
}

/// Formatter driven by `%{field}` templates.
///
/// The name template and every data-point template are expanded against
/// the event. Unresolvable references are left in place verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFormatter {
    name: String,
    data_points: Vec<String>,
}

impl TemplateFormatter {
    pub fn new(name: impl Into<String>, data_points: Vec<String>) -> Self {
        Self {
            name: name.into(),
            data_points,
        }
    }
}

impl RecordFormatter<Value> for TemplateFormatter {
    type Record = Point;

    fn format(&self, event: &Value) -> Point {
        Point {
            name: expand(&self.name, event),
            lines: self
                .data_points
                .iter()
                .map(|template| expand(template, event))
                .collect(),
        }
    }
}

/// Expand every `%{reference}` in `template` using fields of `event`.
///
/// A reference may be a top-level key, a dotted path (`host.name`) or a
/// bracketed path (`[host][name]`). Array elements are addressed by index.
pub fn expand(template: &str, event: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated reference: keep the tail as-is.
            out.push_str(&rest[start..]);
            return out;
        };

        let reference = &after[..end];
        match lookup(event, reference) {
            Some(value) => render(&mut out, value),
            None => {
                out.push_str("%{");
                out.push_str(reference);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn lookup<'a>(event: &'a Value, reference: &str) -> Option<&'a Value> {
    if reference.is_empty() {
        return None;
    }
    if let Some(value) = event.get(reference) {
        return non_null(value);
    }

    let path: Vec<&str> = if reference.starts_with('[') && reference.ends_with(']') {
        reference[1..reference.len() - 1].split("][").collect()
    } else {
        reference.split('.').collect()
    };

    let found = path.into_iter().try_fold(event, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })?;
    non_null(found)
}

fn non_null(value: &Value) -> Option<&Value> {
    (!value.is_null()).then_some(value)
}

fn render(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render(out, item);
            }
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Build a bulk request body from a batch of points.
///
/// Every line of every point is written in order, newline-terminated.
pub fn encode_body(points: &[Point]) -> String {
    let mut body = String::with_capacity(points.iter().map(Point::encoded_len).sum());
    for point in points {
        for line in &point.lines {
            body.push_str(line);
            body.push('\n');
        }
    }
    body
}
