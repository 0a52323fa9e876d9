use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{LookupError, TemplateError};
use crate::path::{Path, Segment};

static PLACEHOLDER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder pattern is valid"));

/// Something paths can be resolved against.
pub trait Scope {
  /// Look up the first segment of a path.
  fn get_root(&self, key: &str) -> Result<&Value, LookupError>;
}

impl Scope for Value {
  fn get_root(&self, key: &str) -> Result<&Value, LookupError> {
    step(self, &Segment::Key(key.to_string()))
  }
}

impl Scope for serde_json::Map<String, Value> {
  fn get_root(&self, key: &str) -> Result<&Value, LookupError> {
    self.get(key).ok_or_else(|| LookupError::MissingKey {
      key: key.to_string(),
    })
  }
}

/// Resolve every placeholder in a config tree against `scope`.
pub fn resolve<S: Scope + ?Sized>(value: &Value, scope: &S) -> Result<Value, TemplateError> {
  match value {
    Value::String(text) => resolve_str(text, scope),
    Value::Array(items) => items
      .iter()
      .map(|item| resolve(item, scope))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::Array),
    Value::Object(map) => map
      .iter()
      .map(|(key, item)| resolve(item, scope).map(|resolved| (key.clone(), resolved)))
      .collect::<Result<serde_json::Map<_, _>, _>>()
      .map(Value::Object),
    other => Ok(other.clone()),
  }
}

/// Follow `path` through `scope`.
pub fn lookup<'a, S: Scope + ?Sized>(scope: &'a S, path: &Path) -> Result<&'a Value, LookupError> {
  let mut current = scope.get_root(path.root())?;
  for segment in &path.segments()[1..] {
    current = step(current, segment)?;
  }
  Ok(current)
}

/// The raw path text of every placeholder in `text`, in order.
pub fn placeholders(text: &str) -> impl Iterator<Item = &str> {
  PLACEHOLDER
    .captures_iter(text)
    .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

/// Render a value for splicing into a string. Strings are inserted verbatim,
/// everything else as compact JSON.
pub fn stringify(value: &Value) -> String {
  match value {
    Value::String(text) => text.clone(),
    other => other.to_string(),
  }
}

fn resolve_str<S: Scope + ?Sized>(text: &str, scope: &S) -> Result<Value, TemplateError> {
  let captures: Vec<_> = PLACEHOLDER.captures_iter(text).collect();
  if captures.is_empty() {
    return Ok(Value::String(text.to_string()));
  }

  // Exactly one placeholder and nothing around it: keep the native type.
  if let [caps] = captures.as_slice() {
    let whole = caps.get(0).map(|m| m.range());
    if whole == Some(0..text.len()) {
      return resolve_path(&caps[1], scope).cloned();
    }
  }

  let mut out = String::with_capacity(text.len());
  let mut last = 0;
  for caps in &captures {
    let Some(whole) = caps.get(0) else {
      continue;
    };
    out.push_str(&text[last..whole.start()]);
    out.push_str(&stringify(resolve_path(&caps[1], scope)?));
    last = whole.end();
  }
  out.push_str(&text[last..]);

  Ok(Value::String(out))
}

fn resolve_path<'a, S: Scope + ?Sized>(raw: &str, scope: &'a S) -> Result<&'a Value, TemplateError> {
  let path: Path = raw.parse()?;
  lookup(scope, &path).map_err(|source| TemplateError::Unresolved {
    path: path.to_string(),
    source,
  })
}

fn step<'a>(value: &'a Value, segment: &Segment) -> Result<&'a Value, LookupError> {
  match (segment, value) {
    (Segment::Key(key), Value::Object(map)) => {
      map
        .get(key)
        .ok_or_else(|| LookupError::MissingKey { key: key.clone() })
    }
    (Segment::Index(index), Value::Array(items)) => {
      items.get(*index).ok_or(LookupError::IndexOutOfRange {
        index: *index,
        len: items.len(),
      })
    }
    (Segment::Key(key), other) => Err(LookupError::NotTraversable {
      segment: key.clone(),
      found: type_name(other),
    }),
    (Segment::Index(index), other) => Err(LookupError::NotTraversable {
      segment: format!("[{}]", index),
      found: type_name(other),
    }),
  }
}

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
