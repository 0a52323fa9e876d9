use std::fmt;
use std::str::FromStr;

use crate::error::TemplateError;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Key(String),
  Index(usize),
}

/// A parsed placeholder path such as `step_abc.items[0].name`.
///
/// Keys accept letters, digits, `_`, `-` and `$`, so node ids like
/// `step_node-1` can be addressed directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
  raw: String,
  segments: Vec<Segment>,
}

impl Path {
  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  /// The first key, naming an entry of the execution context.
  pub fn root(&self) -> &str {
    match &self.segments[0] {
      Segment::Key(key) => key,
      Segment::Index(_) => unreachable!("paths always start with a key"),
    }
  }
}

impl fmt::Display for Path {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

fn is_key_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '$')
}

impl FromStr for Path {
  type Err = TemplateError;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    let invalid = |message: &str| TemplateError::InvalidPath {
      path: raw.to_string(),
      message: message.to_string(),
    };

    let mut segments = Vec::new();
    let mut chars = raw.trim().chars().peekable();
    let mut expect_key = true;

    while let Some(&c) = chars.peek() {
      if expect_key {
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
          if !is_key_char(c) {
            break;
          }
          key.push(c);
          chars.next();
        }
        if key.is_empty() {
          return Err(invalid(&format!("expected a key, found '{}'", c)));
        }
        segments.push(Segment::Key(key));
        expect_key = false;
        continue;
      }

      match c {
        '.' => {
          chars.next();
          expect_key = true;
        }
        '[' => {
          chars.next();
          let mut digits = String::new();
          while let Some(&d) = chars.peek() {
            if !d.is_ascii_digit() {
              break;
            }
            digits.push(d);
            chars.next();
          }
          if chars.next() != Some(']') || digits.is_empty() {
            return Err(invalid("expected an integer index followed by ']'"));
          }
          let index = digits
            .parse()
            .map_err(|_| invalid("index out of bounds for this platform"))?;
          segments.push(Segment::Index(index));
        }
        other => return Err(invalid(&format!("unexpected character '{}'", other))),
      }
    }

    if segments.is_empty() {
      return Err(invalid("path is empty"));
    }
    if expect_key {
      return Err(invalid("path ends with '.'"));
    }

    Ok(Self {
      raw: raw.trim().to_string(),
      segments,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(raw: &str) -> Vec<Segment> {
    raw.parse::<Path>().unwrap().segments().to_vec()
  }

  #[test]
  fn test_parse_keys_and_indices() {
    assert_eq!(
      parse("step_abc.resumen.precio[0]"),
      vec![
        Segment::Key("step_abc".to_string()),
        Segment::Key("resumen".to_string()),
        Segment::Key("precio".to_string()),
        Segment::Index(0),
      ]
    );
  }

  #[test]
  fn test_parse_consecutive_indices() {
    assert_eq!(
      parse("matrix[1][2]"),
      vec![
        Segment::Key("matrix".to_string()),
        Segment::Index(1),
        Segment::Index(2),
      ]
    );
  }

  #[test]
  fn test_parse_hyphenated_node_id() {
    let path: Path = " step_node-1.total ".parse().unwrap();
    assert_eq!(path.root(), "step_node-1");
    assert_eq!(path.as_str(), "step_node-1.total");
  }

  #[test]
  fn test_reject_malformed_paths() {
    for raw in ["", "a.", ".a", "a..b", "a[x]", "a[1", "[0]", "a b", "a[]"] {
      assert!(raw.parse::<Path>().is_err(), "expected '{}' to be rejected", raw);
    }
  }
}
