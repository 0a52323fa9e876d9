use conduit_config::{DataTransformConfig, Transformation};
use conduit_template::{Path, Scope, TemplateError, lookup};
use serde_json::{Map, Value};
use tracing::warn;

use crate::context::is_reserved;
use crate::error::StepError;
use crate::executor::StepOutput;

/// Run a node's transformations against the context.
///
/// One transformation produces its output directly. Several produce an object
/// keyed by each transformation's target, or by its position when it has
/// none. Every declared target is also bound as an alias to that
/// transformation's output.
pub fn transform<S: Scope + ?Sized>(
  node_id: &str,
  config: &DataTransformConfig,
  scope: &S,
) -> Result<StepOutput, StepError> {
  let mut warnings = Vec::new();
  let mut outputs = Vec::with_capacity(config.transformations.len());

  for transformation in &config.transformations {
    if let Some(target) = transformation.target().filter(|target| is_reserved(target)) {
      return Err(StepError::invalid_config(
        node_id,
        format!("'{}' is reserved and cannot be a transform target", target),
      ));
    }
    let output = apply(node_id, transformation, scope, &mut warnings)?;
    outputs.push((transformation.target(), output));
  }

  let aliases: Vec<(String, Value)> = outputs
    .iter()
    .filter_map(|(target, output)| target.map(|target| (target.to_string(), output.clone())))
    .collect();

  let value = if outputs.len() == 1 {
    outputs.swap_remove(0).1
  } else {
    Value::Object(
      outputs
        .into_iter()
        .enumerate()
        .map(|(index, (target, output))| {
          let key = target.map_or_else(|| index.to_string(), str::to_string);
          (key, output)
        })
        .collect(),
    )
  };

  Ok(StepOutput {
    value,
    warnings,
    aliases,
  })
}

fn apply<S: Scope + ?Sized>(
  node_id: &str,
  transformation: &Transformation,
  scope: &S,
  warnings: &mut Vec<String>,
) -> Result<Value, StepError> {
  match transformation {
    Transformation::Map {
      source, mapping, ..
    } => {
      let source_path: Path = source
        .parse()
        .map_err(|e| StepError::template(node_id, e))?;
      let value = lookup(scope, &source_path).map_err(|e| {
        StepError::template(
          node_id,
          TemplateError::Unresolved {
            path: source.clone(),
            source: e,
          },
        )
      })?;

      let fields = mapping
        .iter()
        .map(|(key, path)| {
          path
            .parse::<Path>()
            .map(|path| (key.as_str(), path))
            .map_err(|e| StepError::invalid_config(node_id, e))
        })
        .collect::<Result<Vec<_>, _>>()?;

      let mut map_one = |item: &Value, origin: String| {
        let mut out = Map::new();
        for (key, path) in &fields {
          let extracted = match lookup(item, path) {
            Ok(found) => found.clone(),
            Err(e) => {
              warn!(node_id, key = %key, path = %path, source = %origin, error = %e, "transform path not found");
              warnings.push(format!("{}: '{}' not found in {}: {}", key, path, origin, e));
              Value::Null
            }
          };
          out.insert(key.to_string(), extracted);
        }
        Value::Object(out)
      };

      Ok(match value {
        Value::Array(items) => Value::Array(
          items
            .iter()
            .enumerate()
            .map(|(index, item)| map_one(item, format!("{}[{}]", source, index)))
            .collect(),
        ),
        other => map_one(other, source.clone()),
      })
    }
  }
}
