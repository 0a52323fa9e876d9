//! Template resolution for step configuration.
//!
//! Any string inside a step's config may reference the execution context with
//! `{{path}}` placeholders. Paths are dot-separated keys with optional
//! bracketed indices: `step_abc.resumen.precio[0]`.
//!
//! - A string that is exactly one placeholder is replaced by the referenced
//!   value with its own type (number, object, array, boolean, null).
//! - Placeholders embedded in longer text are stringified and spliced in;
//!   objects and arrays render as compact JSON.
//! - Non-string leaves pass through untouched.
//!
//! Resolution is strict: a path that does not lead to a value is an error.
//!
//! ```
//! use conduit_template::resolve;
//! use serde_json::json;
//!
//! let context = json!({ "trigger": { "input": { "leadName": "Acme", "seats": 3 } } });
//! let config = json!({
//!   "title": "Quote for {{trigger.input.leadName}}",
//!   "seats": "{{trigger.input.seats}}",
//! });
//!
//! let resolved = resolve(&config, &context).unwrap();
//! assert_eq!(resolved, json!({ "title": "Quote for Acme", "seats": 3 }));
//! ```

mod error;
mod path;
mod resolve;

pub use error::{LookupError, TemplateError};
pub use path::{Path, Segment};
pub use resolve::{Scope, lookup, placeholders, resolve, stringify};
