//! Field resolution over upstream records.
//!
//! Every field resolves from the parent record alone. Siblings never see
//! each other's results, so a selection may be resolved in any order or in
//! parallel with the same outcome.

use crate::error::ExecutionError;
use crate::query::{PlannedField, PlannedKind};
use crate::schema::{FieldResolve, FieldSpec, ObjectType, ScalarType};
use indexmap::IndexMap;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// The untyped JSON object returned by the upstream, before field typing.
pub type RawRecord = serde_json::Map<String, Value>;

/// Response keys mapped to resolved values, in selection order.
pub type OutputRecord = IndexMap<String, Value>;

/// Resolves one declared field against the parent record.
///
/// An absent key resolves to `null`; resolution never fails.
pub fn resolve_field(spec: &FieldSpec, raw: &RawRecord) -> Value {
    match &spec.resolve {
        FieldResolve::Direct(key) => raw.get(key).cloned().unwrap_or(Value::Null),
        FieldResolve::Computed(transform) => transform(raw),
    }
}

/// Resolves a planned selection on `object` against the parent record.
pub fn resolve_object(
    object: &ObjectType,
    selection: &[PlannedField],
    raw: &RawRecord,
    parallel: bool,
) -> OutputRecord {
    let resolve_one = |planned: &PlannedField| {
        let value = match &planned.kind {
            PlannedKind::Typename => Value::String(object.name.clone()),
            PlannedKind::Field(name) => object
                .get_field(name)
                .map_or(Value::Null, |spec| resolve_field(spec, raw)),
        };
        (planned.response_key.clone(), value)
    };

    // Collecting through a Vec keeps selection order for both paths.
    let pairs: Vec<(String, Value)> = if parallel {
        selection.par_iter().map(resolve_one).collect()
    } else {
        selection.iter().map(resolve_one).collect()
    };

    pairs.into_iter().collect()
}

/// Arguments bound for a root field.
#[derive(Debug, Clone, Default)]
pub struct ResolverArgs {
    args: FxHashMap<String, Value>,
}

impl ResolverArgs {
    /// Creates resolver args from a list of (name, value) pairs.
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        Self {
            args: pairs.into_iter().collect(),
        }
    }

    /// Gets an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets a required string argument.
    ///
    /// An absent argument and an explicit `null` are both reported as missing.
    pub fn require_str(&self, name: &str) -> Result<&str, ExecutionError> {
        match self.get(name) {
            None | Some(Value::Null) => Err(ExecutionError::MissingArgument(name.to_string())),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ExecutionError::InvalidArgument {
                name: name.to_string(),
                expected: ScalarType::String,
                found: json_kind(other),
            }),
        }
    }
}

/// Short name of a JSON value's kind, for error messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "Boolean",
        Value::Number(n) if n.is_f64() => "Float",
        Value::Number(_) => "Int",
        Value::String(_) => "String",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
