//! Compiles a schema document into a flat section/key type table.
use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use super::{ConfigKind, TypeInfo};
use crate::error::SchemaError;

/// Maximum nesting followed while resolving a single key or section shape.
const MAX_DEPTH: usize = 32;

/// Prefix stripped from `$ref` targets before looking them up.
const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Type table and repeatable-section set for one configuration kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindIndex {
    /// Section name to key name to resolved type.
    pub types: BTreeMap<String, BTreeMap<String, TypeInfo>>,
    /// Sections whose schema offers an array alternative.
    pub repeatable: BTreeSet<String>,
}

/// Build the index for `kind`, degrading to an empty index on a malformed
/// schema.
#[must_use]
pub fn build_index(kind: ConfigKind, schema: &Value) -> KindIndex {
    try_build_index(kind, schema).unwrap_or_else(|e| {
        tracing::warn!("using empty type index for {kind}: {e}");
        KindIndex::default()
    })
}

/// Build the index for `kind`.
///
/// Each top-level section property is marked repeatable if one of its
/// `oneOf` alternatives has `type: array`. Its object shape is located by
/// descending `properties`, `oneOf`, `items` and `$ref`; every key in that
/// shape is resolved to a [`TypeInfo`]. Sections with no discoverable shape
/// are skipped, leaving their keys as scalar strings.
///
/// # Errors
///
/// Returns [`SchemaError::MissingProperties`] if the document has no
/// top-level `properties` object.
pub fn try_build_index(kind: ConfigKind, schema: &Value) -> Result<KindIndex, SchemaError> {
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::MissingProperties {
            kind: kind.to_string(),
        })?;
    let empty = Map::new();
    let resolver = Resolver {
        definitions: schema
            .get("definitions")
            .and_then(Value::as_object)
            .unwrap_or(&empty),
    };

    let mut index = KindIndex::default();
    for (section, definition) in properties {
        if !definition.is_object() {
            continue;
        }
        if has_array_alternative(definition) {
            index.repeatable.insert(section.clone());
        }
        let Some(shape) = resolver.find_shape(definition, &mut Vec::new(), 0) else {
            tracing::debug!("{kind}: section {section} has no object shape");
            continue;
        };
        let keys = shape
            .iter()
            .filter(|(_, def)| def.is_object())
            .map(|(key, def)| (key.clone(), resolver.resolve(def)))
            .collect();
        index.types.insert(section.clone(), keys);
    }

    tracing::debug!(
        "{kind}: indexed {} sections, {} repeatable",
        index.types.len(),
        index.repeatable.len()
    );
    Ok(index)
}

/// Whether a section definition has a `oneOf` alternative typed as an array.
fn has_array_alternative(definition: &Value) -> bool {
    definition
        .get("oneOf")
        .and_then(Value::as_array)
        .is_some_and(|alternatives| {
            alternatives
                .iter()
                .any(|alt| type_names(alt).any(|t| t == "array"))
        })
}

/// The `type` of a node as individual names; `type` may be a string or a
/// list of strings.
fn type_names(node: &Value) -> impl Iterator<Item = &str> {
    let (single, list) = match node.get("type") {
        Some(Value::String(t)) => (Some(t.as_str()), None),
        Some(Value::Array(ts)) => (None, Some(ts.iter().filter_map(Value::as_str))),
        _ => (None, None),
    };
    single.into_iter().chain(list.into_iter().flatten())
}

/// Definition lookups for one schema document.
struct Resolver<'a> {
    definitions: &'a Map<String, Value>,
}

impl<'a> Resolver<'a> {
    /// Follow a `$ref`, refusing names already on the current path.
    fn follow(&self, reference: &str, path: &[String]) -> Option<(&'a Value, String)> {
        let name = reference
            .strip_prefix(DEFINITIONS_PREFIX)
            .unwrap_or(reference);
        if path.iter().any(|seen| seen == name) {
            return None;
        }
        self.definitions
            .get(name)
            .map(|target| (target, name.to_string()))
    }

    /// Find the first `properties` map reachable from `node`.
    fn find_shape(
        &self,
        node: &'a Value,
        path: &mut Vec<String>,
        depth: usize,
    ) -> Option<&'a Map<String, Value>> {
        if depth > MAX_DEPTH {
            return None;
        }
        if let Some(properties) = node.get("properties").and_then(Value::as_object) {
            return Some(properties);
        }
        if let Some(reference) = node.get("$ref").and_then(Value::as_str) {
            let (target, name) = self.follow(reference, path)?;
            path.push(name);
            let found = self.find_shape(target, path, depth + 1);
            path.pop();
            return found;
        }
        let alternatives = node.get("oneOf").and_then(Value::as_array);
        for alt in alternatives.into_iter().flatten() {
            if let Some(found) = self.find_shape(alt, path, depth + 1) {
                return Some(found);
            }
        }
        node.get("items")
            .and_then(|items| self.find_shape(items, path, depth + 1))
    }

    /// Resolve the cumulative type of one key definition.
    fn resolve(&self, definition: &Value) -> TypeInfo {
        let mut info = TypeInfo::default();
        self.accumulate(definition, &mut Vec::new(), 0, &mut info);
        info
    }

    fn accumulate(&self, node: &Value, path: &mut Vec<String>, depth: usize, info: &mut TypeInfo) {
        if depth > MAX_DEPTH {
            return;
        }
        if let Some(reference) = node.get("$ref").and_then(Value::as_str) {
            if let Some((target, name)) = self.follow(reference, path) {
                path.push(name);
                self.accumulate(target, path, depth + 1, info);
                path.pop();
            }
            return;
        }

        for name in type_names(node) {
            match name {
                "boolean" => info.is_bool = true,
                "integer" => info.is_int = true,
                "array" => info.is_array = true,
                _ => {}
            }
        }

        for combinator in ["oneOf", "anyOf", "allOf"] {
            let branches = node.get(combinator).and_then(Value::as_array);
            for branch in branches.into_iter().flatten() {
                self.accumulate(branch, path, depth + 1, info);
            }
        }
        if let Some(items) = node.get("items") {
            self.accumulate(items, path, depth + 1, info);
        }
    }
}
