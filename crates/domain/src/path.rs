//! Paths into serialized record data and the flat update patch.
//!
//! Records live inside a root's JSON tree. Two addressing modes are used:
//!
//! - [`FieldPath`]: dotted object-field segments (`system.bag.items`), the way
//!   a schema names a field relative to its owner.
//! - [`PathStep`] sequences: object fields *and* record ids, the way a record
//!   is located regardless of its current array index.
//!
//! The persistence substrate only understands [`UpdatePatch`]: a flat map of
//! dotted keys to whole replacement values. Numeric segments in a key index
//! into arrays.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;
use crate::ids::RecordId;

// =============================================================================
// Field paths
// =============================================================================

/// Dotted object path relative to a record or root (`system.bag.items`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parse a dotted path. Empty segments are dropped.
    pub fn parse(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// `prefix` followed by this path.
    pub fn prefixed(&self, prefix: &FieldPath) -> Self {
        let mut segments = prefix.0.clone();
        segments.extend(self.0.iter().cloned());
        Self(segments)
    }

    pub fn dotted(&self) -> String {
        self.0.join(".")
    }

    /// Object steps for every segment, root-to-leaf.
    pub fn steps(&self) -> impl Iterator<Item = PathStep> + '_ {
        self.0.iter().map(|s| PathStep::Object(s.clone()))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

// =============================================================================
// Path steps
// =============================================================================

/// One step of a traversal through serialized data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// Descend into the named object field.
    Object(String),
    /// Select the element of the current array whose `_id` matches.
    Array(RecordId),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(name) => write!(f, "{}", name),
            Self::Array(id) => write!(f, "[{}]", id),
        }
    }
}

/// Position of the element with `id` inside `array`.
pub fn index_of_id(array: &[Value], id: &RecordId) -> Option<usize> {
    array
        .iter()
        .position(|entry| entry.get("_id").and_then(Value::as_str) == Some(id.as_str()))
}

/// Follow `steps` from `value`.
pub fn resolve_steps<'a>(value: &'a Value, steps: &[PathStep]) -> Option<&'a Value> {
    let mut current = value;
    for step in steps {
        current = match step {
            PathStep::Object(name) => current.get(name.as_str())?,
            PathStep::Array(id) => {
                let array = current.as_array()?;
                &array[index_of_id(array, id)?]
            }
        };
    }
    Some(current)
}

/// Mutable variant of [`resolve_steps`].
pub fn resolve_steps_mut<'a>(value: &'a mut Value, steps: &[PathStep]) -> Option<&'a mut Value> {
    let mut current = value;
    for step in steps {
        current = match step {
            PathStep::Object(name) => current.get_mut(name.as_str())?,
            PathStep::Array(id) => {
                let array = current.as_array_mut()?;
                let index = index_of_id(array, id)?;
                &mut array[index]
            }
        };
    }
    Some(current)
}

// =============================================================================
// Update patch
// =============================================================================

/// Flat dotted-key → value patch understood by the root store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdatePatch(BTreeMap<String, Value>);

impl UpdatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(key: impl Into<String>, value: Value) -> Self {
        let mut patch = Self::new();
        patch.insert(key, value);
        patch
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply every entry to `target` with [`set_dotted`].
    pub fn apply_to(&self, target: &mut Value) -> Result<(), DomainError> {
        for (key, value) in &self.0 {
            set_dotted(target, key, value.clone())?;
        }
        Ok(())
    }
}

// =============================================================================
// Dotted access
// =============================================================================

/// Read a dotted path; numeric segments index arrays.
pub fn get_dotted<'a>(value: &'a Value, dotted: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in dotted.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(array) => array.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Replace the value at a dotted path, creating intermediate objects.
///
/// Numeric segments index existing arrays; an out-of-range index or a
/// non-numeric segment against an array is an error, never a silent write
/// to a different location.
pub fn set_dotted(target: &mut Value, dotted: &str, new_value: Value) -> Result<(), DomainError> {
    let segments: Vec<&str> = dotted.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        *target = new_value;
        return Ok(());
    };

    let mut current = target;
    for segment in parents {
        current = step_into(current, segment, dotted)?;
    }

    match current {
        Value::Array(array) => {
            let index = array_index(array, last, dotted)?;
            array[index] = new_value;
        }
        other => {
            if !other.is_object() {
                *other = Value::Object(Map::new());
            }
            if let Value::Object(map) = other {
                map.insert((*last).to_string(), new_value);
            }
        }
    }
    Ok(())
}

fn step_into<'a>(
    current: &'a mut Value,
    segment: &str,
    dotted: &str,
) -> Result<&'a mut Value, DomainError> {
    if let Value::Array(array) = current {
        let index = array_index(array, segment, dotted)?;
        return Ok(&mut array[index]);
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => Ok(map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        _ => Err(DomainError::invalid_path(dotted)),
    }
}

fn array_index(array: &[Value], segment: &str, dotted: &str) -> Result<usize, DomainError> {
    segment
        .parse::<usize>()
        .ok()
        .filter(|index| *index < array.len())
        .ok_or_else(|| {
            DomainError::invalid_path(format!(
                "{} (segment \"{}\" does not index an array of length {})",
                dotted,
                segment,
                array.len()
            ))
        })
}

/// JSON pointer for a list of segments (`["system", "bag"]` → `/system/bag`).
pub fn pointer_for<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| format!("/{}", s.as_ref().replace('~', "~0").replace('/', "~1")))
        .collect()
}

// =============================================================================
// Object merging
// =============================================================================

/// Expand dotted keys into nested objects (`{"a.b": 1}` → `{"a": {"b": 1}}`).
pub fn expand_object(source: Map<String, Value>) -> Map<String, Value> {
    let mut expanded = Map::new();
    for (key, value) in source {
        let value = match value {
            Value::Object(inner) => Value::Object(expand_object(inner)),
            other => other,
        };
        let segments: Vec<&str> = key.split('.').collect();
        insert_expanded(&mut expanded, &segments, value);
    }
    expanded
}

fn insert_expanded(target: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => match target.get_mut(*last) {
            Some(existing) if existing.is_object() && value.is_object() => {
                merge_object(existing, value);
            }
            _ => {
                target.insert((*last).to_string(), value);
            }
        },
        [head, rest @ ..] => {
            let slot = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                insert_expanded(child, rest, value);
            }
        }
    }
}

/// Deep-merge `source` into `target`.
///
/// Objects merge key by key; everything else (arrays included) is replaced
/// wholesale. A key of the form `-=name` removes `name` from the target.
pub fn merge_object(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                if let Some(removed) = key.strip_prefix("-=") {
                    target.remove(removed);
                    continue;
                }
                match target.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_object(existing, value);
                    }
                    _ => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_path_parses_and_joins() {
        let path = FieldPath::parse("system.bag.items");
        assert_eq!(path.len(), 3);
        assert_eq!(path.last(), Some("items"));
        assert_eq!(path.dotted(), "system.bag.items");
        assert_eq!(
            FieldPath::parse("effects").prefixed(&FieldPath::parse("system")).dotted(),
            "system.effects"
        );
        assert!(FieldPath::parse("").is_empty());
    }

    #[test]
    fn resolve_steps_selects_by_id_not_position() {
        let data = json!({"items": [{"_id": "a", "n": 1}, {"_id": "b", "n": 2}]});
        let steps = vec![
            PathStep::Object("items".into()),
            PathStep::Array(RecordId::new("b")),
        ];
        assert_eq!(resolve_steps(&data, &steps), Some(&json!({"_id": "b", "n": 2})));

        let missing = vec![
            PathStep::Object("items".into()),
            PathStep::Array(RecordId::new("zz")),
        ];
        assert_eq!(resolve_steps(&data, &missing), None);
    }

    #[test]
    fn set_dotted_creates_objects_and_indexes_arrays() {
        let mut data = json!({"items": [{"_id": "a", "effects": []}]});
        set_dotted(&mut data, "items.0.effects", json!([{"_id": "e"}])).expect("set");
        set_dotted(&mut data, "system.hp.value", json!(7)).expect("set");
        assert_eq!(data["items"][0]["effects"][0]["_id"], json!("e"));
        assert_eq!(data["system"]["hp"]["value"], json!(7));
    }

    #[test]
    fn set_dotted_rejects_out_of_range_index() {
        let mut data = json!({"items": [{"_id": "a"}]});
        let err = set_dotted(&mut data, "items.3.name", json!("x")).expect_err("out of range");
        assert!(matches!(err, DomainError::InvalidPath(_)));
        assert_eq!(data, json!({"items": [{"_id": "a"}]}));
    }

    #[test]
    fn get_dotted_reads_through_arrays() {
        let data = json!({"a": [{"b": 3}]});
        assert_eq!(get_dotted(&data, "a.0.b"), Some(&json!(3)));
        assert_eq!(get_dotted(&data, "a.1.b"), None);
        assert_eq!(get_dotted(&data, "a.x"), None);
    }

    #[test]
    fn expand_object_nests_dotted_keys() {
        let source = json!({"system.weight": 3, "system.tags": ["a"], "name": "Rope"});
        let Value::Object(map) = source else { panic!("object") };
        assert_eq!(
            Value::Object(expand_object(map)),
            json!({"system": {"weight": 3, "tags": ["a"]}, "name": "Rope"})
        );
    }

    #[test]
    fn expand_object_replaces_scalar_parents_and_merges_objects() {
        let source = json!({
            "flags": 1,
            "flags.loot": true,
            "system": {"weight": 3},
            "system.qty": 2
        });
        let Value::Object(map) = source else { panic!("object") };
        assert_eq!(
            Value::Object(expand_object(map)),
            json!({"flags": {"loot": true}, "system": {"weight": 3, "qty": 2}})
        );
    }

    #[test]
    fn merge_object_merges_deeply_and_deletes() {
        let mut target = json!({"name": "Rope", "system": {"weight": 1, "qty": 2, "tags": ["x"]}});
        merge_object(
            &mut target,
            json!({"system": {"weight": 5, "-=qty": null, "tags": ["y", "z"]}}),
        );
        assert_eq!(
            target,
            json!({"name": "Rope", "system": {"weight": 5, "tags": ["y", "z"]}})
        );
    }

    #[test]
    fn pointer_escapes_segments() {
        assert_eq!(pointer_for(&["system", "a/b", "c~d"]), "/system/a~1b/c~0d");
        assert_eq!(pointer_for::<&str>(&[]), "");
    }

    #[test]
    fn patch_applies_every_key() {
        let mut data = json!({"system": {"bag": {"items": []}}, "name": "Hero"});
        let mut patch = UpdatePatch::single("system.bag.items", json!([{"_id": "s"}]));
        patch.insert("name", json!("Heroine"));
        patch.apply_to(&mut data).expect("apply");
        assert_eq!(
            data,
            json!({"system": {"bag": {"items": [{"_id": "s"}]}}, "name": "Heroine"})
        );
    }
}
