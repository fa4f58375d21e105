//! Shared backing data.
//!
//! A root's serialized data lives in exactly one [`SourceTree`]. Records and
//! collections never copy it: they hold a [`SourceHandle`] that addresses
//! their node by field names and record ids, and read or mutate the node in
//! place. Addressing by id rather than array index keeps a handle valid
//! while siblings are inserted or removed.
//!
//! Closures passed to `read`/`write` run under the tree lock and must not
//! reach back into the record layer.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use sheetstore_domain::{
    resolve_steps, resolve_steps_mut, type_name, FieldPath, PathStep, RecordId,
};

/// Why [`SourceHandle::write_array`] could not reach its array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayConflict {
    /// The handle's own node does not resolve.
    Unresolved,
    /// `path` holds a `found` value where an `expected` one belongs.
    Occupied {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl ArrayConflict {
    fn occupied(segments: &[String], expected: &'static str, value: &Value) -> Self {
        Self::Occupied {
            path: segments.join("."),
            expected,
            found: type_name(value),
        }
    }
}

#[derive(Debug)]
pub struct SourceTree {
    data: RwLock<Value>,
}

impl SourceTree {
    pub fn new(data: Value) -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(data),
        })
    }

    /// Deep copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.data.read().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.data.read())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.data.write())
    }
}

/// Address of one node inside a [`SourceTree`].
#[derive(Debug, Clone)]
pub struct SourceHandle {
    tree: Arc<SourceTree>,
    steps: Vec<PathStep>,
}

impl SourceHandle {
    /// Handle to the top of `tree`.
    pub fn root(tree: Arc<SourceTree>) -> Self {
        Self {
            tree,
            steps: Vec::new(),
        }
    }

    pub fn tree(&self) -> &Arc<SourceTree> {
        &self.tree
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Descend through the object fields of `path`.
    pub fn field(&self, path: &FieldPath) -> Self {
        let mut steps = self.steps.clone();
        steps.extend(path.steps());
        Self {
            tree: self.tree.clone(),
            steps,
        }
    }

    /// Select the array element with `id`.
    pub fn entry(&self, id: &RecordId) -> Self {
        let mut steps = self.steps.clone();
        steps.push(PathStep::Array(id.clone()));
        Self {
            tree: self.tree.clone(),
            steps,
        }
    }

    /// Copy of the addressed node.
    pub fn get(&self) -> Option<Value> {
        self.read(|node| node.cloned())
    }

    pub fn exists(&self) -> bool {
        self.read(|node| node.is_some())
    }

    pub fn read<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        self.tree.read(|data| f(resolve_steps(data, &self.steps)))
    }

    pub fn write<R>(&self, f: impl FnOnce(Option<&mut Value>) -> R) -> R {
        self.tree.write(|data| f(resolve_steps_mut(data, &self.steps)))
    }

    /// Mutate the array at `path` below this node, creating it (and any
    /// missing intermediate objects) when absent or null.
    ///
    /// A node on the way that holds anything else is left untouched and
    /// reported as [`ArrayConflict::Occupied`].
    pub fn write_array<R>(
        &self,
        path: &FieldPath,
        f: impl FnOnce(&mut Vec<Value>) -> R,
    ) -> Result<R, ArrayConflict> {
        self.write(|node| {
            let mut current = node.ok_or(ArrayConflict::Unresolved)?;
            let segments = path.segments();
            for (depth, segment) in segments.iter().enumerate() {
                if current.is_null() {
                    *current = Value::Object(Map::new());
                }
                current = match current {
                    Value::Object(map) => map.entry(segment.clone()).or_insert(Value::Null),
                    other => return Err(ArrayConflict::occupied(&segments[..depth], "object", other)),
                };
            }
            if current.is_null() {
                *current = Value::Array(Vec::new());
            }
            match current {
                Value::Array(array) => Ok(f(array)),
                other => Err(ArrayConflict::occupied(segments, "array", other)),
            }
        })
    }

    /// Whether both handles address the same node of the same tree.
    pub fn same_node(&self, other: &SourceHandle) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.steps == other.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Arc<SourceTree> {
        SourceTree::new(json!({
            "system": {"bag": {"items": [
                {"_id": "a", "name": "Rope"},
                {"_id": "b", "name": "Torch"}
            ]}}
        }))
    }

    #[test]
    fn handles_share_one_tree() {
        let tree = tree();
        let items = SourceHandle::root(tree.clone()).field(&FieldPath::parse("system.bag.items"));
        let torch = items.entry(&RecordId::new("b"));

        torch.write(|node| {
            if let Some(Value::Object(map)) = node {
                map.insert("lit".into(), json!(true));
            }
        });

        assert_eq!(tree.snapshot()["system"]["bag"]["items"][1]["lit"], json!(true));
        assert_eq!(torch.get().map(|v| v["name"].clone()), Some(json!("Torch")));
    }

    #[test]
    fn entry_handle_survives_sibling_removal() {
        let tree = tree();
        let items = SourceHandle::root(tree.clone()).field(&FieldPath::parse("system.bag.items"));
        let torch = items.entry(&RecordId::new("b"));

        items.write(|node| {
            if let Some(Value::Array(array)) = node {
                array.remove(0);
            }
        });

        assert_eq!(torch.get(), Some(json!({"_id": "b", "name": "Torch"})));
        assert!(!items.entry(&RecordId::new("a")).exists());
    }

    #[test]
    fn write_array_creates_missing_fields() {
        let tree = SourceTree::new(json!({"_id": "hero"}));
        let root = SourceHandle::root(tree.clone());
        let len = root.write_array(&FieldPath::parse("system.bag.items"), |array| {
            array.push(json!({"_id": "x"}));
            array.len()
        });
        assert_eq!(len, Ok(1));
        assert_eq!(tree.snapshot()["system"]["bag"]["items"], json!([{"_id": "x"}]));
    }

    #[test]
    fn write_array_on_missing_node_is_unresolved() {
        let root = SourceHandle::root(tree());
        let ghost = root
            .field(&FieldPath::parse("system.bag.items"))
            .entry(&RecordId::new("ghost"));
        assert_eq!(
            ghost.write_array(&FieldPath::parse("effects"), |a| a.len()),
            Err(ArrayConflict::Unresolved)
        );
    }

    #[test]
    fn write_array_fills_null_fields() {
        let tree = SourceTree::new(json!({"flags": null}));
        let root = SourceHandle::root(tree.clone());
        let len = root.write_array(&FieldPath::parse("flags.loot"), |array| array.len());
        assert_eq!(len, Ok(0));
        assert_eq!(tree.snapshot(), json!({"flags": {"loot": []}}));
    }

    #[test]
    fn write_array_leaves_foreign_values_alone() {
        let data = json!({"flags": {"loot": {"gold": 40}, "note": "heavy"}});
        let tree = SourceTree::new(data.clone());
        let root = SourceHandle::root(tree.clone());

        let leaf = root.write_array(&FieldPath::parse("flags.loot"), |array| array.len());
        assert_eq!(
            leaf,
            Err(ArrayConflict::Occupied {
                path: "flags.loot".into(),
                expected: "array",
                found: "object",
            })
        );

        let intermediate = root.write_array(&FieldPath::parse("flags.note.items"), |array| array.len());
        assert_eq!(
            intermediate,
            Err(ArrayConflict::Occupied {
                path: "flags.note".into(),
                expected: "object",
                found: "string",
            })
        );
        assert_eq!(tree.snapshot(), data);
    }
}
