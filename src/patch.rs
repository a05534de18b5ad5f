//! Pure optimistic transforms over cached collection values.
//!
//! Each transform takes the current cached value (absent when the collection
//! was never loaded) and returns the value the collection is expected to have
//! once the server accepts the mutation. Records outside the target are
//! carried over untouched.

use serde_json::Value;

pub trait OptimisticPatch: Send + Sync {
    /// Adds a provisional record. It usually has no server id yet.
    fn create(&self, current: Option<Value>, draft: &Value) -> Value;

    /// Shallow-merges `patch` onto the record with `id`.
    fn update(&self, current: Option<Value>, id: &str, patch: &Value) -> Value;

    /// Drops the record with `id`.
    fn remove(&self, current: Option<Value>, id: &str) -> Value;
}

/// A plain array of records, e.g. calendar events.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatCollection;

impl OptimisticPatch for FlatCollection {
    fn create(&self, current: Option<Value>, draft: &Value) -> Value {
        let mut records = records_of(current);
        records.push(draft.clone());
        Value::Array(records)
    }

    fn update(&self, current: Option<Value>, id: &str, patch: &Value) -> Value {
        let records = records_of(current)
            .into_iter()
            .map(|mut record| {
                if has_id(&record, id) {
                    merge_fields(&mut record, patch);
                }
                record
            })
            .collect();
        Value::Array(records)
    }

    fn remove(&self, current: Option<Value>, id: &str) -> Value {
        let records = records_of(current)
            .into_iter()
            .filter(|record| !has_id(record, id))
            .collect();
        Value::Array(records)
    }
}

/// Parent records that each own an array of child records, e.g. grocery
/// lists and their items. Mutations address the children.
#[derive(Debug, Clone, Copy)]
pub struct NestedCollection {
    /// Field on the parent holding the children (`items`).
    pub children: &'static str,
    /// Field on a child naming its parent's id (`listId`).
    pub parent_ref: &'static str,
}

impl NestedCollection {
    /// Runs `f` over each parent's child array in place. Parents without a
    /// child array are carried over as they are.
    fn map_children<F>(&self, current: Option<Value>, mut f: F) -> Value
    where
        F: FnMut(&str, &mut Vec<Value>),
    {
        let parents = records_of(current)
            .into_iter()
            .map(|mut parent| {
                let parent_id = id_of(&parent).unwrap_or_default();
                if let Some(Value::Array(children)) = parent.get_mut(self.children) {
                    f(&parent_id, children);
                }
                parent
            })
            .collect();
        Value::Array(parents)
    }
}

impl OptimisticPatch for NestedCollection {
    fn create(&self, current: Option<Value>, draft: &Value) -> Value {
        let Some(parent_id) = draft.get(self.parent_ref).and_then(id_string) else {
            return current.unwrap_or_else(|| Value::Array(Vec::new()));
        };
        self.map_children(current, |id, children| {
            if id == parent_id {
                children.push(draft.clone());
            }
        })
    }

    fn update(&self, current: Option<Value>, id: &str, patch: &Value) -> Value {
        self.map_children(current, |_, children| {
            for child in children.iter_mut().filter(|child| has_id(child, id)) {
                merge_fields(child, patch);
            }
        })
    }

    fn remove(&self, current: Option<Value>, id: &str) -> Value {
        self.map_children(current, |_, children| {
            children.retain(|child| !has_id(child, id));
        })
    }
}

/// Copies every top-level field of `patch` onto `record`.
pub fn merge_fields(record: &mut Value, patch: &Value) {
    let (Value::Object(target), Value::Object(fields)) = (record, patch) else {
        return;
    };
    for (name, value) in fields {
        target.insert(name.clone(), value.clone());
    }
}

pub fn has_id(record: &Value, id: &str) -> bool {
    id_of(record).is_some_and(|own| own == id)
}

fn id_of(record: &Value) -> Option<String> {
    record.get("id").and_then(id_string)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn records_of(current: Option<Value>) -> Vec<Value> {
    match current {
        Some(Value::Array(records)) => records,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{merge_fields, FlatCollection, NestedCollection, OptimisticPatch};

    const LISTS: NestedCollection = NestedCollection {
        children: "items",
        parent_ref: "listId",
    };

    fn lists() -> serde_json::Value {
        json!([
            { "id": "l1", "store": "Costco", "items": [
                { "id": "i1", "listId": "l1", "name": "Milk", "completed": false },
                { "id": "i2", "listId": "l1", "name": "Eggs", "completed": false }
            ]},
            { "id": "l2", "store": "Target", "items": [] }
        ])
    }

    #[test]
    fn flat_update_merges_only_target() {
        let current = json!([
            { "id": "e1", "title": "Dentist", "location": "Main St" },
            { "id": "e2", "title": "Soccer" }
        ]);
        let next = FlatCollection.update(Some(current), "e1", &json!({ "title": "Orthodontist" }));
        assert_eq!(
            next,
            json!([
                { "id": "e1", "title": "Orthodontist", "location": "Main St" },
                { "id": "e2", "title": "Soccer" }
            ])
        );
    }

    #[test]
    fn flat_create_and_remove() {
        let created = FlatCollection.create(None, &json!({ "title": "Picnic" }));
        assert_eq!(created, json!([{ "title": "Picnic" }]));

        let current = json!([{ "id": 7, "title": "a" }, { "id": 8, "title": "b" }]);
        assert_eq!(FlatCollection.remove(Some(current), "7"), json!([{ "id": 8, "title": "b" }]));
    }

    #[test]
    fn nested_update_reaches_child() {
        let next = LISTS.update(Some(lists()), "i2", &json!({ "completed": true }));
        assert_eq!(next[0]["items"][1]["completed"], json!(true));
        assert_eq!(next[0]["items"][0]["completed"], json!(false));
        assert_eq!(next[1], lists()[1]);
    }

    #[test]
    fn nested_create_appends_under_parent() {
        let next = LISTS.create(Some(lists()), &json!({ "listId": "l2", "name": "Bread" }));
        assert_eq!(next[1]["items"], json!([{ "listId": "l2", "name": "Bread" }]));
        assert_eq!(next[0], lists()[0]);
    }

    #[test]
    fn nested_create_without_parent_is_a_no_op() {
        let next = LISTS.create(Some(lists()), &json!({ "name": "Bread" }));
        assert_eq!(next, lists());
    }

    #[test]
    fn nested_remove_drops_child() {
        let next = LISTS.remove(Some(lists()), "i1");
        assert_eq!(next[0]["items"].as_array().map(Vec::len), Some(1));
        assert_eq!(next[0]["items"][0]["id"], json!("i2"));
    }

    #[test]
    fn nested_patches_leave_other_parents_alone() {
        let current = json!([
            { "id": "l1", "items": [{ "id": "i1", "listId": "l1", "completed": false }] },
            { "id": "l2", "store": "Target" },
            { "id": "l3", "items": null }
        ]);

        let updated = LISTS.update(Some(current.clone()), "i1", &json!({ "completed": true }));
        assert_eq!(updated[0]["items"][0]["completed"], json!(true));
        assert_eq!(updated[1], current[1]);
        assert_eq!(updated[2], current[2]);

        let removed = LISTS.remove(Some(current.clone()), "i1");
        assert_eq!(removed[0]["items"], json!([]));
        assert_eq!(removed[1], current[1]);
        assert_eq!(removed[2], current[2]);

        let created = LISTS.create(Some(current.clone()), &json!({ "listId": "l1", "name": "Jam" }));
        assert_eq!(created[0]["items"].as_array().map(Vec::len), Some(2));
        assert_eq!(created[1], current[1]);
        assert_eq!(created[2], current[2]);
    }

    #[test]
    fn merge_overwrites_and_ignores_non_objects() {
        let mut record = json!({ "id": "i1", "name": "Milk", "completed": false });
        merge_fields(&mut record, &json!({ "completed": true, "qty": 2 }));
        assert_eq!(
            record,
            json!({ "id": "i1", "name": "Milk", "completed": true, "qty": 2 })
        );

        let before = record.clone();
        merge_fields(&mut record, &json!(["completed"]));
        merge_fields(&mut record, &json!(null));
        assert_eq!(record, before);
    }
}
