#![forbid(unsafe_code)]

//! Conversion between graph values and `serde_json` values.
//!
//! Useful for seeding view-models from fixtures and for snapshotting state in
//! tests. Export follows `JSON.stringify` conventions: undefined properties
//! are skipped, non-finite numbers and opaque values become `null`, and a
//! node already on the current path (a cycle) is written as `null`.

use std::rc::Rc;

use serde_json::{Map, Number, Value as Json};

use crate::graph::{Graph, NodeId};
use crate::value::Value;

impl Graph {
    /// Build raw nodes from JSON.
    pub fn from_json(&self, json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            Json::String(s) => Value::Str(Rc::from(s.as_str())),
            Json::Array(items) => {
                let values: Vec<Value> = items.iter().map(|item| self.from_json(item)).collect();
                Value::Node(self.array(values))
            }
            Json::Object(props) => {
                let entries: Vec<(Rc<str>, Value)> = props
                    .iter()
                    .map(|(k, v)| (Rc::from(k.as_str()), self.from_json(v)))
                    .collect();
                Value::Node(self.object(entries))
            }
        }
    }

    /// Build view-models from JSON.
    pub fn vm_from_json(&self, json: &Json) -> Value {
        let value = self.from_json(json);
        self.wrap(value)
    }

    /// Export a value as JSON.
    #[must_use]
    pub fn to_json(&self, value: &Value) -> Json {
        let mut path = Vec::new();
        self.export(value, &mut path)
    }

    fn export(&self, value: &Value, path: &mut Vec<NodeId>) -> Json {
        match value {
            Value::Undefined | Value::Null | Value::Opaque(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.to_string()),
            Value::Node(id) => {
                if path.contains(id) || !self.contains(*id) {
                    return Json::Null;
                }
                path.push(*id);
                let json = if self.is_array(*id) {
                    Json::Array(
                        self.values(*id)
                            .iter()
                            .map(|item| self.export(item, path))
                            .collect(),
                    )
                } else {
                    let mut map = Map::new();
                    for key in self.keys(*id) {
                        let prop = self.get(*id, key.clone());
                        if prop.is_undefined() {
                            continue;
                        }
                        map.insert(key.to_string(), self.export(&prop, path));
                    }
                    Json::Object(map)
                };
                path.pop();
                json
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn import_wraps_deeply() {
        let graph = Graph::new();
        let root = graph
            .vm_from_json(&json!({"user": {"name": "ada"}, "tags": ["a", "b"]}))
            .as_node()
            .unwrap();
        let user = graph.get(root, "user");
        assert!(graph.is_view_model(&user));
        assert_eq!(graph.get_path(root, "tags.1").as_str(), Some("b"));
    }

    #[test]
    fn export_skips_undefined_and_cycles() {
        let graph = Graph::new();
        let root = graph.vm_object([("a", Value::from(1)), ("gone", Value::Undefined)]);
        graph.set(root, "self", root).unwrap();
        assert_eq!(graph.to_json(&Value::Node(root)), json!({"a": 1.0, "self": null}));
    }

    #[test]
    fn export_non_finite_as_null() {
        let graph = Graph::new();
        let arr = graph.array([f64::NAN, 1.0]);
        assert_eq!(graph.to_json(&Value::Node(arr)), json!([null, 1.0]));
    }
}
