//! Response envelopes and expanded-row nesting.

use serde_json::{Map, Value};

/// Collection envelope: context, optional count and links, then `value`.
pub fn collection_envelope(
    context: String,
    rows: Vec<Value>,
    count: Option<i64>,
    next_link: Option<String>,
    delta_link: Option<String>,
) -> Value {
    let mut body = Map::new();
    body.insert("@odata.context".into(), Value::String(context));
    if let Some(count) = count {
        body.insert("@odata.count".into(), Value::from(count));
    }
    if let Some(link) = next_link {
        body.insert("@odata.nextLink".into(), Value::String(link));
    }
    if let Some(link) = delta_link {
        body.insert("@odata.deltaLink".into(), Value::String(link));
    }
    body.insert("value".into(), Value::Array(rows));
    Value::Object(body)
}

/// Single-entity envelope: fields inline alongside the context.
pub fn entity_envelope(context: String, row: Value) -> Value {
    let mut body = Map::new();
    body.insert("@odata.context".into(), Value::String(context));
    if let Value::Object(fields) = row {
        for (key, value) in fields {
            body.insert(key, value);
        }
    }
    Value::Object(body)
}

/// Error envelope: `{"error":{"code","message"}}`.
pub fn error_envelope(code: &str, message: &str) -> Value {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}

/// A nesting instruction for one expanded navigation: the chain of
/// navigation names from the root. Columns of that entity arrive flattened
/// as `<chain joined by _>_<column>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpandPrefix {
    pub path: Vec<String>,
}

impl ExpandPrefix {
    pub fn new(path: Vec<String>) -> Self {
        Self { path }
    }

    fn alias(&self) -> String {
        let mut alias = self.path.join("_");
        alias.push('_');
        alias
    }
}

/// Reassemble nested objects from flattened join aliases, in place.
///
/// An expanded side whose columns are all NULL (no join match) collapses to
/// `null`.
pub fn nest_expanded_rows(rows: &mut [Value], prefixes: &[ExpandPrefix]) {
    for row in rows {
        nest_expanded_row(row, prefixes);
    }
}

fn nest_expanded_row(row: &mut Value, prefixes: &[ExpandPrefix]) {
    let Some(object) = row.as_object_mut() else {
        return;
    };

    // Extract deepest chains first so a parent prefix never captures its
    // children's flattened columns.
    let mut ordered: Vec<&ExpandPrefix> = prefixes.iter().collect();
    ordered.sort_by_key(|p| std::cmp::Reverse(p.path.len()));

    let mut extracted: Vec<(&ExpandPrefix, Map<String, Value>)> = Vec::new();
    for prefix in ordered {
        let alias = prefix.alias();
        let keys: Vec<String> = object
            .keys()
            .filter(|key| key.starts_with(&alias))
            .cloned()
            .collect();

        let mut nested = Map::new();
        for key in keys {
            if let Some(value) = object.remove(&key) {
                nested.insert(key[alias.len()..].to_string(), value);
            }
        }
        extracted.push((prefix, nested));
    }

    // Insert shallowest-first so parents exist before their children.
    extracted.sort_by_key(|(prefix, _)| prefix.path.len());
    for (prefix, nested) in extracted {
        let value = if !nested.is_empty() && nested.values().all(Value::is_null) {
            Value::Null
        } else {
            Value::Object(nested)
        };
        insert_at_path(object, &prefix.path, value);
    }
}

fn insert_at_path(object: &mut Map<String, Value>, path: &[String], value: Value) {
    match path {
        [] => {}
        [leaf] => {
            object.insert(leaf.clone(), value);
        }
        [head, rest @ ..] => match object.get_mut(head) {
            Some(Value::Object(child)) => insert_at_path(child, rest, value),
            // Parent collapsed to null (no join match): drop the child.
            _ => {}
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_collection_envelope() {
        let body = collection_envelope(
            "http://h/$metadata#Products".into(),
            vec![json!({"id": 1})],
            Some(10),
            None,
            Some("http://h/Products?$deltatoken=1".into()),
        );

        assert_eq!(body["@odata.context"], "http://h/$metadata#Products");
        assert_eq!(body["@odata.count"], 10);
        assert_eq!(body["@odata.deltaLink"], "http://h/Products?$deltatoken=1");
        assert_eq!(body["value"][0]["id"], 1);
    }

    #[test]
    fn test_entity_envelope_inlines_fields() {
        let body = entity_envelope(
            "http://h/$metadata#Products/$entity".into(),
            json!({"id": 1, "name": "Widget"}),
        );

        assert_eq!(body["@odata.context"], "http://h/$metadata#Products/$entity");
        assert_eq!(body["name"], "Widget");
        assert!(body.get("value").is_none());
    }

    #[test]
    fn test_error_envelope() {
        let body = error_envelope("404", "Resource not found: X");
        assert_eq!(body["error"]["code"], "404");
    }

    #[test]
    fn test_nest_single_level() {
        let mut rows = vec![json!({
            "id": 1,
            "customer_id": 3,
            "customer_name": "Ada",
        })];

        nest_expanded_rows(&mut rows, &[ExpandPrefix::new(vec!["customer".into()])]);

        assert_eq!(rows[0], json!({"id": 1, "customer": {"id": 3, "name": "Ada"}}));
    }

    #[test]
    fn test_nest_two_levels() {
        let mut rows = vec![json!({
            "id": 1,
            "customer_id": 3,
            "customer_name": "Ada",
            "customer_region_id": 9,
            "customer_region_name": "EU",
        })];

        nest_expanded_rows(
            &mut rows,
            &[
                ExpandPrefix::new(vec!["customer".into()]),
                ExpandPrefix::new(vec!["customer".into(), "region".into()]),
            ],
        );

        assert_eq!(
            rows[0],
            json!({
                "id": 1,
                "customer": {
                    "id": 3,
                    "name": "Ada",
                    "region": {"id": 9, "name": "EU"},
                }
            })
        );
    }

    #[test]
    fn test_all_null_side_collapses_to_null() {
        let mut rows = vec![json!({
            "id": 1,
            "customer_id": null,
            "customer_name": null,
        })];

        nest_expanded_rows(&mut rows, &[ExpandPrefix::new(vec!["customer".into()])]);

        assert_eq!(rows[0], json!({"id": 1, "customer": null}));
    }

    #[test]
    fn test_child_under_null_parent_dropped() {
        let mut rows = vec![json!({
            "id": 1,
            "customer_id": null,
            "customer_name": null,
            "customer_region_id": null,
            "customer_region_name": null,
        })];

        nest_expanded_rows(
            &mut rows,
            &[
                ExpandPrefix::new(vec!["customer".into()]),
                ExpandPrefix::new(vec!["customer".into(), "region".into()]),
            ],
        );

        assert_eq!(rows[0], json!({"id": 1, "customer": null}));
    }
}
