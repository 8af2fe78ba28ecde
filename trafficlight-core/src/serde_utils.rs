use serde_json::Value;

/// Recursively drops `null` members from objects and `null` items from arrays.
///
/// Returns `None` when the value itself is `null`.
pub fn prune_nulls(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => Some(Value::Object(
            map.into_iter()
                .filter_map(|(key, value)| prune_nulls(value).map(|value| (key, value)))
                .collect(),
        )),
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(prune_nulls).collect(),
        )),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prunes_nested_nulls() {
        let value = json!({"a": null, "b": {"c": null, "d": 1}, "e": [null, 2]});
        assert_eq!(prune_nulls(value), Some(json!({"b": {"d": 1}, "e": [2]})));
        assert_eq!(prune_nulls(Value::Null), None);
    }
}
