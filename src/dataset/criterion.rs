use serde_json::{json, Map, Value};

/// Exact-match predicate on a single keyword field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCriterion {
    pub field: String,
    pub value: String,
}

impl DeleteCriterion {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Request body understood by the `_delete_by_query` and `_count` endpoints.
    pub fn to_query(&self) -> Value {
        let mut term = Map::new();
        term.insert(self.field.clone(), Value::String(self.value.clone()));
        json!({ "query": { "term": term } })
    }

    pub fn matches(&self, source: &Value) -> bool {
        source
            .get(&self.field)
            .and_then(Value::as_str)
            .map(|v| v == self.value)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_query() {
        let criterion = DeleteCriterion::term("user", "kimchy");
        assert_eq!(
            criterion.to_query(),
            json!({"query": {"term": {"user": "kimchy"}}})
        );
    }

    #[test]
    fn test_matches() {
        let criterion = DeleteCriterion::term("user", "kimchy");
        assert!(criterion.matches(&json!({"user": "kimchy", "message": "a"})));
        assert!(!criterion.matches(&json!({"user": "someone"})));
        assert!(!criterion.matches(&json!({"message": "no owner"})));
        assert!(!criterion.matches(&json!({"user": 3})));
    }
}
