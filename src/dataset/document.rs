use crate::config::DatasetConfig;
use serde_json::{Map, Value};

/// A seeded document. The id is assigned by the seeder, not the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub owner: String,
    pub message: String,
}

impl Document {
    pub fn new(id: impl Into<String>, owner: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            message: message.into(),
        }
    }

    /// JSON source as stored in the dataset, with the owner under `owner_field`.
    pub fn to_source(&self, owner_field: &str) -> Value {
        let mut source = Map::new();
        source.insert(owner_field.to_string(), Value::String(self.owner.clone()));
        source.insert("message".to_string(), Value::String(self.message.clone()));
        Value::Object(source)
    }
}

/// Builds `document_count` documents with ids `0..document_count` that all
/// share the configured owner.
pub fn build_documents(config: &DatasetConfig) -> Vec<Document> {
    (0..config.document_count)
        .map(|i| {
            Document::new(
                i.to_string(),
                config.owner.as_str(),
                format!("{} {}", config.message_prefix, i),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_documents_sequential_ids() {
        let config = DatasetConfig {
            document_count: 4,
            ..DatasetConfig::default()
        };
        let docs = build_documents(&config);
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3"]);
        assert!(docs.iter().all(|d| d.owner == "kimchy"));
        assert_eq!(docs[2].message, "trying out Elasticsearch 2");
    }

    #[test]
    fn test_build_documents_empty() {
        let config = DatasetConfig {
            document_count: 0,
            ..DatasetConfig::default()
        };
        assert!(build_documents(&config).is_empty());
    }

    #[test]
    fn test_to_source_uses_owner_field() {
        let doc = Document::new("7", "kimchy", "hello");
        let source = doc.to_source("user");
        assert_eq!(source["user"], "kimchy");
        assert_eq!(source["message"], "hello");
        assert!(source.get("owner").is_none());
    }
}
