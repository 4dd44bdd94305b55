//! Documents and chunks as they are held by a store.
//!
//! Both types keep unknown fields in `extra` so that relaying a document
//! never drops metadata the relay does not understand (`ctime`, `size`,
//! `type`, ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document entry: metadata plus an ordered list of chunk ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque identifier, starts with its side's path prefix.
    #[serde(rename = "_id")]
    pub id: String,

    /// Revision token. `None` for a document that has not been created yet.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    /// Modification timestamp, carried verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<Value>,

    /// Deletion flag.
    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,

    /// Ordered chunk ids. A document without this list cannot be relayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<String>>,

    /// Every other field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Create a live document with an empty chunk list.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            mtime: None,
            deleted: false,
            children: Some(Vec::new()),
            extra: Map::new(),
        }
    }

    /// Set the chunk list.
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = Some(children.into_iter().map(Into::into).collect());
        self
    }

    /// Set the modification time.
    pub fn with_mtime(mut self, mtime: i64) -> Self {
        self.mtime = Some(Value::from(mtime));
        self
    }

    /// Mark as deleted.
    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// The fields that decide whether two copies of a document have converged.
    pub fn shape(&self) -> DocumentShape {
        DocumentShape {
            mtime: self.mtime.clone(),
            children: self.children.clone().unwrap_or_default(),
            deleted: self.deleted,
        }
    }
}

/// `{mtime, children, deleted}` of a document.
///
/// Two documents with equal shapes are considered already synchronized;
/// revision tokens and ids are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentShape {
    pub mtime: Option<Value>,
    pub children: Vec<String>,
    pub deleted: bool,
}

/// A unit of document content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    /// Plaintext or ciphertext, depending on the side that produced it.
    pub data: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Chunk {
    /// Create a leaf chunk.
    pub fn new(id: impl Into<String>, data: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert("type".into(), Value::from("leaf"));
        Self {
            id: id.into(),
            rev: None,
            data: data.into(),
            extra,
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_wire_names() {
        let mut doc = Document::new("notes/a.md")
            .with_children(["h:1", "h:2"])
            .with_mtime(42);
        doc.extra.insert("type".into(), json!("plain"));

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            json!({
                "_id": "notes/a.md",
                "mtime": 42,
                "children": ["h:1", "h:2"],
                "type": "plain",
            })
        );
    }

    #[test]
    fn test_document_keeps_unknown_fields() {
        let raw = json!({
            "_id": "notes/b.md",
            "_rev": "3-abc",
            "_deleted": true,
            "ctime": 1,
            "size": 10,
            "children": [],
        });
        let doc: Document = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(doc.rev.as_deref(), Some("3-abc"));
        assert!(doc.deleted);
        assert_eq!(doc.extra.get("size"), Some(&json!(10)));
        assert_eq!(serde_json::to_value(&doc).unwrap(), raw);
    }

    #[test]
    fn test_missing_children_is_none() {
        let doc: Document = serde_json::from_value(json!({"_id": "x"})).unwrap();
        assert!(doc.children.is_none());
        assert!(doc.shape().children.is_empty());
    }

    #[test]
    fn test_shape_ignores_identity() {
        let a = Document::new("p/a").with_children(["h:1"]).with_mtime(5);
        let mut b = Document::new("s/a").with_children(["h:1"]).with_mtime(5);
        b.rev = Some("7-x".into());
        assert_eq!(a.shape(), b.shape());

        let c = b.clone().deleted();
        assert_ne!(a.shape(), c.shape());
    }
}
