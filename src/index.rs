//! Index descriptions as sent to and returned by the database server.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Hash,
    Skiplist,
    Persistent,
}

impl IndexKind {
    /// Recent servers store hash and skiplist indexes as persistent ones
    /// and report them back with that type, so the three kinds are aliases.
    pub fn is_hash_alias(reported: &str) -> bool {
        matches!(reported, "hash" | "skiplist" | "persistent")
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            IndexKind::Hash => "hash",
            IndexKind::Skiplist => "skiplist",
            IndexKind::Persistent => "persistent",
        };
        write!(f, "{}", kind)
    }
}

/// Body of an index creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    #[serde(rename = "type")]
    pub kind: IndexKind,
    pub fields: Vec<String>,
    pub sparse: bool,
    pub unique: bool,
}

impl IndexSpec {
    /// A sparse hash index on a single attribute. Documents without
    /// the attribute are left out of the index.
    pub fn sparse_hash(field: &str) -> Self {
        IndexSpec {
            kind: IndexKind::Hash,
            fields: vec![field.to_string()],
            sparse: true,
            unique: false,
        }
    }

    /// Same kind (up to aliasing), same fields and same options.
    pub fn is_satisfied_by(&self, index: &IndexInfo) -> bool {
        IndexKind::is_hash_alias(&index.kind)
            && self.fields == index.fields
            && self.sparse == index.sparse
            && self.unique == index.unique
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on [{}]{}{}",
            self.kind,
            self.fields.join(", "),
            if self.unique { " (unique)" } else { "" },
            if self.sparse { " (sparse)" } else { "" }
        )
    }
}

/// An index as described by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub sparse: bool,
    #[serde(default)]
    pub unique: bool,
    // only present on creation responses
    #[serde(default)]
    pub is_newly_created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_hash_request_body() {
        let spec = IndexSpec::sparse_hash("tax_id");
        let body = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"type": "hash", "fields": ["tax_id"], "sparse": true, "unique": false})
        );
    }

    #[test]
    fn test_persistent_satisfies_hash() {
        let index: IndexInfo = serde_json::from_value(serde_json::json!({
            "id": "ortholog_nodes/1234",
            "name": "idx_1234",
            "type": "persistent",
            "fields": ["tax_id"],
            "sparse": true,
            "unique": false,
        }))
        .unwrap();
        assert!(!index.is_newly_created);
        assert!(IndexSpec::sparse_hash("tax_id").is_satisfied_by(&index));
        assert!(!IndexSpec::sparse_hash("namespace").is_satisfied_by(&index));
    }

    #[test]
    fn test_non_sparse_does_not_satisfy() {
        let index: IndexInfo = serde_json::from_value(serde_json::json!({
            "id": "equivalence_nodes/99",
            "type": "hash",
            "fields": ["namespace"],
            "sparse": false,
        }))
        .unwrap();
        assert!(!IndexSpec::sparse_hash("namespace").is_satisfied_by(&index));
    }

    #[test]
    fn test_unique_does_not_satisfy_non_unique() {
        let index: IndexInfo = serde_json::from_value(serde_json::json!({
            "id": "ortholog_nodes/77",
            "type": "persistent",
            "fields": ["tax_id"],
            "sparse": true,
            "unique": true,
        }))
        .unwrap();
        assert!(!IndexSpec::sparse_hash("tax_id").is_satisfied_by(&index));

        let unique = IndexSpec {
            unique: true,
            ..IndexSpec::sparse_hash("tax_id")
        };
        assert!(unique.is_satisfied_by(&index));
    }

    #[test]
    fn test_hash_aliases() {
        assert!(!IndexKind::is_hash_alias("primary"));
        assert!(!IndexKind::is_hash_alias("edge"));
        assert!(IndexKind::is_hash_alias("hash"));
        assert!(IndexKind::is_hash_alias("skiplist"));
        assert!(IndexKind::is_hash_alias("persistent"));
    }
}
