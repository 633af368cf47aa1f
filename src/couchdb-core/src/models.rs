use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A CouchDB document as a JSON object
pub type Document = serde_json::Map<String, Value>;

/// `_id`/`_rev` pair; flatten into your own structs for typed storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
}

/// One entry of a `_bulk_docs` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl UpdateResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Response of a view or `_all_docs` query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_seq: Option<Value>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl ViewResults {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ids of all rows that carry one (reduce rows do not)
    pub fn ids(&self) -> Vec<&str> {
        self.rows.iter().filter_map(|r| r.id.as_deref()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
    /// Set for `keys` lookups that found nothing, e.g. `not_found`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response of `GET /{db}/_changes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Changes {
    #[serde(default)]
    pub results: Vec<ChangeRow>,
    #[serde(default)]
    pub last_seq: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRow {
    pub seq: Value,
    pub id: String,
    #[serde(default)]
    pub changes: Vec<RevRef>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevRef {
    pub rev: String,
}

/// Response of `GET /_membership`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    #[serde(default)]
    pub all_nodes: Vec<String>,
    #[serde(default)]
    pub cluster_nodes: Vec<String>,
}

/// Entry of `GET /_active_tasks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTask {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub pid: Option<String>,
    #[serde(default)]
    pub started_on: Option<i64>,
    #[serde(default)]
    pub updated_on: Option<i64>,
    /// Task specific fields (progress, database, replication_id, ...)
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

impl ActiveTask {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_on.and_then(|t| Utc.timestamp_opt(t, 0).single())
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_on.and_then(|t| Utc.timestamp_opt(t, 0).single())
    }
}

/// Response of `GET /_session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub ok: bool,
    #[serde(rename = "userCtx")]
    pub user_ctx: UserCtx,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserCtx {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Body of `/{db}/_security`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    #[serde(default)]
    pub admins: SecurityMembers,
    #[serde(default)]
    pub members: SecurityMembers,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityMembers {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Response of a Mango `_find` query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindResult {
    #[serde(default)]
    pub docs: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Response of `GET /{db}/_index`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexList {
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub ddoc: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub index_type: String,
    #[serde(default)]
    pub def: Value,
}

/// Raw result of a show, list or update function
#[derive(Debug, Clone)]
pub struct DesignResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl DesignResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_view_results() {
        let results: ViewResults = serde_json::from_value(json!({
            "total_rows": 3,
            "offset": 0,
            "rows": [
                {"id": "a", "key": "a", "value": {"rev": "1-x"}},
                {"id": "b", "key": ["b", 1], "value": 2, "doc": {"_id": "b"}},
                {"key": "zzz", "error": "not_found"}
            ]
        }))
        .unwrap();

        assert_eq!(results.total_rows, Some(3));
        assert_eq!(results.len(), 3);
        assert_eq!(results.ids(), vec!["a", "b"]);
        assert_eq!(results.rows[1].doc.as_ref().unwrap()["_id"], "b");
        assert_eq!(results.rows[2].error.as_deref(), Some("not_found"));
    }

    #[test]
    fn test_reduce_results() {
        let results: ViewResults =
            serde_json::from_value(json!({"rows": [{"key": null, "value": 42}]})).unwrap();
        assert_eq!(results.total_rows, None);
        assert!(results.ids().is_empty());
        assert_eq!(results.rows[0].value, 42);
    }

    #[test]
    fn test_update_result() {
        let ok: UpdateResult =
            serde_json::from_value(json!({"ok": true, "id": "a", "rev": "1-x"})).unwrap();
        assert!(ok.is_ok());

        let conflict: UpdateResult = serde_json::from_value(
            json!({"id": "b", "error": "conflict", "reason": "Document update conflict."}),
        )
        .unwrap();
        assert!(!conflict.is_ok());
        assert_eq!(conflict.rev, None);
    }

    #[test]
    fn test_document_meta_flatten() {
        #[derive(Serialize, Deserialize)]
        struct Note {
            #[serde(flatten)]
            meta: DocumentMeta,
            text: String,
        }

        let note: Note =
            serde_json::from_value(json!({"_id": "n1", "_rev": "2-y", "text": "hi"})).unwrap();
        assert_eq!(note.meta.id.as_deref(), Some("n1"));

        let fresh = Note {
            meta: DocumentMeta::default(),
            text: "new".into(),
        };
        assert_eq!(serde_json::to_value(&fresh).unwrap(), json!({"text": "new"}));
    }

    #[test]
    fn test_active_task_timestamps() {
        let task: ActiveTask = serde_json::from_value(json!({
            "type": "replication",
            "node": "couchdb@localhost",
            "started_on": 1_700_000_000,
            "updated_on": 1_700_000_060,
            "docs_written": 12
        }))
        .unwrap();

        assert_eq!(task.task_type, "replication");
        assert_eq!(task.details["docs_written"], 12);
        let elapsed = task.updated_at().unwrap() - task.started_at().unwrap();
        assert_eq!(elapsed.num_seconds(), 60);
    }

    #[test]
    fn test_session_without_user() {
        let session: Session = serde_json::from_value(
            json!({"ok": true, "userCtx": {"name": null, "roles": []}}),
        )
        .unwrap();
        assert!(session.user_ctx.name.is_none());
    }
}
