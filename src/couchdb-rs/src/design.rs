//! View definitions kept in code and synced into design documents.

use std::collections::BTreeMap;

use couchdb_core::{Document, Params, UpdateResult, ViewResults};
use serde_json::{json, Value};
use tracing::info;

use crate::{ClientError, Database, Result};

/// A map/reduce view that lives in `_design/{design}`
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDefinition {
    pub design: String,
    pub name: String,
    pub map_fun: String,
    pub reduce_fun: Option<String>,
    pub language: String,
    /// Design document `options`, e.g. `{"local_seq": true}`
    pub options: Option<Value>,
}

impl ViewDefinition {
    pub fn new(
        design: impl Into<String>,
        name: impl Into<String>,
        map_fun: impl Into<String>,
    ) -> Self {
        let design = design.into();
        Self {
            design: design
                .strip_prefix("_design/")
                .map(str::to_string)
                .unwrap_or(design),
            name: name.into(),
            map_fun: map_fun.into(),
            reduce_fun: None,
            language: "javascript".to_string(),
            options: None,
        }
    }

    pub fn with_reduce(mut self, reduce_fun: impl Into<String>) -> Self {
        self.reduce_fun = Some(reduce_fun.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    pub fn design_id(&self) -> String {
        format!("_design/{}", self.design)
    }

    fn body(&self) -> Value {
        let mut view = json!({ "map": self.map_fun });
        if let Some(reduce) = &self.reduce_fun {
            view["reduce"] = json!(reduce);
        }
        view
    }

    /// Store this view if the design document differs
    pub async fn sync(&self, db: &Database) -> Result<Vec<UpdateResult>> {
        sync_many(db, std::slice::from_ref(self), false).await
    }

    pub async fn view(&self, db: &Database, params: Option<&Params>) -> Result<ViewResults> {
        db.view(&format!("{}/{}", self.design, self.name), params)
            .await
    }
}

/// Bring design documents in line with `views`.
///
/// Views are grouped by design document and merged into what the server
/// has. With `remove_missing`, views not listed here are dropped from the
/// touched design documents. Only changed documents are written, in a
/// single bulk request.
pub async fn sync_many(
    db: &Database,
    views: &[ViewDefinition],
    remove_missing: bool,
) -> Result<Vec<UpdateResult>> {
    let mut by_design: BTreeMap<String, Vec<&ViewDefinition>> = BTreeMap::new();
    for view in views {
        by_design.entry(view.design_id()).or_default().push(view);
    }

    let mut changed = Vec::new();
    for (design_id, defs) in by_design {
        let existing = match db.get(&design_id).await {
            Ok(doc) => Some(doc),
            Err(ClientError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let doc = merge_views(existing.clone(), &design_id, &defs, remove_missing);
        if existing.as_ref() != Some(&doc) {
            changed.push(doc);
        }
    }

    if changed.is_empty() {
        return Ok(Vec::new());
    }
    info!(db = db.name(), count = changed.len(), "syncing design documents");
    db.update(&mut changed, None).await
}

fn merge_views(
    existing: Option<Document>,
    design_id: &str,
    defs: &[&ViewDefinition],
    remove_missing: bool,
) -> Document {
    let mut doc = existing.unwrap_or_else(|| {
        let mut doc = Document::new();
        doc.insert("_id".into(), json!(design_id));
        doc
    });

    let mut views = match doc.remove("views") {
        Some(Value::Object(views)) => views,
        _ => serde_json::Map::new(),
    };
    if remove_missing {
        views.retain(|name, _| defs.iter().any(|d| d.name == *name));
    }
    for def in defs {
        views.insert(def.name.clone(), def.body());
        if let Some(options) = &def.options {
            doc.insert("options".into(), options.clone());
        }
    }
    doc.insert("views".into(), Value::Object(views));

    if let Some(def) = defs.first() {
        doc.insert("language".into(), json!(def.language));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_year() -> ViewDefinition {
        ViewDefinition::new("_design/books", "by_year", "function(doc) { emit(doc.year, 1); }")
    }

    #[test]
    fn test_new_strips_prefix() {
        let def = by_year();
        assert_eq!(def.design, "books");
        assert_eq!(def.design_id(), "_design/books");
        assert_eq!(def.language, "javascript");
    }

    #[test]
    fn test_merge_into_new_doc() {
        let def = by_year().with_reduce("_count");
        let doc = merge_views(None, "_design/books", &[&def], false);

        assert_eq!(doc["_id"], "_design/books");
        assert_eq!(doc["language"], "javascript");
        assert_eq!(doc["views"]["by_year"]["reduce"], "_count");
    }

    #[test]
    fn test_merge_keeps_or_drops_other_views() {
        let existing: Document = serde_json::from_value(json!({
            "_id": "_design/books",
            "_rev": "3-abc",
            "language": "javascript",
            "views": {"old": {"map": "function(doc) {}"}}
        }))
        .unwrap();
        let def = by_year();

        let kept = merge_views(Some(existing.clone()), "_design/books", &[&def], false);
        assert!(kept["views"].get("old").is_some());
        assert_eq!(kept["_rev"], "3-abc");

        let dropped = merge_views(Some(existing), "_design/books", &[&def], true);
        assert!(dropped["views"].get("old").is_none());
        assert!(dropped["views"].get("by_year").is_some());
    }

    #[test]
    fn test_merge_is_stable() {
        let def = by_year();
        let first = merge_views(None, "_design/books", &[&def], false);
        let second = merge_views(Some(first.clone()), "_design/books", &[&def], false);
        assert_eq!(first, second);
    }
}
