use std::fmt;

use couchdb_core::{
    doc_path, generate_uuid, to_params, ClientConfig, Changes, DesignResponse, Document,
    FindResult, IndexList, Params, Security, UpdateResult, ViewResults,
};
use reqwest::header::{ACCEPT, ETAG};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::resource::{content_type, Resource};
use crate::{ClientError, Result};

/// Handle on one CouchDB database
#[derive(Clone)]
pub struct Database {
    name: String,
    resource: Resource,
}

#[derive(Deserialize)]
struct DocResponse {
    id: String,
    #[serde(default)]
    rev: Option<String>,
}

#[derive(Deserialize)]
struct OkResponse {
    #[serde(default)]
    ok: bool,
}

#[derive(Deserialize)]
struct Revisions {
    start: u64,
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct IndexCreated {
    id: String,
    name: String,
}

#[derive(Serialize)]
struct BulkKeys<'a> {
    keys: &'a Value,
}

impl Database {
    /// Open a database by its full URL, e.g. `http://localhost:5984/dba`
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, &ClientConfig::new(url))
    }

    pub fn with_config(url: &str, config: &ClientConfig) -> Result<Self> {
        let resource = Resource::new(url, config)?;
        let name = resource
            .last_segment()
            .ok_or_else(|| ClientError::InvalidArgument(format!("no database in URL {}", url)))?;
        Ok(Self::from_resource(&name, resource))
    }

    pub(crate) fn from_resource(name: &str, resource: Resource) -> Self {
        Self {
            name: name.to_string(),
            resource,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Ok when the database exists and is reachable
    pub async fn available(&self) -> Result<()> {
        self.resource.head(&[], None).await?;
        Ok(())
    }

    /// Database information (`doc_count`, `update_seq`, sizes, ...)
    pub async fn info(&self) -> Result<Document> {
        self.resource.get_json(&[], None).await
    }

    /// View index information of a design document
    pub async fn design_info(&self, ddoc: &str) -> Result<Document> {
        self.resource
            .get_json(&["_design", strip_design(ddoc), "_info"], None)
            .await
    }

    /// Number of documents
    pub async fn len(&self) -> Result<u64> {
        let info = self.info().await?;
        info.get("doc_count")
            .and_then(Value::as_u64)
            .ok_or_else(|| ClientError::InvalidResponse("missing doc_count".into()))
    }

    pub async fn contains(&self, id: &str) -> Result<bool> {
        match self.resource.head(&doc_path(id), None).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Document> {
        self.get_with(id, None).await
    }

    /// Fetch a document with options such as `rev`, `revs` or `conflicts`
    pub async fn get_with(&self, id: &str, params: Option<&Params>) -> Result<Document> {
        self.resource.get_json(&doc_path(id), params).await
    }

    pub async fn get_as<T: DeserializeOwned>(&self, id: &str) -> Result<T> {
        self.resource.get_json(&doc_path(id), None).await
    }

    /// Create or update `doc`, returning its id and new rev.
    ///
    /// A missing `_id` is filled with a random UUID. `_id` and `_rev` are
    /// written back into `doc`. With `batch=ok` the server assigns no rev
    /// and the returned rev is empty.
    pub async fn save(
        &self,
        doc: &mut Document,
        params: Option<&Params>,
    ) -> Result<(String, String)> {
        let id = match doc.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = generate_uuid();
                doc.insert("_id".into(), Value::String(id.clone()));
                id
            }
        };

        let result: DocResponse = self.resource.put_json(&doc_path(&id), &*doc, params).await?;
        let rev = result.rev.unwrap_or_default();
        if !rev.is_empty() {
            doc.insert("_rev".into(), Value::String(rev.clone()));
        }
        debug!(db = %self.name, id = %result.id, rev = %rev, "saved document");
        Ok((result.id, rev))
    }

    /// Save any serializable value that maps to a JSON object
    pub async fn save_as<T: Serialize>(
        &self,
        value: &T,
        params: Option<&Params>,
    ) -> Result<(String, String)> {
        let mut doc = match serde_json::to_value(value)? {
            Value::Object(map) => map,
            other => {
                return Err(ClientError::InvalidArgument(format!(
                    "document must be a JSON object, got {}",
                    other
                )))
            }
        };
        self.save(&mut doc, params).await
    }

    /// Store `doc` under `id`
    pub async fn set(&self, id: &str, doc: &mut Document) -> Result<String> {
        doc.insert("_id".into(), Value::String(id.to_string()));
        let (_, rev) = self.save(doc, None).await?;
        Ok(rev)
    }

    /// Delete the current revision of `id`
    pub async fn delete(&self, id: &str) -> Result<()> {
        let path = doc_path(id);
        let headers = self.resource.head(&path, None).await?;
        let rev = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .ok_or_else(|| ClientError::InvalidResponse(format!("no ETag for {}", id)))?;

        let params = to_params([("rev", json!(rev))]);
        let _: DocResponse = self.resource.delete_json(&path, Some(&params)).await?;
        debug!(db = %self.name, id, "deleted document");
        Ok(())
    }

    /// Delete the revision named by the doc's `_id`/`_rev`
    pub async fn delete_doc(&self, doc: &Document) -> Result<()> {
        let (id, rev) = id_and_rev(doc)?;
        let params = to_params([("rev", json!(rev))]);
        let _: DocResponse = self.resource.delete_json(&doc_path(id), Some(&params)).await?;
        Ok(())
    }

    /// Write many documents in one `_bulk_docs` request.
    ///
    /// Documents without `_id` get a random one. Successful results write the
    /// new `_rev` back into the matching document. `params` go into the
    /// request body, e.g. `{"new_edits": false}`.
    pub async fn update(
        &self,
        docs: &mut [Document],
        params: Option<&Params>,
    ) -> Result<Vec<UpdateResult>> {
        for doc in docs.iter_mut() {
            if !doc.contains_key("_id") {
                doc.insert("_id".into(), Value::String(generate_uuid()));
            }
        }

        let mut body = params.cloned().unwrap_or_default();
        body.insert("docs".into(), serde_json::to_value(&*docs)?);
        let results: Vec<UpdateResult> = self
            .resource
            .post_json(&["_bulk_docs"], &body, None)
            .await?;

        for (doc, result) in docs.iter_mut().zip(results.iter()) {
            let same_doc = doc.get("_id").and_then(Value::as_str) == Some(result.id.as_str());
            if let (true, Some(rev)) = (same_doc, &result.rev) {
                doc.insert("_rev".into(), Value::String(rev.clone()));
            }
        }
        debug!(db = %self.name, count = results.len(), "bulk update");
        Ok(results)
    }

    /// Ids of every document, design documents included
    pub async fn doc_ids(&self) -> Result<Vec<String>> {
        let results = self.view("_all_docs", None).await?;
        Ok(results.ids().into_iter().map(str::to_string).collect())
    }

    /// Copy `source` to `destination`, returning the new rev.
    /// `destination` may carry `?rev=` to overwrite an existing doc.
    pub async fn copy(&self, source: &str, destination: &str) -> Result<String> {
        let result: DocResponse = self.resource.copy(&doc_path(source), destination).await?;
        result
            .rev
            .ok_or_else(|| ClientError::InvalidResponse("copy returned no rev".into()))
    }

    pub async fn compact(&self) -> Result<bool> {
        self.post_ok(&["_compact"]).await
    }

    pub async fn compact_design(&self, ddoc: &str) -> Result<bool> {
        self.post_ok(&["_compact", strip_design(ddoc)]).await
    }

    /// Remove index files no design document uses anymore
    pub async fn cleanup(&self) -> Result<bool> {
        self.post_ok(&["_view_cleanup"]).await
    }

    pub async fn commit(&self) -> Result<bool> {
        self.post_ok(&["_ensure_full_commit"]).await
    }

    async fn post_ok(&self, path: &[&str]) -> Result<bool> {
        let result: OkResponse = self.resource.post_json(path, &json!({}), None).await?;
        info!(db = %self.name, op = path[0], ok = result.ok, "maintenance");
        Ok(result.ok)
    }

    pub async fn changes(&self, params: Option<&Params>) -> Result<Changes> {
        self.resource.get_json(&["_changes"], params).await
    }

    /// Purge the given document revisions
    pub async fn purge(&self, docs: &[Document]) -> Result<Document> {
        let mut body = Document::new();
        for doc in docs {
            let (id, rev) = id_and_rev(doc)?;
            if let Some(revs) = body
                .entry(id.to_string())
                .or_insert_with(|| json!([]))
                .as_array_mut()
            {
                revs.push(json!(rev));
            }
        }
        self.resource.post_json(&["_purge"], &body, None).await
    }

    /// Every known revision of `id`, newest first. Revisions the server no
    /// longer has (compacted) are skipped.
    pub async fn revisions(&self, id: &str) -> Result<Vec<Document>> {
        let doc = self
            .get_with(id, Some(&to_params([("revs", json!(true))])))
            .await?;
        let revisions: Revisions = doc
            .get("_revisions")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| ClientError::InvalidResponse(format!("no _revisions for {}", id)))?;

        let mut docs = Vec::with_capacity(revisions.ids.len());
        for (i, hash) in revisions.ids.iter().enumerate() {
            let Some(pos) = revisions.start.checked_sub(i as u64) else {
                break;
            };
            let params = to_params([("rev", json!(format!("{}-{}", pos, hash)))]);
            match self.get_with(id, Some(&params)).await {
                Ok(doc) => docs.push(doc),
                Err(ClientError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(docs)
    }

    pub async fn get_attachment(&self, id: &str, filename: &str) -> Result<Vec<u8>> {
        let mut path = doc_path(id);
        path.push(filename);
        let (_, body) = self.resource.get_bytes(&path, None).await?;
        Ok(body)
    }

    /// Attach `content` to `doc`; the doc's `_rev` is updated
    pub async fn put_attachment(
        &self,
        doc: &mut Document,
        filename: &str,
        content: Vec<u8>,
        mime: &str,
    ) -> Result<String> {
        let id = doc
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::InvalidArgument("document has no _id".into()))?
            .to_string();
        let params = doc
            .get("_rev")
            .and_then(Value::as_str)
            .map(|rev| to_params([("rev", json!(rev))]));

        let mut path = doc_path(&id);
        path.push(filename);
        let result: DocResponse = self
            .resource
            .put_bytes(&path, content, mime, params.as_ref())
            .await?;
        self.store_rev(doc, result.rev)
    }

    /// Remove an attachment; the doc's `_rev` is updated
    pub async fn delete_attachment(&self, doc: &mut Document, filename: &str) -> Result<String> {
        let (id, rev) = id_and_rev(doc)?;
        let params = to_params([("rev", json!(rev))]);
        let mut path = doc_path(id);
        path.push(filename);
        let result: DocResponse = self.resource.delete_json(&path, Some(&params)).await?;
        self.store_rev(doc, result.rev)
    }

    fn store_rev(&self, doc: &mut Document, rev: Option<String>) -> Result<String> {
        let rev = rev.ok_or_else(|| ClientError::InvalidResponse("no rev in response".into()))?;
        doc.insert("_rev".into(), Value::String(rev.clone()));
        Ok(rev)
    }

    /// Run a Mango query, e.g. `{"selector": {"year": {"$gt": 2010}}}`
    pub async fn find(&self, query: &Value) -> Result<FindResult> {
        self.resource.post_json(&["_find"], query, None).await
    }

    /// Which index a Mango query would use
    pub async fn explain(&self, query: &Value) -> Result<Document> {
        self.resource.post_json(&["_explain"], query, None).await
    }

    pub async fn indexes(&self) -> Result<IndexList> {
        self.resource.get_json(&["_index"], None).await
    }

    /// Create a Mango index over `fields`; returns the design doc id and index name
    pub async fn put_index(
        &self,
        fields: &[&str],
        ddoc: Option<&str>,
        name: Option<&str>,
    ) -> Result<(String, String)> {
        let mut body = Document::new();
        body.insert("index".into(), json!({ "fields": fields }));
        body.insert("type".into(), json!("json"));
        if let Some(ddoc) = ddoc {
            body.insert("ddoc".into(), json!(strip_design(ddoc)));
        }
        if let Some(name) = name {
            body.insert("name".into(), json!(name));
        }

        let created: IndexCreated = self.resource.post_json(&["_index"], &body, None).await?;
        Ok((created.id, created.name))
    }

    pub async fn delete_index(&self, ddoc: &str, name: &str) -> Result<()> {
        let _: OkResponse = self
            .resource
            .delete_json(&["_index", strip_design(ddoc), "json", name], None)
            .await?;
        Ok(())
    }

    /// Query `_all_docs` (or another `_` view) or a design view `design/view`.
    ///
    /// A `keys` option is sent in a POST body instead of the query string.
    pub async fn view(&self, name: &str, params: Option<&Params>) -> Result<ViewResults> {
        let path = view_path(name)?;
        let mut query = params.cloned().unwrap_or_default();

        match query.remove("keys") {
            Some(keys) => {
                self.resource
                    .post_json(&path, &BulkKeys { keys: &keys }, Some(&query))
                    .await
            }
            None => self.resource.get_json(&path, Some(&query)).await,
        }
    }

    /// Run show function `design/show`, optionally on a document
    pub async fn show(
        &self,
        name: &str,
        id: Option<&str>,
        params: Option<&Params>,
    ) -> Result<DesignResponse> {
        let mut path = design_path(name, "_show")?;
        if let Some(id) = id {
            path.extend(doc_path(id));
        }
        self.design_call(Method::GET, &path, params, None).await
    }

    /// Run list function `design/list` over `view` (`view` or `other_design/view`)
    pub async fn list(
        &self,
        name: &str,
        view: &str,
        params: Option<&Params>,
    ) -> Result<DesignResponse> {
        let mut path = design_path(name, "_list")?;
        path.extend(view.split('/'));
        self.design_call(Method::GET, &path, params, None).await
    }

    /// Run update handler `design/update`: POST without `id`, PUT with one
    pub async fn update_doc(
        &self,
        name: &str,
        id: Option<&str>,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<DesignResponse> {
        let mut path = design_path(name, "_update")?;
        let method = match id {
            Some(id) => {
                path.extend(doc_path(id));
                Method::PUT
            }
            None => Method::POST,
        };
        self.design_call(method, &path, params, body).await
    }

    async fn design_call(
        &self,
        method: Method,
        path: &[&str],
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<DesignResponse> {
        let mut builder = self.resource.request(method, path, params).header(ACCEPT, "*/*");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = self.resource.send(builder).await?;
        let status = response.status().as_u16();
        let content_type = content_type(&response);
        let body = response.bytes().await?.to_vec();
        Ok(DesignResponse {
            status,
            content_type,
            body,
        })
    }

    pub async fn security(&self) -> Result<Security> {
        self.resource.get_json(&["_security"], None).await
    }

    pub async fn set_security(&self, security: &Security) -> Result<()> {
        let _: OkResponse = self
            .resource
            .put_json(&["_security"], security, None)
            .await?;
        info!(db = %self.name, "updated security object");
        Ok(())
    }

    pub async fn revs_limit(&self) -> Result<u64> {
        self.resource.get_json(&["_revs_limit"], None).await
    }

    pub async fn set_revs_limit(&self, limit: u64) -> Result<()> {
        let _: OkResponse = self
            .resource
            .put_json(&["_revs_limit"], &limit, None)
            .await?;
        Ok(())
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Database {}", self.name)
    }
}

fn id_and_rev(doc: &Document) -> Result<(&str, &str)> {
    let id = doc.get("_id").and_then(Value::as_str);
    let rev = doc.get("_rev").and_then(Value::as_str);
    match (id, rev) {
        (Some(id), Some(rev)) => Ok((id, rev)),
        _ => Err(ClientError::InvalidArgument(
            "document needs both _id and _rev".into(),
        )),
    }
}

fn strip_design(ddoc: &str) -> &str {
    ddoc.strip_prefix("_design/").unwrap_or(ddoc)
}

/// `_all_docs` -> `[_all_docs]`, `app/by_date` or
/// `_design/app/_view/by_date` -> `[_design, app, _view, by_date]`
fn view_path(name: &str) -> Result<Vec<&str>> {
    if name.starts_with('_') && !name.starts_with("_design/") {
        return Ok(vec![name]);
    }
    let name = strip_design(name);
    let split = name
        .split_once("/_view/")
        .or_else(|| name.split_once('/'));
    match split {
        Some((design, view)) if !design.is_empty() && !view.is_empty() => {
            Ok(vec!["_design", design, "_view", view])
        }
        _ => Err(ClientError::InvalidArgument(format!(
            "view name must look like design/view: {}",
            name
        ))),
    }
}

/// `app/func` -> `[_design, app, kind, func]`
fn design_path<'a>(name: &'a str, kind: &'a str) -> Result<Vec<&'a str>> {
    match strip_design(name).split_once('/') {
        Some((design, func)) if !design.is_empty() && !func.is_empty() => {
            Ok(vec!["_design", design, kind, func])
        }
        _ => Err(ClientError::InvalidArgument(format!(
            "function name must look like design/name: {}",
            name
        ))),
    }
}
