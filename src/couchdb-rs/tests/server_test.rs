mod common;

use common::{setup, AUTH_HEADER};
use couchdb_rs::{to_params, ClientError, Server};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_version_sends_basic_auth() {
    let (mock, server) = setup().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("authorization", AUTH_HEADER))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"couchdb": "Welcome", "version": "3.3.3"})),
        )
        .expect(1)
        .mount(&mock)
        .await;

    assert_eq!(server.version().await.unwrap(), "3.3.3");
}

#[tokio::test]
async fn test_no_full_commit_header() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("x-couch-full-commit", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "3.3.3"})))
        .expect(1)
        .mount(&mock)
        .await;

    let server = Server::new_no_full_commit(&mock.uri()).unwrap();
    assert_eq!(server.version().await.unwrap(), "3.3.3");
}

#[tokio::test]
async fn test_unreachable_server() {
    let server = Server::new("http://127.0.0.1:9").unwrap();
    let err = server.version().await.unwrap_err();
    assert!(matches!(err, ClientError::Request(_)));
}

#[tokio::test]
async fn test_config_and_set_config() {
    let (mock, server) = setup().await;
    Mock::given(method("GET"))
        .and(path("/_node/couchdb@localhost/_config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "couchdb": {"max_dbs_open": "500"},
            "log": {"level": "info"}
        })))
        .mount(&mock)
        .await;
    Mock::given(method("PUT"))
        .and(path("/_node/_local/_config/log/level"))
        .and(body_json(json!("debug")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("info")))
        .mount(&mock)
        .await;

    let config = server.config("couchdb@localhost").await.unwrap();
    assert_eq!(config["log"]["level"], "info");

    let old = server.set_config("_local", "log", "level", "debug").await.unwrap();
    assert_eq!(old, "info");
}

#[tokio::test]
async fn test_active_tasks_and_stats() {
    let (mock, server) = setup().await;
    Mock::given(method("GET"))
        .and(path("/_active_tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"type": "indexer", "node": "couchdb@localhost", "progress": 40, "started_on": 1700000000}
        ])))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/_node/couchdb@localhost/_stats/couchdb/request_time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": {"min": 0}})))
        .mount(&mock)
        .await;

    let tasks = server.active_tasks().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type, "indexer");
    assert_eq!(tasks[0].details["progress"], 40);

    let stats = server
        .stats("couchdb@localhost", "couchdb/request_time")
        .await
        .unwrap();
    assert!(stats.contains_key("value"));
}

#[tokio::test]
async fn test_dbs_and_len() {
    let (mock, server) = setup().await;
    Mock::given(method("GET"))
        .and(path("/_all_dbs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["_users", "dba", "dbb"])))
        .mount(&mock)
        .await;

    let dbs = server.dbs().await.unwrap();
    assert!(dbs.contains(&"dba".to_string()));
    assert!(dbs.contains(&"dbb".to_string()));
    let count: u64 = server.len().await.unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_create_escapes_plus_in_name() {
    let (mock, server) = setup().await;
    Mock::given(method("PUT"))
        .and(path("/a%2Bb"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock)
        .await;

    let db = server.create("a+b").await.unwrap();
    assert_eq!(db.name(), "a+b");
}

#[tokio::test]
async fn test_create_conflict_is_precondition_failed() {
    let (mock, server) = setup().await;
    Mock::given(method("PUT"))
        .and(path("/golang-tests"))
        .respond_with(ResponseTemplate::new(412).set_body_json(json!({
            "error": "file_exists",
            "reason": "The database could not be created, the file already exists."
        })))
        .mount(&mock)
        .await;

    let err = server.create("golang-tests").await.err().unwrap();
    assert!(matches!(err, ClientError::PreconditionFailed(_)));
}

#[tokio::test]
async fn test_create_and_contains() {
    let (mock, server) = setup().await;
    Mock::given(method("PUT"))
        .and(path("/golang-tests"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/golang-tests"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock)
        .await;

    let db = server.create("golang-tests").await.unwrap();
    assert_eq!(db.name(), "golang-tests");
    assert!(server.contains("golang-tests").await.unwrap());
    // unmatched requests get a 404 from the mock
    assert!(!server.contains("missing").await.unwrap());
}

#[tokio::test]
async fn test_get_missing_db() {
    let (mock, server) = setup().await;
    Mock::given(method("HEAD"))
        .and(path("/golang-tests"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock)
        .await;

    let err = server.get("golang-tests").await.err().unwrap();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_missing_db() {
    let (mock, server) = setup().await;
    Mock::given(method("DELETE"))
        .and(path("/golang-tests"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"error": "not_found", "reason": "Database does not exist."})),
        )
        .mount(&mock)
        .await;

    let err = server.delete("golang-tests").await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(ref msg) if msg.contains("Database does not exist")));
}

#[tokio::test]
async fn test_bad_credentials_are_unauthorized() {
    let (mock, server) = setup().await;
    Mock::given(method("PUT"))
        .and(path("/golang-tests"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "unauthorized",
            "reason": "Name or password is incorrect."
        })))
        .mount(&mock)
        .await;

    let err = server.create("golang-tests").await.err().unwrap();
    assert!(matches!(err, ClientError::Unauthorized(_)));
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn test_replicate_resolves_names() {
    let (mock, server) = setup().await;
    let source = format!("http://root:secret@{}/dba", mock.address());
    let target = format!("http://root:secret@{}/dbb", mock.address());
    Mock::given(method("POST"))
        .and(path("/_replicate"))
        .and(body_json(json!({
            "source": source,
            "target": target,
            "continuous": true
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"ok": true, "_local_id": "abc"})))
        .expect(1)
        .mount(&mock)
        .await;

    let options = to_params([("continuous", json!(true))]);
    let result = server.replicate("dba", "dbb", Some(&options)).await.unwrap();
    assert_eq!(result["ok"], true);
}

#[tokio::test]
async fn test_membership_and_uuids() {
    let (mock, server) = setup().await;
    Mock::given(method("GET"))
        .and(path("/_membership"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "all_nodes": ["couchdb@localhost"],
            "cluster_nodes": ["couchdb@localhost"]
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/_uuids"))
        .and(query_param("count", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuids": (0..10).map(|i| format!("uuid{i}")).collect::<Vec<_>>()
        })))
        .mount(&mock)
        .await;

    let membership = server.membership().await.unwrap();
    assert_eq!(membership.all_nodes, vec!["couchdb@localhost"]);
    assert_eq!(membership.cluster_nodes, vec!["couchdb@localhost"]);

    let uuids = server.uuids(10).await.unwrap();
    assert_eq!(uuids.len(), 10);
}

#[tokio::test]
async fn test_user_management() {
    let (mock, server) = setup().await;
    Mock::given(method("PUT"))
        .and(path("/_users/org.couchdb.user:foo"))
        .and(body_json(json!({
            "_id": "org.couchdb.user:foo",
            "name": "foo",
            "password": "secret",
            "roles": ["hero"],
            "type": "user"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "ok": true, "id": "org.couchdb.user:foo", "rev": "1-aaa"
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/_users/org.couchdb.user:foo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "org.couchdb.user:foo", "_rev": "1-aaa", "name": "foo"
        })))
        .mount(&mock)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/_users/org.couchdb.user:foo"))
        .and(query_param("rev", "1-aaa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true, "id": "org.couchdb.user:foo", "rev": "2-bbb"
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let (id, rev) = server.add_user("foo", "secret", &["hero"]).await.unwrap();
    assert_eq!(id, "org.couchdb.user:foo");
    assert_eq!(rev, "1-aaa");

    server.remove_user("foo").await.unwrap();
}

#[tokio::test]
async fn test_session_lifecycle() {
    let (mock, server) = setup().await;
    Mock::given(method("POST"))
        .and(path("/_session"))
        .and(body_json(json!({"name": "foo", "password": "secret"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "AuthSession=Zm9vOjY1; Version=1; Path=/; HttpOnly")
                .set_body_json(json!({"ok": true, "name": "foo", "roles": ["hero"]})),
        )
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/_session"))
        .and(header("cookie", "AuthSession=Zm9vOjY1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true, "userCtx": {"name": "foo", "roles": ["hero"]}
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/_session"))
        .and(header("cookie", "AuthSession=stale"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true, "userCtx": {"name": null, "roles": []}
        })))
        .mount(&mock)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/_session"))
        .and(header("cookie", "AuthSession=Zm9vOjY1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock)
        .await;

    let token = server.login("foo", "secret").await.unwrap();
    assert_eq!(token, "Zm9vOjY1");
    server.verify_token(&token).await.unwrap();

    let err = server.verify_token("stale").await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));

    server.logout(&token).await.unwrap();
}

#[tokio::test]
async fn test_login_rejected() {
    let (mock, server) = setup().await;
    Mock::given(method("POST"))
        .and(path("/_session"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "unauthorized", "reason": "Name or password is incorrect."
        })))
        .mount(&mock)
        .await;

    let err = server.login("foo", "wrong").await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));
}
