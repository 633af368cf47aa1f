//! Shared setup for tests that run against a mock CouchDB.

#![allow(dead_code)]

use couchdb_rs::Server;
use wiremock::MockServer;

pub const USER: &str = "root";
pub const PASSWORD: &str = "secret";
/// `Basic base64(root:secret)`
pub const AUTH_HEADER: &str = "Basic cm9vdDpzZWNyZXQ=";

/// A mock server and a client pointed at it with embedded credentials
pub async fn setup() -> (MockServer, Server) {
    let mock = MockServer::start().await;
    let url = format!("http://{}:{}@{}", USER, PASSWORD, mock.address());
    let server = Server::new(&url).expect("valid mock url");
    (mock, server)
}
