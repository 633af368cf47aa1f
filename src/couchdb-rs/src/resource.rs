//! Low level HTTP access to a CouchDB URL.
//!
//! A [`Resource`] owns a base URL (credentials stripped and sent as Basic
//! auth instead) and a shared `reqwest` client. Every response goes through
//! the status table in [`ClientError::from_status`].

use std::time::Duration;

use couchdb_core::{encode_params, ClientConfig, Params};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::{ClientError, Result};

/// URL path segment set, plus `+`, which CouchDB decodes as a space
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Clone)]
struct Credentials {
    username: String,
    password: Option<String>,
}

#[derive(Clone)]
pub struct Resource {
    client: HttpClient,
    base: Url,
    credentials: Option<Credentials>,
}

/// Build the shared HTTP client for a config
pub fn build_client(config: &ClientConfig) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if !config.full_commit {
        headers.insert(
            HeaderName::from_static("x-couch-full-commit"),
            HeaderValue::from_static("false"),
        );
    }

    let mut builder = HttpClient::builder()
        .default_headers(headers)
        .user_agent(config.user_agent.clone());
    if config.timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout_secs));
    }
    if config.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder.build()?)
}

impl Resource {
    pub fn new(url: &str, config: &ClientConfig) -> Result<Self> {
        Self::with_client(url, build_client(config)?)
    }

    /// Parse `url`, moving any `user:pass@` part into Basic auth
    pub fn with_client(url: &str, client: HttpClient) -> Result<Self> {
        let mut base = Url::parse(url)?;
        if base.cannot_be_a_base() || base.host_str().is_none() {
            return Err(ClientError::InvalidArgument(format!(
                "not an HTTP base URL: {}",
                url
            )));
        }

        let credentials = if base.username().is_empty() {
            None
        } else {
            Some(Credentials {
                username: decode(base.username()),
                password: base.password().map(decode),
            })
        };
        let _ = base.set_password(None);
        let _ = base.set_username("");
        base.set_query(None);
        base.set_fragment(None);
        if let Ok(mut segments) = base.path_segments_mut() {
            segments.pop_if_empty();
        }

        Ok(Self {
            client,
            base,
            credentials,
        })
    }

    /// Base URL without credentials
    pub fn url(&self) -> &Url {
        &self.base
    }

    /// Last path segment of the base URL, decoded
    pub fn last_segment(&self) -> Option<String> {
        self.base
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .map(decode)
    }

    /// URL of a sub path with the credentials put back in.
    /// Handed to the server itself, e.g. as a replication endpoint.
    pub fn authenticated_url(&self, path: &[&str]) -> Url {
        let mut url = self.url_for(path);
        if let Some(creds) = &self.credentials {
            let _ = url.set_username(&creds.username);
            let _ = url.set_password(creds.password.as_deref());
        }
        url
    }

    /// Resource rooted at a sub path
    pub fn child(&self, path: &[&str]) -> Resource {
        Resource {
            client: self.client.clone(),
            base: self.url_for(path),
            credentials: self.credentials.clone(),
        }
    }

    /// Same URL without Basic auth
    pub fn anonymous(&self) -> Resource {
        Resource {
            credentials: None,
            ..self.clone()
        }
    }

    pub fn url_for(&self, path: &[&str]) -> Url {
        let mut url = self.base.clone();
        if !path.is_empty() {
            let mut full = url.path().trim_end_matches('/').to_string();
            for segment in path {
                full.push('/');
                full.extend(utf8_percent_encode(segment, PATH_SEGMENT));
            }
            url.set_path(&full);
        }
        url
    }

    /// Start a request; auth is applied, params are encoded
    pub fn request(
        &self,
        method: Method,
        path: &[&str],
        params: Option<&Params>,
    ) -> RequestBuilder {
        let mut builder = self.client.request(method, self.url_for(path));
        if let Some(creds) = &self.credentials {
            builder = builder.basic_auth(&creds.username, creds.password.as_ref());
        }
        match params {
            Some(p) if !p.is_empty() => builder.query(&encode_params(p)),
            _ => builder,
        }
    }

    /// Send a request and map error statuses
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build()?;
        let method = request.method().clone();
        let url = request.url().clone();

        let response = self.client.execute(request).await?;
        let status = response.status();
        debug!(%method, %url, status = status.as_u16(), "couchdb request");

        if status.is_success() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(%method, %url, error = %e, "failed to read error body");
                String::new()
            }
        };
        if status.is_server_error() {
            warn!(%method, %url, status = status.as_u16(), body = %body, "couchdb server error");
        }
        Err(ClientError::from_status(status, &body))
    }

    async fn call<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        decode_json(response).await
    }

    pub async fn head(&self, path: &[&str], params: Option<&Params>) -> Result<HeaderMap> {
        let response = self.send(self.request(Method::HEAD, path, params)).await?;
        Ok(response.headers().clone())
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &[&str],
        params: Option<&Params>,
    ) -> Result<T> {
        self.call(self.request(Method::GET, path, params)).await
    }

    pub async fn put_json<B, T>(
        &self,
        path: &[&str],
        body: &B,
        params: Option<&Params>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(self.request(Method::PUT, path, params).json(body))
            .await
    }

    /// PUT without a body, e.g. database creation
    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &[&str],
        params: Option<&Params>,
    ) -> Result<T> {
        self.call(self.request(Method::PUT, path, params)).await
    }

    pub async fn post_json<B, T>(
        &self,
        path: &[&str],
        body: &B,
        params: Option<&Params>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(self.request(Method::POST, path, params).json(body))
            .await
    }

    pub async fn delete_json<T: DeserializeOwned>(
        &self,
        path: &[&str],
        params: Option<&Params>,
    ) -> Result<T> {
        self.call(self.request(Method::DELETE, path, params)).await
    }

    /// COPY `path` to the document named by `destination`
    pub async fn copy<T: DeserializeOwned>(&self, path: &[&str], destination: &str) -> Result<T> {
        let method = Method::from_bytes(b"COPY")
            .map_err(|e| ClientError::InvalidArgument(e.to_string()))?;
        let builder = self
            .request(method, path, None)
            .header("Destination", destination);
        self.call(builder).await
    }

    /// GET raw bytes and their content type
    pub async fn get_bytes(
        &self,
        path: &[&str],
        params: Option<&Params>,
    ) -> Result<(Option<String>, Vec<u8>)> {
        let builder = self
            .request(Method::GET, path, params)
            .header(ACCEPT, "*/*");
        let response = self.send(builder).await?;
        let content_type = content_type(&response);
        let body = response.bytes().await?;
        Ok((content_type, body.to_vec()))
    }

    pub async fn put_bytes<T: DeserializeOwned>(
        &self,
        path: &[&str],
        body: Vec<u8>,
        mime: &str,
        params: Option<&Params>,
    ) -> Result<T> {
        let builder = self
            .request(Method::PUT, path, params)
            .header(CONTENT_TYPE, mime)
            .body(body);
        self.call(builder).await
    }
}

pub fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
