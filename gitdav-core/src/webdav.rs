//! WebDAV client for the backup collection
//!
//! Uses `PROPFIND` with `Depth: 1` to list the collection and `PUT` to upload.

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use quick_xml::events::Event;
use quick_xml::name::{LocalName, Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use reqwest::{header, Method, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::retry::{retry_async, RetryConfig};
use crate::store::BackupStore;
use crate::{Error, Result};

/// Characters escaped when a resource name becomes a URL path segment
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const DAV_NAMESPACE: &[u8] = b"DAV:";

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:"><d:prop><d:resourcetype/></d:prop></d:propfind>"#;

/// WebDAV client bound to one collection URL
#[derive(Clone)]
pub struct WebDavClient {
    http: reqwest::Client,
    collection: Url,
    username: String,
    password: String,
    retry: RetryConfig,
}

impl std::fmt::Debug for WebDavClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDavClient")
            .field("collection", &self.collection.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl WebDavClient {
    /// Create a client for the collection at `url`
    pub fn new(
        url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let mut collection = Url::parse(url.trim())
            .map_err(|e| Error::Config(format!("Invalid WebDAV URL '{}': {}", url, e)))?;

        if !matches!(collection.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "WebDAV URL must be http or https: {}",
                url
            )));
        }

        // Url::join replaces the last segment unless the path ends with '/'
        if !collection.path().ends_with('/') {
            let path = format!("{}/", collection.path());
            collection.set_path(&path);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            collection,
            username: username.into(),
            password: password.into(),
            retry: RetryConfig::default(),
        })
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Collection URL (always ends with `/`)
    pub fn collection(&self) -> &Url {
        &self.collection
    }

    /// URL of resource `name` inside the collection
    pub fn resource_url(&self, name: &str) -> Result<Url> {
        let segment = utf8_percent_encode(name, SEGMENT).to_string();
        self.collection
            .join(&segment)
            .map_err(|e| Error::Parse(format!("Invalid resource name '{}': {}", name, e)))
    }

    async fn propfind(&self) -> Result<String> {
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| Error::Other(format!("Invalid HTTP method: {}", e)))?;

        let response = self
            .http
            .request(method, self.collection.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header("Depth", "1")
            .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await?;

        let response = check_status(response, self.collection.as_str())?;
        Ok(response.text().await?)
    }

    async fn put_once(&self, url: &Url, bytes: Bytes) -> Result<()> {
        let response = self
            .http
            .put(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header(header::CONTENT_TYPE, "application/zip")
            .body(bytes)
            .send()
            .await?;

        check_status(response, url.as_str())?;
        Ok(())
    }
}

#[async_trait]
impl BackupStore for WebDavClient {
    async fn list(&self) -> Result<Vec<String>> {
        let body = retry_async(&self.retry, "webdav list", move || self.propfind()).await?;
        let names = parse_multistatus_names(&body, self.collection.path())?;
        debug!(count = names.len(), collection = %self.collection, "Listed WebDAV collection");
        Ok(names)
    }

    async fn put(&self, name: &str, bytes: Bytes) -> Result<()> {
        let url = self.resource_url(name)?;
        let size = bytes.len();
        let target = &url;
        retry_async(&self.retry, "webdav put", || {
            self.put_once(target, bytes.clone())
        })
        .await?;
        info!(resource = %url, bytes = size, "Uploaded archive");
        Ok(())
    }
}

fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Auth(format!("WebDAV server rejected credentials ({})", status)));
    }
    Err(Error::Http {
        status: status.as_u16(),
        url: url.to_string(),
    })
}

/// Extract the member names from a `207 Multi-Status` body
///
/// Only `href` elements in the `DAV:` namespace count. The collection itself
/// and sub-collections are skipped.
pub(crate) fn parse_multistatus_names(body: &str, collection_path: &str) -> Result<Vec<String>> {
    let collection_path = collection_path.trim_end_matches('/');
    let names = parse_hrefs(body)?
        .iter()
        .filter_map(|href| member_name(href, collection_path))
        .collect();
    Ok(names)
}

fn parse_hrefs(body: &str) -> Result<Vec<String>> {
    let mut reader = NsReader::from_str(body);
    let mut hrefs = Vec::new();
    let mut current: Option<String> = None;

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(multistatus_error)?;
        let in_dav = matches!(ns, ResolveResult::Bound(Namespace(uri)) if uri == DAV_NAMESPACE);
        match event {
            Event::Start(start) if in_dav && is_href(start.local_name()) => {
                current = Some(String::new());
            }
            Event::End(end) if in_dav && is_href(end.local_name()) => {
                if let Some(href) = current.take() {
                    hrefs.push(href.trim().to_string());
                }
            }
            Event::Text(text) => {
                if let Some(href) = current.as_mut() {
                    href.push_str(&text.unescape().map_err(multistatus_error)?);
                }
            }
            Event::CData(data) => {
                if let Some(href) = current.as_mut() {
                    href.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(hrefs)
}

fn is_href(local: LocalName<'_>) -> bool {
    local.as_ref() == b"href"
}

fn multistatus_error(err: quick_xml::Error) -> Error {
    Error::Parse(format!("Malformed multistatus reply: {}", err))
}

fn member_name(href: &str, collection_path: &str) -> Option<String> {
    let path = strip_origin(href);
    if path.ends_with('/') || path == collection_path {
        return None;
    }
    let segment = path.rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    Some(percent_decode_str(segment).decode_utf8_lossy().into_owned())
}

fn strip_origin(href: &str) -> &str {
    match href.find("://") {
        Some(idx) => {
            let rest = &href[idx + 3..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or("/")
        }
        None => href,
    }
}
