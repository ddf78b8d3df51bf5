//! Remote source access: request parameters, the [`Fetcher`] seam and a
//! blocking HTTP implementation.
//!
//! A [`Query`] is immutable. The pull stage derives one query per page with
//! [`Query::with_page`] instead of mutating a shared parameter map, so a
//! query handed to a fetcher always describes exactly one request.

use crate::config::Settings;
use crate::error::FetchError;
use regex::Regex;
use serde_json::Value;
use std::io::Read;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

static PAGE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]page=(\d+)").expect("valid page regex"));

/// Parameters for one request against the paginated endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    resource: String,
    params: Vec<(String, String)>,
    page: Option<u32>,
}

impl Query {
    /// A query against `resource` (e.g. `node.json`) with no filters.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: Vec::new(),
            page: None,
        }
    }

    /// Issue nodes sorted by creation time, oldest first.
    #[must_use]
    pub fn issues() -> Self {
        Query::new("node.json")
            .param("type", "project_issue")
            .param("sort", "created")
            .param("direction", "ASC")
    }

    /// Add or replace a parameter. `page` is reserved; use [`Query::with_page`].
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    /// A copy of this query addressing the zero-based page `page`.
    #[must_use]
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page: Some(page),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn page(&self) -> Option<u32> {
        self.page
    }

    /// Query-string pairs in send order, page last.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&str, String)> {
        let mut out: Vec<(&str, String)> = self
            .params
            .iter()
            .filter(|(k, _)| k != "page")
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        if let Some(page) = self.page {
            out.push(("page", page.to_string()));
        }
        out
    }
}

/// Raw body of a successful page response. Always valid JSON.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagePayload(Vec<u8>);

impl PagePayload {
    /// Wrap `bytes` after checking they hold a JSON document.
    ///
    /// # Errors
    /// Returns [`FetchError::InvalidPayload`] if the bytes do not parse.
    pub fn from_json_bytes(bytes: Vec<u8>) -> Result<Self, FetchError> {
        serde_json::from_slice::<serde::de::IgnoredAny>(&bytes)
            .map_err(|e| FetchError::InvalidPayload(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn from_value(value: &Value) -> Self {
        // Serializing a Value cannot fail.
        Self(serde_json::to_vec(value).unwrap_or_default())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parse the payload as a JSON value.
    ///
    /// # Errors
    /// Never fails for payloads built through the constructors.
    pub fn to_value(&self) -> Result<Value, FetchError> {
        serde_json::from_slice(&self.0).map_err(|e| FetchError::InvalidPayload(e.to_string()))
    }
}

/// Source of paginated payloads.
///
/// Implementations perform exactly one attempt per call; retry policy
/// belongs to the caller.
pub trait Fetcher {
    /// Number of pages the source reports for `query` (ignoring its page).
    fn total_pages(&self, query: &Query) -> Result<u32, FetchError>;

    /// Fetch the page addressed by `query`.
    fn fetch_page(&self, query: &Query) -> Result<PagePayload, FetchError>;
}

/// Blocking HTTP fetcher for `api-d7`-style endpoints.
pub struct HttpFetcher {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpFetcher {
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .user_agent(&settings.user_agent)
            .build();
        Self {
            agent,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn get(&self, query: &Query) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}/{}", self.base_url, query.resource());
        let mut request = self
            .agent
            .get(&url)
            .set("Accept", "application/json")
            .set("Content-Type", "application/json");
        for (key, value) in query.pairs() {
            request = request.query(key, &value);
        }
        debug!(url = %request.url(), "GET");

        match request.call() {
            Ok(response) => {
                let mut body = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut body)
                    .map_err(|e| FetchError::Transport(format!("read body of {url}: {e}")))?;
                Ok(body)
            }
            Err(ureq::Error::Status(status, response)) => Err(FetchError::Status {
                status,
                url: response.get_url().to_string(),
            }),
            Err(ureq::Error::Transport(t)) => Err(FetchError::Transport(t.to_string())),
        }
    }
}

impl Fetcher for HttpFetcher {
    fn total_pages(&self, query: &Query) -> Result<u32, FetchError> {
        let first = self.fetch_page(&query.with_page(0))?;
        total_pages_from_payload(&first.to_value()?)
    }

    fn fetch_page(&self, query: &Query) -> Result<PagePayload, FetchError> {
        PagePayload::from_json_bytes(self.get(query)?)
    }
}

/// Derive the page count from a response's `last` pagination link.
///
/// A response without a `last` link is the only page.
///
/// # Errors
/// Returns [`FetchError::InvalidPayload`] when `last` exists but carries no
/// page index.
pub fn total_pages_from_payload(payload: &Value) -> Result<u32, FetchError> {
    match payload.get("last").and_then(Value::as_str) {
        Some(link) => last_page_from_link(link)
            .map(|last| last.saturating_add(1))
            .ok_or_else(|| FetchError::InvalidPayload(format!("no page index in {link}"))),
        None => Ok(1),
    }
}

/// Extract the `page` query parameter from a pagination link.
#[must_use]
pub fn last_page_from_link(link: &str) -> Option<u32> {
    PAGE_PARAM
        .captures(link)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    #[test]
    fn with_page_leaves_the_base_query_untouched() {
        let base = Query::issues();
        let paged = base.with_page(3);
        assert_eq!(base.page(), None);
        assert_eq!(paged.page(), Some(3));
        assert_eq!(paged.pairs().last(), Some(&("page", "3".to_string())));
        assert!(base.pairs().iter().all(|(k, _)| *k != "page"));
    }

    #[test]
    fn param_replaces_existing_keys() {
        let q = Query::issues().param("direction", "DESC");
        let pairs = q.pairs();
        assert_eq!(pairs.iter().filter(|(k, _)| *k == "direction").count(), 1);
        assert!(pairs.contains(&("direction", "DESC".to_string())));
    }

    #[test]
    fn last_link_gives_total_pages() {
        let payload = json!({
            "list": [],
            "last": "https://www.drupal.org/api-d7/node.json?type=project_issue&page=41"
        });
        assert_eq!(total_pages_from_payload(&payload).unwrap(), 42);
        assert_eq!(total_pages_from_payload(&json!({"list": []})).unwrap(), 1);
        assert!(total_pages_from_payload(&json!({"last": "https://x/node.json"})).is_err());
    }

    /// Serve one canned response on a local port. The handle yields the
    /// request head.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&head).into_owned()
        });
        (base_url, handle)
    }

    fn http_fetcher(base_url: &str) -> HttpFetcher {
        HttpFetcher::new(&Settings {
            base_url: base_url.to_string(),
            ..Settings::default()
        })
    }

    #[test]
    fn http_success_returns_the_body_verbatim() {
        let body = r#"{"list":[{"nid":"1"}]}"#;
        let (base_url, server) = serve_once("200 OK", body);

        let payload = http_fetcher(&base_url)
            .fetch_page(&Query::issues().with_page(2))
            .unwrap();
        assert_eq!(payload.as_bytes(), body.as_bytes());

        let head = server.join().unwrap();
        let request_line = head.lines().next().unwrap();
        assert!(request_line.starts_with("GET /node.json?"), "{request_line}");
        assert!(request_line.contains("type=project_issue"));
        assert!(request_line.contains("direction=ASC"));
        assert!(request_line.contains("page=2"));
        assert!(head.to_ascii_lowercase().contains("user-agent: issuepipe/"));
    }

    #[test]
    fn http_total_pages_reads_page_zero() {
        let (base_url, server) =
            serve_once("200 OK", r#"{"list":[],"last":"http://x/node.json?page=4"}"#);
        assert_eq!(http_fetcher(&base_url).total_pages(&Query::issues()).unwrap(), 5);
        assert!(server.join().unwrap().contains("page=0"));
    }

    #[test]
    fn http_error_status_maps_to_status() {
        let (base_url, server) = serve_once("503 Service Unavailable", "{}");
        let err = http_fetcher(&base_url)
            .fetch_page(&Query::issues().with_page(0))
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }), "{err}");
        server.join().unwrap();
    }

    #[test]
    fn http_non_json_body_is_invalid_payload() {
        let (base_url, server) = serve_once("200 OK", "<html>maintenance</html>");
        let err = http_fetcher(&base_url)
            .fetch_page(&Query::issues().with_page(0))
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidPayload(_)), "{err}");
        server.join().unwrap();
    }

    #[test]
    fn http_refused_connection_is_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = http_fetcher(&base_url)
            .fetch_page(&Query::issues().with_page(0))
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)), "{err}");
    }

    #[test]
    fn payload_must_be_json() {
        assert!(PagePayload::from_json_bytes(b"{\"list\":[]}".to_vec()).is_ok());
        assert!(matches!(
            PagePayload::from_json_bytes(b"<html>".to_vec()),
            Err(FetchError::InvalidPayload(_))
        ));
    }
}
