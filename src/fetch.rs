//! Blocking HTTP access to the vendor APIs.
//!
//! Every call is independent: a failure is returned to the caller, which
//! records it and moves on to the next endpoint of the cycle.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::error::FetchError;

/// Per-call timeout, covering connect, request and body.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=utf-8";

/// A response body. JSON when the server said so, opaque bytes otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Raw(Vec<u8>),
}

impl Body {
    /// Render the body for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Body::Json(value) => value.to_string(),
            Body::Raw(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// The two request shapes the readers need.
pub trait Transport {
    /// GET `url` with a bearer `Authorization` header.
    fn get(&self, url: &str, bearer: &str) -> Result<Body, FetchError>;

    /// POST `params` form-encoded to `url`, optionally authenticated.
    fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> Result<Body, FetchError>;
}

/// [`Transport`] backed by a blocking `reqwest` client.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn send(&self, url: &str, request: RequestBuilder) -> Result<Body, FetchError> {
        let response = request.send().map_err(|err| classify(url, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("application/json"));

        let bytes = response.bytes().map_err(|err| classify(url, err))?;

        if is_json {
            serde_json::from_slice(&bytes)
                .map(Body::Json)
                .map_err(|source| FetchError::Decode {
                    url: url.to_string(),
                    source,
                })
        } else {
            Ok(Body::Raw(bytes.to_vec()))
        }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, bearer: &str) -> Result<Body, FetchError> {
        let request = self
            .client
            .get(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(AUTHORIZATION, bearer_header(bearer));

        self.send(url, request)
    }

    fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> Result<Body, FetchError> {
        // `.form()` sets the urlencoded content type itself.
        let mut request = self.client.post(url).form(params);
        if let Some(token) = bearer {
            request = request.header(AUTHORIZATION, bearer_header(token));
        }

        self.send(url, request)
    }
}

/// Tokens pasted from the Home Assistant UI sometimes already carry the
/// scheme.
fn bearer_header(token: &str) -> String {
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {token}")
    }
}

fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            source: err,
        }
    }
}


#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn get_parses_json_and_sends_bearer() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/states/sensor.hall")
            .match_header("authorization", "Bearer abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"state":"20.5"}"#)
            .create();

        let transport = HttpTransport::new().unwrap();
        let url = format!("{}/api/states/sensor.hall", server.url());
        let body = transport.get(&url, "abc").unwrap();

        mock.assert();
        assert_eq!(body, Body::Json(serde_json::json!({"state": "20.5"})));
    }

    #[test]
    fn existing_bearer_prefix_is_kept() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/x")
            .match_header("authorization", "Bearer abc")
            .with_status(200)
            .with_body("ok")
            .create();

        let transport = HttpTransport::new().unwrap();
        transport.get(&format!("{}/x", server.url()), "Bearer abc").unwrap();

        mock.assert();
    }

    #[test]
    fn non_json_body_is_returned_raw() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/plain")
            .with_status(200)
            .with_header("content-type", "text/plain")
            .with_body("hello")
            .create();

        let transport = HttpTransport::new().unwrap();
        let body = transport.get(&format!("{}/plain", server.url()), "t").unwrap();

        assert_eq!(body, Body::Raw(b"hello".to_vec()));
    }

    #[test]
    fn broken_json_is_a_decode_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/broken")
            .with_status(200)
            .with_header("content-type", "application/json; charset=utf-8")
            .with_body("{not json")
            .create();

        let transport = HttpTransport::new().unwrap();
        let err = transport
            .get(&format!("{}/broken", server.url()), "t")
            .unwrap_err();

        assert!(matches!(err, FetchError::Decode { .. }), "{err}");
    }

    #[test]
    fn error_status_is_reported() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/oauth2/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create();

        let transport = HttpTransport::new().unwrap();
        let err = transport
            .post_form(&format!("{}/oauth2/token", server.url()), &[], None)
            .unwrap_err();

        match err {
            FetchError::Status { status, body, .. } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn post_form_encodes_params() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/homestatus")
            .match_header("authorization", "Bearer tok")
            .match_body(mockito::Matcher::UrlEncoded("home_id".into(), "h1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"ok"}"#)
            .create();

        let transport = HttpTransport::new().unwrap();
        let url = format!("{}/api/homestatus", server.url());
        transport
            .post_form(&url, &[("home_id", "h1")], Some("tok"))
            .unwrap();

        mock.assert();
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let transport = HttpTransport::new().unwrap();
        let err = transport
            .get(&format!("http://127.0.0.1:{port}/"), "t")
            .unwrap_err();

        assert!(matches!(err, FetchError::Transport { .. }), "{err}");
    }

    #[test]
    fn silent_server_is_a_timeout() {
        // Connections complete in the backlog but are never answered.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/api/homestatus", listener.local_addr().unwrap());

        let transport = HttpTransport::with_timeout(Duration::from_millis(200)).unwrap();
        let err = transport.post_form(&url, &[("home_id", "h1")], Some("tok")).unwrap_err();

        match err {
            FetchError::Timeout { url: failed } => assert_eq!(failed, url),
            other => panic!("unexpected error: {other}"),
        }
        drop(listener);
    }
}
