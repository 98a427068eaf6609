//! Source Client boundary: fetching raw event records from the remote event-log API.
//!
//! The engine only sees the [`SourceClient`] trait. Timeouts and bounded retries are
//! the client's business ([`RetryPolicy`]); once retries are exhausted the client
//! returns [`SourceError::RetriesExhausted`] and the engine records an ordinary
//! extraction failure.

use crate::dataset::EventType;
use crate::error::SourceError;
use crate::table::EventRecord;
use crate::value::Value;
use std::collections::BTreeMap;
use std::io::{BufReader, Read};
use std::time::Duration;
use tracing::warn;

/// Query parameters for one fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchParams {
    /// Upstream event identifier, sent as `action=`.
    pub action: String,
    /// Additional query parameters, sent verbatim.
    pub extra: BTreeMap<String, String>,
}

impl FetchParams {
    pub fn for_action(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// Anything that can produce raw records for an event type.
pub trait SourceClient: Send + Sync {
    /// Fetch all records for `event_type`.
    ///
    /// # Errors
    /// Network, authentication or decoding failures, after the client's own retries.
    fn fetch(&self, event_type: &EventType, params: &FetchParams) -> Result<Vec<EventRecord>, SourceError>;
}

/// Outcome of one attempt inside [`RetryPolicy::run`].
#[derive(Debug)]
pub enum Attempt {
    /// Transient; try again after backoff.
    Retry(String),
    /// Permanent; stop immediately.
    Fatal(SourceError),
}

/// Bounded retries with exponential backoff (`backoff * 2^attempt`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Run `op` (given the 0-based attempt number) until it succeeds, fails fatally, or
    /// `max_retries` retries have been spent.
    ///
    /// # Errors
    /// The fatal error, or [`SourceError::RetriesExhausted`] with the last reason.
    pub fn run<T>(&self, mut op: impl FnMut(u32) -> Result<T, Attempt>) -> Result<T, SourceError> {
        let mut attempt = 0u32;
        loop {
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Retry(reason)) => {
                    if attempt >= self.max_retries {
                        return Err(SourceError::RetriesExhausted {
                            attempts: attempt + 1,
                            last: reason,
                        });
                    }
                    let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(attempt = attempt + 1, ?delay, %reason, "source request failed, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Decode an API response body: a JSON array of objects. `null` and an empty body
/// both mean "no events".
///
/// # Errors
/// [`SourceError::Decode`] for invalid JSON, a non-array body, or a non-object element.
pub fn records_from_json(body: &str) -> Result<Vec<EventRecord>, SourceError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let json = serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))?;
    records_from_value(json)
}

/// Streaming form of [`records_from_json`]; the body is never buffered as text.
///
/// # Errors
/// [`SourceError::Network`] when the reader fails, [`SourceError::Decode`] otherwise.
pub fn records_from_reader(reader: impl Read) -> Result<Vec<EventRecord>, SourceError> {
    let mut reader = ContentProbe {
        inner: BufReader::new(reader),
        seen_content: false,
    };
    match serde_json::from_reader::<_, serde_json::Value>(&mut reader) {
        Ok(json) => records_from_value(json),
        Err(e) if e.is_eof() && !reader.seen_content => Ok(Vec::new()),
        Err(e) if e.is_io() => Err(SourceError::Network(e.to_string())),
        Err(e) => Err(SourceError::Decode(e.to_string())),
    }
}

/// Tracks whether anything but whitespace went through the reader.
struct ContentProbe<R> {
    inner: R,
    seen_content: bool,
}

impl<R: Read> Read for ContentProbe<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if !self.seen_content {
            self.seen_content = buf[..n].iter().any(|b| !b.is_ascii_whitespace());
        }
        Ok(n)
    }
}

fn records_from_value(json: serde_json::Value) -> Result<Vec<EventRecord>, SourceError> {
    let items = match json {
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::Array(items) => items,
        other => {
            return Err(SourceError::Decode(format!(
                "expected a JSON array of events, got {}",
                json_kind(&other)
            )));
        }
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            serde_json::Value::Object(obj) => Ok(obj
                .into_iter()
                .map(|(k, v)| (k, Value::from_json(v)))
                .collect()),
            other => Err(SourceError::Decode(format!(
                "event #{i} is {}, expected an object",
                json_kind(&other)
            ))),
        })
        .collect()
}

const fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(feature = "http-source")]
pub use http::HttpSourceClient;

#[cfg(feature = "http-source")]
mod http {
    use super::{Attempt, FetchParams, RetryPolicy, SourceClient, records_from_reader};
    use crate::config::ApiConfig;
    use crate::dataset::EventType;
    use crate::error::SourceError;
    use crate::table::EventRecord;
    use std::time::Duration;
    use tracing::{debug, info};

    /// Bearer-token HTTP client for the event-log API.
    ///
    /// Building one never touches the network. A missing endpoint only surfaces when a
    /// fetch is needed, so runs served entirely from the cache work offline.
    pub struct HttpSourceClient {
        agent: ureq::Agent,
        endpoint: String,
        api_key: String,
        retry: RetryPolicy,
    }

    impl HttpSourceClient {
        #[must_use]
        pub fn new(api: &ApiConfig) -> Self {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(Duration::from_secs(api.timeout_secs)))
                .http_status_as_error(false)
                .build();
            Self {
                agent: ureq::Agent::new_with_config(config),
                endpoint: api.endpoint.trim().to_string(),
                api_key: api.api_key.clone(),
                retry: RetryPolicy {
                    max_retries: api.max_retries,
                    backoff: Duration::from_millis(api.backoff_ms),
                },
            }
        }

        fn attempt(&self, params: &FetchParams) -> Result<Vec<EventRecord>, Attempt> {
            let mut req = self
                .agent
                .get(&self.endpoint)
                .query("action", &params.action);
            for (k, v) in &params.extra {
                req = req.query(k, v);
            }
            if !self.api_key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", self.api_key));
            }
            let resp = req.call().map_err(|e| Attempt::Retry(e.to_string()))?;
            let status = resp.status().as_u16();
            match status {
                200..=299 => {}
                401 | 403 => return Err(Attempt::Fatal(SourceError::Auth { status })),
                429 | 500..=599 => return Err(Attempt::Retry(format!("HTTP {status}"))),
                _ => return Err(Attempt::Fatal(SourceError::Status { status })),
            }
            // The owned reader carries no body size limit.
            match records_from_reader(resp.into_body().into_reader()) {
                Err(SourceError::Network(reason)) => Err(Attempt::Retry(format!("reading body: {reason}"))),
                other => other.map_err(Attempt::Fatal),
            }
        }
    }

    impl SourceClient for HttpSourceClient {
        fn fetch(&self, event_type: &EventType, params: &FetchParams) -> Result<Vec<EventRecord>, SourceError> {
            if self.endpoint.is_empty() {
                return Err(SourceError::NotConfigured(
                    "api.endpoint (or API_URL) is empty".to_string(),
                ));
            }
            info!(event_type = %event_type.name, action = %params.action, "downloading fresh data");
            let records = self.retry.run(|attempt| {
                debug!(attempt, endpoint = %self.endpoint, "GET");
                self.attempt(params)
            })?;
            info!(event_type = %event_type.name, records = records.len(), "download complete");
            Ok(records)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::io::{BufRead, BufReader, Write};
        use std::net::TcpListener;
        use std::sync::{Arc, Mutex};
        use std::thread::{self, JoinHandle};

        /// One-request-per-connection server answering with `responses` in order.
        struct StubServer {
            url: String,
            requests: Arc<Mutex<Vec<String>>>,
            handle: JoinHandle<()>,
        }

        impl StubServer {
            fn start(responses: Vec<(u16, String)>) -> Self {
                let listener = TcpListener::bind("127.0.0.1:0").unwrap();
                let url = format!("http://{}/events", listener.local_addr().unwrap());
                let requests = Arc::new(Mutex::new(Vec::new()));
                let seen = Arc::clone(&requests);
                let handle = thread::spawn(move || {
                    for (status, body) in responses {
                        let (mut stream, _) = listener.accept().unwrap();
                        let mut reader = BufReader::new(stream.try_clone().unwrap());
                        let mut head = String::new();
                        loop {
                            let mut line = String::new();
                            if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                                break;
                            }
                            head.push_str(&line);
                        }
                        seen.lock().unwrap().push(head);
                        write!(
                            stream,
                            "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        )
                        .unwrap();
                        stream.write_all(body.as_bytes()).unwrap();
                        stream.flush().unwrap();
                    }
                });
                Self { url, requests, handle }
            }

            fn finish(self) -> Vec<String> {
                self.handle.join().unwrap();
                Arc::try_unwrap(self.requests).unwrap().into_inner().unwrap()
            }
        }

        fn client(endpoint: &str) -> HttpSourceClient {
            HttpSourceClient::new(&ApiConfig {
                endpoint: endpoint.to_string(),
                api_key: "secret".to_string(),
                timeout_secs: 10,
                max_retries: 3,
                backoff_ms: 0,
            })
        }

        fn battles() -> (EventType, FetchParams) {
            (EventType::new("battles", "BATTLE"), FetchParams::for_action("BATTLE"))
        }

        #[test]
        fn sends_action_and_bearer_token() {
            let server = StubServer::start(vec![(200, r#"[{"player":"Ash"},{"player":"Misty"}]"#.to_string())]);
            let (event, params) = battles();
            let records = client(&server.url).fetch(&event, &params).unwrap();
            assert_eq!(records.len(), 2);

            let requests = server.finish();
            assert_eq!(requests.len(), 1);
            assert!(requests[0].starts_with("GET /events?action=BATTLE HTTP/1.1"), "{}", requests[0]);
            assert!(requests[0].to_ascii_lowercase().contains("authorization: bearer secret"));
        }

        #[test]
        fn auth_rejections_are_not_retried() {
            for status in [401, 403] {
                let server = StubServer::start(vec![(status, String::new())]);
                let (event, params) = battles();
                let err = client(&server.url).fetch(&event, &params).unwrap_err();
                assert!(matches!(err, SourceError::Auth { status: s } if s == status));
                assert_eq!(server.finish().len(), 1);
            }
        }

        #[test]
        fn throttling_and_server_errors_are_retried() {
            let server = StubServer::start(vec![
                (429, String::new()),
                (503, String::new()),
                (200, r#"[{"n":1}]"#.to_string()),
            ]);
            let (event, params) = battles();
            let records = client(&server.url).fetch(&event, &params).unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(server.finish().len(), 3);
        }

        #[test]
        fn other_statuses_fail_without_retry() {
            let server = StubServer::start(vec![(500, String::new()), (404, String::new())]);
            let (event, params) = battles();
            let err = client(&server.url).fetch(&event, &params).unwrap_err();
            assert!(matches!(err, SourceError::Status { status: 404 }));
            assert_eq!(server.finish().len(), 2);
        }

        #[test]
        fn bodies_above_ten_mebibytes_are_read() {
            let row = r#"{"player":"Ash","context_data":"{'result': 'WIN', 'padding': 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx'}"}"#;
            let count = (11 * 1024 * 1024) / row.len() + 1;
            let body = format!("[{}]", vec![row; count].join(","));
            assert!(body.len() > 10 * 1024 * 1024);

            let server = StubServer::start(vec![(200, body)]);
            let (event, params) = battles();
            let records = client(&server.url).fetch(&event, &params).unwrap();
            assert_eq!(records.len(), count);
            assert_eq!(server.finish().len(), 1);
        }

        #[test]
        fn missing_endpoint_fails_at_fetch_time() {
            let (event, params) = battles();
            let err = client("  ").fetch(&event, &params).unwrap_err();
            assert!(matches!(err, SourceError::NotConfigured(_)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_array_of_objects() {
        let recs = records_from_json(r#"[{"player":"Ash","stats":"{'iv': 1}"},{"n":2}]"#).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0]["stats"], Value::from("{'iv': 1}"));
        assert_eq!(recs[1]["n"], Value::Int(2));
    }

    #[test]
    fn null_and_empty_bodies_are_empty() {
        assert!(records_from_json("null").unwrap().is_empty());
        assert!(records_from_json("  ").unwrap().is_empty());
    }

    #[test]
    fn reader_matches_text_decoding() {
        let body = r#"[{"player":"Ash"},{"n":2}]"#;
        assert_eq!(records_from_reader(body.as_bytes()).unwrap(), records_from_json(body).unwrap());
        assert!(records_from_reader(" \n ".as_bytes()).unwrap().is_empty());
        assert!(records_from_reader("null".as_bytes()).unwrap().is_empty());
        assert!(matches!(records_from_reader("[{\"a\":".as_bytes()), Err(SourceError::Decode(_))));
        assert!(matches!(records_from_reader("7".as_bytes()), Err(SourceError::Decode(_))));
    }

    #[test]
    fn rejects_non_array_bodies() {
        assert!(matches!(records_from_json(r#"{"a":1}"#), Err(SourceError::Decode(_))));
        assert!(matches!(records_from_json("[1]"), Err(SourceError::Decode(_))));
    }

    #[test]
    fn retry_gives_up_after_budget() {
        let policy = RetryPolicy {
            max_retries: 2,
            backoff: Duration::ZERO,
        };
        let mut calls = 0;
        let err = policy
            .run::<()>(|_| {
                calls += 1;
                Err(Attempt::Retry("timeout".into()))
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(err, SourceError::RetriesExhausted { attempts: 3, .. }));
    }

    #[test]
    fn retry_stops_on_fatal_and_recovers_on_success() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff: Duration::ZERO,
        };
        let err = policy
            .run::<()>(|_| Err(Attempt::Fatal(SourceError::Auth { status: 401 })))
            .unwrap_err();
        assert!(matches!(err, SourceError::Auth { status: 401 }));

        let got = policy
            .run(|attempt| {
                if attempt < 2 {
                    Err(Attempt::Retry("flaky".into()))
                } else {
                    Ok(attempt)
                }
            })
            .unwrap();
        assert_eq!(got, 2);
    }
}
