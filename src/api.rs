// Remote accessor
// The only path to the network: authenticated JSON requests against the portal API.

use crate::config::ClientConfig;
use crate::storage::TokenStore;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error: {status_code} - {}", detail.as_deref().unwrap_or("no detail"))]
    HttpError {
        status_code: u16,
        code: Option<String>,
        detail: Option<String>,
    },

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::HttpError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    // Text shown to the user: server detail when there is one, a generic line otherwise
    pub fn user_message(&self) -> String {
        match self {
            ApiError::NetworkError(_) => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            ApiError::HttpError {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => detail.clone(),
            ApiError::HttpError {
                status_code: 401, ..
            } => "Your session has expired. Please sign in again.".to_string(),
            ApiError::HttpError {
                status_code: 403, ..
            } => "You do not have permission to do that.".to_string(),
            ApiError::HttpError {
                status_code: 404, ..
            } => "The requested item could not be found.".to_string(),
            ApiError::HttpError { status_code, .. } => {
                format!("Request failed with status {}", status_code)
            }
            ApiError::DecodeError(_) => "The server sent an unexpected response.".to_string(),
            ApiError::InvalidRequest(_) => "The request could not be prepared.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: Bytes::from(body.to_string()),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: Bytes::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// Wire seam: anything that can move one request and bring back status + body.
// Implementations only ever fail with NetworkError.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout_ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.config.endpoint(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };

        builder = builder.header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Ok(ApiResponse { status, body })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
}

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    stats: Arc<Mutex<ClientStats>>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, tokens: TokenStore) -> Self {
        Self {
            transport,
            tokens,
            stats: Arc::new(Mutex::new(ClientStats::default())),
        }
    }

    pub fn http(config: ClientConfig, tokens: TokenStore) -> Result<Self, ApiError> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?), tokens))
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }

    pub async fn request(&self, mut request: ApiRequest) -> Result<Value, ApiError> {
        if let Some(token) = self.tokens.token() {
            request = request.with_header("Authorization", format!("Bearer {}", token));
        }

        let method = request.method.as_str();
        let path = request.path.clone();
        tracing::debug!(
            method,
            path = %path,
            body = %request.body.as_ref().map(sanitize).unwrap_or(serde_json::Value::Null),
            "sending request"
        );

        self.stats.lock().requests_sent += 1;
        let result = match self.transport.send(request).await {
            Ok(response) => interpret(response),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => {
                self.stats.lock().requests_succeeded += 1;
                tracing::debug!(method, path = %path, "request succeeded");
            }
            Err(e) => {
                self.stats.lock().requests_failed += 1;
                tracing::warn!(method, path = %path, error = %e, "request failed");
            }
        }

        result
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let value = self.request(ApiRequest::new(Method::Get, path)).await?;
        decode_body(value)
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::new(Method::Put, path).with_body(encode_body(body)?);
        decode_body(self.request(request).await?)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::new(Method::Post, path).with_body(encode_body(body)?);
        decode_body(self.request(request).await?)
    }

    // Response body, if any, is ignored
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.request(ApiRequest::new(Method::Delete, path))
            .await
            .map(|_| ())
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

fn interpret(response: ApiResponse) -> Result<Value, ApiError> {
    if response.is_success() {
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        return serde_json::from_slice(&response.body)
            .map_err(|e| ApiError::DecodeError(e.to_string()));
    }

    let (code, detail) = error_details(&response.body);

    Err(ApiError::HttpError {
        status_code: response.status,
        code,
        detail,
    })
}

// Pulls `code` and a readable detail out of an error body. Only JSON objects count;
// `detail` may be a string or a list of `{"msg": ...}` entries.
fn error_details(body: &[u8]) -> (Option<String>, Option<String>) {
    let parsed = serde_json::from_slice::<Value>(body).ok();
    let Some(fields) = parsed.as_ref().and_then(Value::as_object) else {
        return (None, None);
    };

    let code = fields.get("code").and_then(|c| match c {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    });
    let detail = ["detail", "message", "error"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(detail_text));

    (code, detail)
}

fn detail_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.as_str()),
                    other => other.get("msg").and_then(Value::as_str),
                })
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
}

// Accepts the bare payload or an object whose only key is `data`
pub fn decode_body<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    let payload = match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(payload).map_err(|e| ApiError::DecodeError(e.to_string()))
}

const REDACTED: &str = "[REDACTED]";

fn is_sensitive(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    matches!(normalized.as_str(), "pin" | "cvv" | "cvc")
        || [
            "password",
            "token",
            "secret",
            "apikey",
            "cardnumber",
            "accountnumber",
            "authorization",
        ]
        .iter()
        .any(|needle| normalized.contains(needle))
}

// Copy of `value` with sensitive fields blanked, safe to log
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if is_sensitive(k) {
                        (k.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (k.clone(), sanitize(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

// Scripted transport for tests: canned responses per (method, path), optional latency
#[cfg(test)]
pub mod mock_transport {
    use super::*;
    use std::collections::{HashMap, VecDeque};

    #[derive(Clone)]
    struct Scripted {
        delay: Duration,
        outcome: Result<ApiResponse, ApiError>,
    }

    #[derive(Default)]
    pub struct ScriptedTransport {
        routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
        sticky: Mutex<HashMap<(Method, String), Scripted>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        // Answered every time the route is hit, unless a queued reply exists
        pub fn always(&self, method: Method, path: &str, status: u16, body: Value) {
            self.sticky.lock().insert(
                (method, path.to_string()),
                Scripted {
                    delay: Duration::ZERO,
                    outcome: Ok(ApiResponse::json(status, &body)),
                },
            );
        }

        pub fn reply(&self, method: Method, path: &str, status: u16, body: Value) {
            self.reply_after(method, path, status, body, Duration::ZERO);
        }

        pub fn reply_after(
            &self,
            method: Method,
            path: &str,
            status: u16,
            body: Value,
            delay: Duration,
        ) {
            self.push(
                method,
                path,
                Scripted {
                    delay,
                    outcome: Ok(ApiResponse::json(status, &body)),
                },
            );
        }

        pub fn reply_raw(&self, method: Method, path: &str, status: u16, body: &str) {
            self.push(
                method,
                path,
                Scripted {
                    delay: Duration::ZERO,
                    outcome: Ok(ApiResponse {
                        status,
                        body: Bytes::from(body.to_string()),
                    }),
                },
            );
        }

        pub fn fail(&self, method: Method, path: &str, message: &str) {
            self.push(
                method,
                path,
                Scripted {
                    delay: Duration::ZERO,
                    outcome: Err(ApiError::NetworkError(message.to_string())),
                },
            );
        }

        fn push(&self, method: Method, path: &str, scripted: Scripted) {
            self.routes
                .lock()
                .entry((method, path.to_string()))
                .or_default()
                .push_back(scripted);
        }

        pub fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().clone()
        }

        pub fn count(&self, method: Method, path: &str) -> usize {
            self.requests
                .lock()
                .iter()
                .filter(|r| r.method == method && r.path == path)
                .count()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
            let key = (request.method, request.path.clone());
            self.requests.lock().push(request);

            let scripted = {
                let queued = self.routes.lock().get_mut(&key).and_then(|q| q.pop_front());
                queued.or_else(|| self.sticky.lock().get(&key).cloned())
            };

            match scripted {
                Some(scripted) => {
                    if !scripted.delay.is_zero() {
                        tokio::time::sleep(scripted.delay).await;
                    }
                    scripted.outcome
                }
                None => {
                    let detail = format!("no route for {} {}", key.0.as_str(), key.1);
                    Ok(ApiResponse::json(404, &serde_json::json!({ "detail": detail })))
                }
            }
        }
    }

    pub fn client_with(transport: Arc<ScriptedTransport>) -> ApiClient {
        let tokens = TokenStore::new(Arc::new(crate::storage::MemoryStore::new()));
        ApiClient::new(transport, tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::mock_transport::{client_with, ScriptedTransport};
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use test_case::test_case;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Destination {
        id: u64,
        name: String,
    }

    #[tokio::test]
    async fn test_bearer_token_attached_when_present() {
        let transport = ScriptedTransport::new();
        transport.always(Method::Get, "/destinations", 200, json!([]));
        let client = client_with(transport.clone());

        let _: Vec<Destination> = client.get("/destinations").await.unwrap();
        client.tokens().set_token("jwt-abc").unwrap();
        let _: Vec<Destination> = client.get("/destinations").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].header("authorization").is_none());
        assert_eq!(requests[1].header("Authorization"), Some("Bearer jwt-abc"));
    }

    #[tokio::test]
    async fn test_decodes_plain_and_enveloped_payloads() {
        let transport = ScriptedTransport::new();
        transport.reply(Method::Get, "/destinations", 200, json!([{"id": 1, "name": "Lagos"}]));
        transport.reply(
            Method::Get,
            "/destinations",
            200,
            json!({"data": [{"id": 2, "name": "Abuja"}]}),
        );
        let client = client_with(transport);

        let first: Vec<Destination> = client.get("/destinations").await.unwrap();
        let second: Vec<Destination> = client.get("/destinations").await.unwrap();
        assert_eq!(first[0].name, "Lagos");
        assert_eq!(second[0].name, "Abuja");
    }

    #[test]
    fn test_data_key_next_to_other_fields_is_payload() {
        let value: Value = decode_body(json!({"data": "raw", "id": 4})).unwrap();
        assert_eq!(value, json!({"data": "raw", "id": 4}));
    }

    #[test_case(
        json!({"detail": "Rate must be positive", "code": "invalid_rate"}),
        Some("invalid_rate"),
        Some("Rate must be positive") ;
        "detail and code"
    )]
    #[test_case(
        json!({"message": "Booking locked"}),
        None,
        Some("Booking locked") ;
        "message field"
    )]
    #[test_case(json!({"error": "nope", "code": 42}), Some("42"), Some("nope") ; "numeric code")]
    #[test_case(json!(["unexpected"]), None, None ; "unparseable error body")]
    #[test_case(
        json!({"detail": [
            {"loc": ["body", "rate"], "msg": "must be positive"},
            {"msg": "code is required"}
        ]}),
        None,
        Some("must be positive; code is required") ;
        "list of validation details"
    )]
    #[tokio::test]
    async fn test_http_error_details(body: Value, code: Option<&str>, detail: Option<&str>) {
        let transport = ScriptedTransport::new();
        transport.reply(Method::Put, "/admin/currencies/2", 422, body);
        let client = client_with(transport);

        let err = client
            .put::<_, Value>("/admin/currencies/2", &json!({"rate": -1}))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::HttpError {
                status_code: 422,
                code: code.map(str::to_string),
                detail: detail.map(str::to_string),
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_decode_error() {
        let transport = ScriptedTransport::new();
        transport.reply_raw(Method::Get, "/bookings", 200, "<html>oops</html>");
        let client = client_with(transport);

        let err = client.get::<Value>("/bookings").await.unwrap_err();
        assert!(matches!(err, ApiError::DecodeError(_)));
        assert_eq!(err.user_message(), "The server sent an unexpected response.");
    }

    #[tokio::test]
    async fn test_network_failure_and_stats() {
        let transport = ScriptedTransport::new();
        transport.fail(Method::Delete, "/bookings/7", "connection reset");
        transport.reply(Method::Delete, "/bookings/7", 204, Value::Null);
        let client = client_with(transport);

        let err = client.delete("/bookings/7").await.unwrap_err();
        assert!(matches!(err, ApiError::NetworkError(_)));
        client.delete("/bookings/7").await.unwrap();

        let stats = client.stats();
        assert_eq!(stats.requests_sent, 2);
        assert_eq!(stats.requests_failed, 1);
        assert_eq!(stats.requests_succeeded, 1);
    }

    #[test]
    fn test_user_messages_prefer_server_detail() {
        let with_detail = ApiError::HttpError {
            status_code: 400,
            code: None,
            detail: Some("Check-out must follow check-in".to_string()),
        };
        assert_eq!(with_detail.user_message(), "Check-out must follow check-in");

        let unauthorized = ApiError::HttpError {
            status_code: 401,
            code: None,
            detail: None,
        };
        assert!(unauthorized.user_message().contains("sign in"));

        let server = ApiError::HttpError {
            status_code: 503,
            code: None,
            detail: Some("  ".to_string()),
        };
        assert_eq!(server.user_message(), "Request failed with status 503");
    }

    #[test]
    fn test_sanitize_redacts_nested_sensitive_fields() {
        let body = json!({
            "account_name": "Acme Travel",
            "accountNumber": "0123456789",
            "security": {"new_password": "hunter2", "two_factor": true},
            "cards": [{"card_number": "4111", "CVV": "123", "holder": "Ada"}],
            "pin": "0000",
            "pinned": true
        });

        let clean = sanitize(&body);
        assert_eq!(clean["account_name"], "Acme Travel");
        assert_eq!(clean["accountNumber"], REDACTED);
        assert_eq!(clean["security"]["new_password"], REDACTED);
        assert_eq!(clean["security"]["two_factor"], true);
        assert_eq!(clean["cards"][0]["card_number"], REDACTED);
        assert_eq!(clean["cards"][0]["CVV"], REDACTED);
        assert_eq!(clean["cards"][0]["holder"], "Ada");
        assert_eq!(clean["pin"], REDACTED);
        assert_eq!(clean["pinned"], true);
    }

    #[tokio::test]
    async fn test_http_transport_against_live_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/settings/general")
            .match_header("authorization", "Bearer live-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"site_name": "Portal"}"#)
            .expect(1)
            .create_async()
            .await;

        let config = ClientConfig {
            base_url: format!("{}/api", server.url()),
            ..Default::default()
        };
        let tokens = TokenStore::new(Arc::new(crate::storage::MemoryStore::new()));
        tokens.set_token("live-token").unwrap();
        let client = ApiClient::http(config, tokens).unwrap();

        let saved: Value = client
            .put("/settings/general", &json!({"site_name": "Portal"}))
            .await
            .unwrap();
        assert_eq!(saved["site_name"], "Portal");
        mock.assert_async().await;
    }
}
