use crate::credentials::ApiCredentials;
use crate::error::ApiError;
use lazy_static::lazy_static;
use log::{debug, warn};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::thread::sleep;
use std::time::Duration;
use std_semaphore::Semaphore;

/// The maximum number of simultaneous HTTP requests allowed.
///
/// Shared by every transport of the process, so several hubs pointed at the
/// same backend still respect one limit.
const SIMULTANEOUS_REQUESTS_LIMIT: isize = 20;

/// Number of attempts for a request that fails with a transient status.
pub const SYNC_ATTEMPT: u32 = 3;

const RETRY_DELAY_MS: u64 = 500;

lazy_static! {
    static ref SEMAPHORE: Semaphore = Semaphore::new(SIMULTANEOUS_REQUESTS_LIMIT);
}

static SHARED_CLIENT: Lazy<Client> = Lazy::new(Client::new);

/// HTTP method of a request, carrying the JSON body where one is sent.
#[derive(Clone, Debug, PartialEq)]
pub enum HttpMethod {
    Get,
    Post(serde_json::Value),
    Patch(serde_json::Value),
}

impl HttpMethod {
    pub fn name(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post(_) => "POST",
            HttpMethod::Patch(_) => "PATCH",
        }
    }

    /// Only reads are retried; a mutation is sent exactly once.
    fn is_idempotent(&self) -> bool {
        matches!(self, HttpMethod::Get)
    }
}

/// A request relative to the API base URL.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        ApiRequest {
            method: HttpMethod::Get,
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        ApiRequest {
            method: HttpMethod::Post(body),
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        ApiRequest {
            method: HttpMethod::Patch(body),
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        match &self.method {
            HttpMethod::Get => None,
            HttpMethod::Post(body) | HttpMethod::Patch(body) => Some(body),
        }
    }
}

/// Raw answer of the backend: status code and body text.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turns non-success answers into the matching `ApiError`.
    pub fn error_for_status(self) -> Result<ApiResponse, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.body))
        }
    }

    /// Decodes the body, accepting both bare payloads and `{"data": ...}` envelopes.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let value: serde_json::Value = serde_json::from_str(&self.body)?;
        decode_payload(value)
    }
}

// The envelope is tried first so payload types with only optional fields
// do not swallow `{"data": ...}` bodies.
#[derive(Deserialize)]
#[serde(untagged)]
enum Payload<T> {
    Wrapped { data: T },
    Bare(T),
}

pub(crate) fn decode_payload<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ApiError> {
    match serde_json::from_value::<Payload<T>>(value) {
        Ok(Payload::Wrapped { data: payload }) | Ok(Payload::Bare(payload)) => Ok(payload),
        Err(e) => Err(ApiError::Decode(e.to_string())),
    }
}

/// Percent-encodes one path segment.
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Sends requests to the backend.
///
/// `HttpTransport` is the real implementation; tests swap in a scripted one.
pub trait Transport: Send + Sync {
    /// Sends one request. Non-success statuses are returned as `Ok` responses;
    /// only transport failures become errors.
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// `reqwest` based transport with bearer authentication.
pub struct HttpTransport {
    credentials: ApiCredentials,
    client: Client,
}

impl HttpTransport {
    pub fn new(credentials: ApiCredentials) -> Self {
        HttpTransport {
            credentials,
            client: SHARED_CLIENT.clone(),
        }
    }

    pub fn with_client(credentials: ApiCredentials, client: Client) -> Self {
        HttpTransport {
            credentials,
            client,
        }
    }

    pub fn credentials(&self) -> &ApiCredentials {
        &self.credentials
    }

    fn send_single_attempt(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.credentials.endpoint(&request.path);
        let builder = match &request.method {
            HttpMethod::Get => self.client.get(&url).query(&request.params),
            HttpMethod::Post(body) => self.client.post(&url).query(&request.params).json(body),
            HttpMethod::Patch(body) => self.client.patch(&url).query(&request.params).json(body),
        };

        let _permit = SEMAPHORE.access();
        let response = builder.bearer_auth(&self.credentials.token).send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(ApiResponse { status, body })
    }
}

fn is_transient(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        send_with_retry(request, Duration::from_millis(RETRY_DELAY_MS), || {
            self.send_single_attempt(request)
        })
    }
}

/// Runs `attempt` until it yields a final answer.
///
/// GET requests are tried up to `SYNC_ATTEMPT` times while the answer is a
/// transient status (429, 502, 503, 504) or a network error, waiting
/// `retry_delay` times the attempt number in between. Every other method is
/// sent exactly once.
///
/// Returns the last answer, so a transient status that outlives the retries
/// reaches the caller unchanged.
pub(crate) fn send_with_retry<F>(
    request: &ApiRequest,
    retry_delay: Duration,
    mut attempt_fn: F,
) -> Result<ApiResponse, ApiError>
where
    F: FnMut() -> Result<ApiResponse, ApiError>,
{
    let attempts = if request.method.is_idempotent() {
        SYNC_ATTEMPT
    } else {
        1
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        debug!(
            "{} {} (attempt {}/{})",
            request.method.name(),
            request.path,
            attempt,
            attempts
        );
        match attempt_fn() {
            Ok(response) if is_transient(response.status) && attempt < attempts => {
                warn!(
                    "{} {} answered {}, retrying",
                    request.method.name(),
                    request.path,
                    response.status
                );
            }
            Err(ApiError::Network(msg)) if attempt < attempts => {
                warn!("{} {} failed: {}, retrying", request.method.name(), request.path, msg);
            }
            other => return other,
        }
        sleep(retry_delay * attempt);
    }
}
