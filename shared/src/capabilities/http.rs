use crux_http::protocol::{HttpHeader, HttpRequest, HttpResponse, HttpResult};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::RemoteConfig;

pub const MAX_URL_LENGTH: usize = 2048;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("{operation} failed with HTTP {status}")]
    Status {
        status: u16,
        body: Option<String>,
        operation: String,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },
}

impl HttpError {
    /// Classifies the outcome of an `Http` effect for the named operation.
    #[must_use]
    pub fn from_crux(operation: &str, e: crux_http::Error) -> Self {
        match e {
            crux_http::Error::Http(http) => HttpError::Status {
                status: http.code.into(),
                body: http
                    .body
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .filter(|b| !b.is_empty()),
                operation: operation.to_string(),
            },
            crux_http::Error::Json(message) => HttpError::InvalidResponse {
                reason: format!("{operation}: {message}"),
            },
            crux_http::Error::Url(reason) => HttpError::InvalidUrl {
                url: operation.to_string(),
                reason,
            },
            crux_http::Error::Io(message) => HttpError::Connection { message },
            crux_http::Error::Timeout => HttpError::Timeout {
                operation: operation.to_string(),
            },
        }
    }

    fn from_reqwest(operation: &str, e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            HttpError::Timeout {
                operation: operation.to_string(),
            }
        } else if e.is_builder() {
            HttpError::Serialization {
                message: e.to_string(),
            }
        } else {
            HttpError::Connection {
                message: e.to_string(),
            }
        }
    }
}

/// What the shell hands back to the `Http` capability when it could not get
/// a response at all. Non-2xx responses are not errors at this level.
impl From<HttpError> for crux_http::Error {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Timeout { .. } => crux_http::Error::Timeout,
            HttpError::InvalidUrl { .. } => crux_http::Error::Url(e.to_string()),
            other => crux_http::Error::Io(other.to_string()),
        }
    }
}

/// Checks the project URL and normalises it to end with a slash so relative
/// joins append instead of replacing the last segment.
pub fn validate_base_url(raw: &str) -> Result<Url, HttpError> {
    let invalid = |reason: &str| HttpError::InvalidUrl {
        url: raw.chars().take(100).collect(),
        reason: reason.to_string(),
    };

    if raw.trim().is_empty() {
        return Err(invalid("URL cannot be empty"));
    }
    if raw.len() > MAX_URL_LENGTH {
        return Err(invalid("URL is too long"));
    }

    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid("only 'http' and 'https' are allowed"));
    }
    if url.host_str().is_none() {
        return Err(invalid("URL must have a host"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(invalid("credentials in URL are not allowed"));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn sensitive_header(name: &str, value: &str) -> Result<HeaderValue, HttpError> {
    let mut header = HeaderValue::from_str(value).map_err(|e| HttpError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    header.set_sensitive(true);
    Ok(header)
}

/// Shell-side executor for `Http` effects aimed at the hosted project.
///
/// The core never sees the API key or the access token. They are attached
/// here, and only to requests under the configured project URL.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: HeaderValue,
    authorization: HeaderValue,
}

impl PostgrestClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, HttpError> {
        let base_url = validate_base_url(&config.url)?;

        let anon_key = config.anon_key.expose_secret();
        let bearer = match &config.access_token {
            Some(token) => token.expose_secret(),
            None => anon_key,
        };

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| HttpError::Connection {
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            api_key: sensitive_header("apikey", anon_key)?,
            authorization: sensitive_header("Authorization", &format!("Bearer {bearer}"))?,
        })
    }

    fn is_project_url(&self, url: &Url) -> bool {
        url.origin() == self.base_url.origin() && url.path().starts_with(self.base_url.path())
    }

    /// Turns an effect request into a ready-to-send reqwest request.
    pub fn prepare(&self, request: &HttpRequest) -> Result<reqwest::Request, HttpError> {
        let method =
            Method::from_bytes(request.method.as_bytes()).map_err(|e| HttpError::InvalidHeader {
                name: "method".to_string(),
                reason: e.to_string(),
            })?;
        let url = Url::parse(&request.url).map_err(|e| HttpError::InvalidUrl {
            url: request.url.chars().take(100).collect(),
            reason: e.to_string(),
        })?;

        let credentials = self.is_project_url(&url);
        let mut builder = self.client.request(method, url);
        for HttpHeader { name, value } in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if credentials {
            builder = builder
                .header(HeaderName::from_static("apikey"), self.api_key.clone())
                .header(AUTHORIZATION, self.authorization.clone());
        } else {
            warn!(url = %request.url, "request_outside_project_sent_without_credentials");
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        builder
            .build()
            .map_err(|e| HttpError::from_reqwest("prepare", &e))
    }

    /// Performs one `Http` effect. Every status code comes back as a
    /// response; only transport failures are errors.
    pub async fn execute(&self, request: &HttpRequest) -> HttpResult {
        let prepared = match self.prepare(request) {
            Ok(prepared) => prepared,
            Err(e) => return HttpResult::Err(e.into()),
        };

        let response = match self.client.execute(prepared).await {
            Ok(response) => response,
            Err(e) => return HttpResult::Err(HttpError::from_reqwest(&request.method, &e).into()),
        };

        let status = response.status().as_u16();
        debug!(method = %request.method, status, "remote_request_completed");

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| HttpHeader {
                name: name.to_string(),
                value: value.to_str().unwrap_or_default().to_string(),
            })
            .collect();

        match response.bytes().await {
            Ok(body) => HttpResult::Ok(HttpResponse {
                status,
                headers,
                body: body.to_vec(),
            }),
            Err(e) => HttpResult::Err(HttpError::from_reqwest(&request.method, &e).into()),
        }
    }
}
