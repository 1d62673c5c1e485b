// lib.rs - driver dashboard core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod event;
pub mod model;
pub mod offline_store;
pub mod remote;

use crux_kv::error::KeyValueError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use app::{App, DriverHeader, RideCard, ToastView, ViewModel};
pub use capabilities::{Capabilities, Effect};
pub use config::{BackfillMode, Config, ConfigError, DashboardSettings};
pub use event::Event;
pub use model::{BackfillReport, DataSource, Model, RideAction, RideId, RideRequest, RideStatus, UserId};

/// Fixed local cache key holding the serialized ride list.
pub const LOCAL_RIDES_KEY: &str = "rideRequests";
pub const RIDE_REQUESTS_TABLE: &str = "ride_requests";

pub const DEFAULT_STUDENT_NAME: &str = "Unknown";
pub const DEFAULT_STUDENT_EMAIL: &str = "unknown@email.com";
pub const DEFAULT_DISABILITY_TYPE: &str = "Not specified";
pub const PLACEHOLDER_EMAIL_DOMAIN: &str = "student.email";
pub const TOAST_DURATION_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Authentication,
    Authorization,
    Validation,
    NotFound,
    Conflict,
    RateLimited,
    Storage,
    Serialization,
    Deserialization,
    Configuration,
    Internal,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Authentication => "AUTH_ERROR",
            Self::Authorization => "FORBIDDEN",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::Deserialization => "DESERIALIZATION_ERROR",
            Self::Configuration => "CONFIG_ERROR",
            Self::Internal => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub fn from_http_status(status: u16, body: Option<&[u8]>) -> Self {
        let kind = match status {
            400 | 422 => ErrorKind::Validation,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Authorization,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimited,
            408 => ErrorKind::Timeout,
            500..=599 => ErrorKind::Internal,
            _ => ErrorKind::Unknown,
        };

        let message = body
            .and_then(|b| serde_json::from_slice::<ApiErrorResponse>(b).ok())
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP error: {status}"));

        Self::new(kind, message).with_context("http_status", status.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: String,
}

impl From<KeyValueError> for AppError {
    fn from(e: KeyValueError) -> Self {
        let kind = match &e {
            KeyValueError::Timeout => ErrorKind::Timeout,
            KeyValueError::Io { .. }
            | KeyValueError::CursorNotFound
            | KeyValueError::Other { .. } => ErrorKind::Storage,
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<capabilities::HttpError> for AppError {
    fn from(e: capabilities::HttpError) -> Self {
        use capabilities::HttpError;
        match &e {
            HttpError::Status { status, body, .. } => {
                AppError::from_http_status(*status, body.as_deref().map(str::as_bytes))
                    .with_internal(e.to_string())
            }
            HttpError::Timeout { .. } => AppError::new(ErrorKind::Timeout, e.to_string()),
            HttpError::Connection { .. } => AppError::new(ErrorKind::Network, e.to_string()),
            HttpError::InvalidUrl { .. } | HttpError::InvalidHeader { .. } => {
                AppError::new(ErrorKind::Configuration, e.to_string())
            }
            HttpError::Serialization { .. } => AppError::new(ErrorKind::Serialization, e.to_string()),
            HttpError::InvalidResponse { .. } => {
                AppError::new(ErrorKind::Deserialization, e.to_string())
            }
        }
    }
}

impl From<offline_store::StoreError> for AppError {
    fn from(e: offline_store::StoreError) -> Self {
        match e {
            offline_store::StoreError::Kv(kv) => kv.into(),
            offline_store::StoreError::Corrupted { .. } => {
                AppError::new(ErrorKind::Deserialization, e.to_string())
            }
            offline_store::StoreError::Serialization(_) => {
                AppError::new(ErrorKind::Serialization, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod app_error_tests {
        use super::*;

        #[test]
        fn test_from_http_status_reads_postgrest_message() {
            let body = br#"{"code":"23505","message":"duplicate key value","details":null}"#;
            let err = AppError::from_http_status(409, Some(body));
            assert_eq!(err.kind, ErrorKind::Conflict);
            assert_eq!(err.message, "duplicate key value");
            assert_eq!(err.context.get("http_status").map(String::as_str), Some("409"));
        }

        #[test]
        fn test_from_http_status_without_body() {
            let err = AppError::from_http_status(503, None);
            assert_eq!(err.kind, ErrorKind::Internal);
            assert_eq!(err.message, "HTTP error: 503");
        }

        #[test]
        fn test_display_includes_code_and_internal() {
            let err = AppError::new(ErrorKind::Storage, "disk full").with_internal("SQLITE_FULL");
            assert_eq!(err.to_string(), "[STORAGE_ERROR] disk full (internal: SQLITE_FULL)");
        }

        #[test]
        fn test_http_error_conversion() {
            let err: AppError = capabilities::HttpError::Status {
                status: 401,
                body: None,
                operation: "select_all".into(),
            }
            .into();
            assert_eq!(err.kind, ErrorKind::Authentication);

            let err: AppError = capabilities::HttpError::Connection {
                message: "refused".into(),
            }
            .into();
            assert_eq!(err.kind, ErrorKind::Network);
        }

        #[test]
        fn test_kv_error_conversion() {
            let err: AppError = KeyValueError::Timeout.into();
            assert_eq!(err.kind, ErrorKind::Timeout);

            let err: AppError = offline_store::StoreError::Kv(KeyValueError::Io {
                message: "disk I/O error".into(),
            })
            .into();
            assert_eq!(err.kind, ErrorKind::Storage);

            let err: AppError = offline_store::StoreError::Corrupted {
                reason: "expected a JSON array".into(),
            }
            .into();
            assert_eq!(err.code(), "DESERIALIZATION_ERROR");
        }
    }
}
