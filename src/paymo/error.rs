//! Errors returned by Paymo API clients.

use std::error::Error as StdError;
use std::fmt;

use crate::cache::TransportFailure;

/// Category of a server-reported failure. Each maps to a distinct exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
  UsageError,
  AuthFailed,
  NotFound,
  RateLimited,
  ApiError,
}

impl ErrorCode {
  pub fn from_status(status: u16) -> Self {
    match status {
      400 => Self::UsageError,
      401 | 403 => Self::AuthFailed,
      404 => Self::NotFound,
      429 => Self::RateLimited,
      _ => Self::ApiError,
    }
  }

  pub fn exit_code(self) -> i32 {
    match self {
      Self::UsageError => 2,
      Self::AuthFailed => 3,
      Self::NotFound => 4,
      Self::RateLimited => 5,
      Self::ApiError => 6,
    }
  }
}

impl fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::UsageError => "USAGE_ERROR",
      Self::AuthFailed => "AUTH_FAILED",
      Self::NotFound => "NOT_FOUND",
      Self::RateLimited => "RATE_LIMITED",
      Self::ApiError => "API_ERROR",
    })
  }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  /// The server answered with an error status.
  #[error("{}", server_message(.status, .message))]
  Server {
    status: u16,
    code: ErrorCode,
    message: String,
  },

  /// The server answered but the expected entity was absent.
  #[error("{0} not found")]
  NotFound(String),

  /// The server answered 2xx with a body we could not decode.
  #[error("Failed to parse Paymo response: {0}")]
  Decode(String),

  /// The request never produced a response.
  #[error("Failed to reach Paymo: {0}")]
  Transport(#[source] Box<dyn StdError + Send + Sync>),
}

fn server_message(status: &u16, message: &str) -> String {
  if message.is_empty() {
    format!("Paymo API error: HTTP {}", status)
  } else {
    format!("Paymo API error ({}): {}", status, message)
  }
}

impl ApiError {
  pub fn server(status: u16, message: impl Into<String>) -> Self {
    Self::Server {
      status,
      code: ErrorCode::from_status(status),
      message: message.into(),
    }
  }

  pub fn transport(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
    Self::Transport(source.into())
  }

  pub fn code(&self) -> ErrorCode {
    match self {
      Self::Server { code, .. } => *code,
      Self::NotFound(_) => ErrorCode::NotFound,
      Self::Decode(_) | Self::Transport(_) => ErrorCode::ApiError,
    }
  }

  pub fn exit_code(&self) -> i32 {
    self.code().exit_code()
  }
}

impl TransportFailure for ApiError {
  fn is_transport_failure(&self) -> bool {
    matches!(self, Self::Transport(_))
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if let Some(status) = err.status() {
      return Self::server(status.as_u16(), String::new());
    }
    if err.is_decode() || err.is_body() {
      return Self::Decode(err.to_string());
    }
    // Connect, timeout, DNS and other send failures: no response was received
    Self::transport(err)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_classification() {
    assert_eq!(ErrorCode::from_status(400), ErrorCode::UsageError);
    assert_eq!(ErrorCode::from_status(401), ErrorCode::AuthFailed);
    assert_eq!(ErrorCode::from_status(403), ErrorCode::AuthFailed);
    assert_eq!(ErrorCode::from_status(404), ErrorCode::NotFound);
    assert_eq!(ErrorCode::from_status(429), ErrorCode::RateLimited);
    assert_eq!(ErrorCode::from_status(500), ErrorCode::ApiError);
  }

  #[test]
  fn test_only_transport_is_fallback_eligible() {
    assert!(ApiError::transport("connection refused").is_transport_failure());
    assert!(!ApiError::server(503, "maintenance").is_transport_failure());
    assert!(!ApiError::NotFound("project".into()).is_transport_failure());
    assert!(!ApiError::Decode("eof".into()).is_transport_failure());
  }

  #[test]
  fn test_messages() {
    assert_eq!(
      ApiError::server(401, "Invalid API key").to_string(),
      "Paymo API error (401): Invalid API key"
    );
    assert_eq!(ApiError::server(502, "").to_string(), "Paymo API error: HTTP 502");
    assert_eq!(ApiError::server(429, "").exit_code(), 5);
  }
}
