//! Resource client error types.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Coarse error category used by the query and mutation runners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  /// Timeout or connection failure
  Network,
  /// Credential missing, expired or rejected (401)
  Auth,
  /// 4xx response, usually with field-level detail
  Validation,
  /// 5xx response or an unreadable body
  Server,
  /// 404 response
  NotFound,
}

/// Error returned by every resource call.
///
/// The error is `Clone` so a single failed request can be handed to every
/// caller that joined the same in-flight fetch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
  /// Request never produced a response.
  #[error("Network error: {0}")]
  Network(String),

  /// Authentication failed.
  #[error("Authentication failed: {0}")]
  Auth(String),

  /// Server rejected the request payload.
  #[error("Validation failed ({status}): {message}")]
  Validation {
    /// HTTP status code.
    status: u16,
    /// Summary message from the server.
    message: String,
    /// Per-field messages, keyed by field name.
    fields: BTreeMap<String, Vec<String>>,
  },

  /// Resource not found.
  #[error("Not found: {0}")]
  NotFound(String),

  /// Server failed to handle the request.
  #[error("Server error ({status}): {message}")]
  Server {
    /// HTTP status code.
    status: u16,
    /// Message from the server, if any.
    message: String,
  },

  /// Response body did not match the expected shape.
  #[error("Malformed response: {0}")]
  Decode(String),
}

impl ApiError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ApiError::Network(_) => ErrorKind::Network,
      ApiError::Auth(_) => ErrorKind::Auth,
      ApiError::Validation { .. } => ErrorKind::Validation,
      ApiError::NotFound(_) => ErrorKind::NotFound,
      ApiError::Server { .. } | ApiError::Decode(_) => ErrorKind::Server,
    }
  }

  /// Check if this is an authentication error.
  pub fn is_auth_error(&self) -> bool {
    self.kind() == ErrorKind::Auth
  }

  /// Check if this is a network (transport) error.
  pub fn is_network_error(&self) -> bool {
    self.kind() == ErrorKind::Network
  }

  /// Whether the query runner may retry the request.
  pub fn is_retryable(&self) -> bool {
    !self.is_auth_error()
  }

  /// Build an error from a non-success status and its (possibly empty) body.
  ///
  /// Bodies follow the backend's conventions: `{"detail": "..."}` for a
  /// single message, or `{"field": ["message", ...]}` for validation errors.
  pub fn from_status(status: u16, body: &str) -> Self {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail = parsed
      .as_ref()
      .and_then(|v| v.get("detail").or_else(|| v.get("message")))
      .and_then(Value::as_str)
      .map(String::from);
    let message = detail.clone().unwrap_or_else(|| format!("HTTP {}", status));

    match status {
      401 => ApiError::Auth(message),
      404 => ApiError::NotFound(message),
      400..=499 => {
        let fields = parsed.as_ref().map(field_errors).unwrap_or_default();
        let message = match (detail, fields.iter().next()) {
          (Some(detail), _) => detail,
          (None, Some((field, messages))) => format!("{}: {}", field, messages.join(" ")),
          (None, None) => message,
        };
        ApiError::Validation {
          status,
          message,
          fields,
        }
      }
      _ => ApiError::Server { status, message },
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      ApiError::Network("request timed out".to_string())
    } else if e.is_decode() {
      ApiError::Decode(e.to_string())
    } else if let Some(status) = e.status() {
      ApiError::from_status(status.as_u16(), "")
    } else {
      ApiError::Network(e.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self {
    ApiError::Decode(e.to_string())
  }
}

/// Collect `{"field": ["msg"]}` or `{"field": "msg"}` pairs from an error body.
fn field_errors(body: &Value) -> BTreeMap<String, Vec<String>> {
  let mut fields = BTreeMap::new();
  let Some(object) = body.as_object() else {
    return fields;
  };

  for (name, value) in object {
    if name == "detail" || name == "message" {
      continue;
    }
    let messages: Vec<String> = match value {
      Value::String(s) => vec![s.clone()],
      Value::Array(items) => items
        .iter()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect(),
      _ => continue,
    };
    if !messages.is_empty() {
      fields.insert(name.clone(), messages);
    }
  }
  fields
}

/// Result type for resource calls.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_401_is_auth() {
    let err = ApiError::from_status(401, r#"{"detail": "Token expired"}"#);
    assert_eq!(err, ApiError::Auth("Token expired".to_string()));
    assert!(!err.is_retryable());
  }

  #[test]
  fn test_404_is_not_found() {
    let err = ApiError::from_status(404, "");
    assert_eq!(err.kind(), ErrorKind::NotFound);
  }

  #[test]
  fn test_400_collects_field_errors() {
    let err = ApiError::from_status(400, r#"{"title": ["This field is required."]}"#);
    match err {
      ApiError::Validation {
        status,
        message,
        fields,
      } => {
        assert_eq!(status, 400);
        assert_eq!(message, "title: This field is required.");
        assert_eq!(fields["title"], vec!["This field is required."]);
      }
      other => panic!("expected validation error, got {:?}", other),
    }
  }

  #[test]
  fn test_403_is_validation_class() {
    let err = ApiError::from_status(403, r#"{"detail": "Not allowed"}"#);
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.to_string(), "Validation failed (403): Not allowed");
  }

  #[test]
  fn test_5xx_is_server() {
    let err = ApiError::from_status(502, "<html>bad gateway</html>");
    assert_eq!(
      err,
      ApiError::Server {
        status: 502,
        message: "HTTP 502".to_string()
      }
    );
    assert!(err.is_retryable());
  }
}
