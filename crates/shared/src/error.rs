use serde::{Deserialize, Serialize};

/// Error body returned by the backend for non-2xx responses.
///
/// `detail` is usually a string but validation failures carry a list of
/// objects, so it is kept as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub detail: serde_json::Value,
}

impl ApiError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: serde_json::Value::String(detail.into()),
        }
    }

    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Best-effort human readable message for an error response body.
pub fn describe_error_body(raw: &str) -> String {
    match serde_json::from_str::<ApiError>(raw) {
        Ok(body) => body.message(),
        Err(_) if raw.trim().is_empty() => "empty response body".to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_string_detail() {
        assert_eq!(
            describe_error_body(r#"{"detail":"raw.jpg not found"}"#),
            "raw.jpg not found"
        );
    }

    #[test]
    fn describes_structured_detail_as_json() {
        let message = describe_error_body(r#"{"detail":[{"loc":["body"],"msg":"field required"}]}"#);
        assert!(message.contains("field required"), "{message}");
    }

    #[test]
    fn falls_back_to_raw_text() {
        assert_eq!(describe_error_body("Internal Server Error\n"), "Internal Server Error");
        assert_eq!(describe_error_body("  "), "empty response body");
    }
}
