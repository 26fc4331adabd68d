//! Request DTOs for the server API

use serde::Deserialize;

/// Longest accepted cache key.
pub const MAX_KEY_LENGTH: usize = 256;

/// Request body for the SET operation (PUT /set)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: String,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_request_deserialize() {
        let json = r#"{"key": "test", "value": "hello"}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, "test");
        assert_eq!(req.value, "hello");
    }

    #[test]
    fn test_set_request_requires_value() {
        let json = r#"{"key": "test"}"#;
        assert!(serde_json::from_str::<SetRequest>(json).is_err());
    }

    #[test]
    fn test_validate_key_length() {
        let empty = SetRequest {
            key: String::new(),
            value: "v".to_string(),
        };
        let long = SetRequest {
            key: "k".repeat(MAX_KEY_LENGTH + 1),
            value: "v".to_string(),
        };
        let valid = SetRequest {
            key: "k".repeat(MAX_KEY_LENGTH),
            value: "v".to_string(),
        };

        assert!(empty.validate().is_some());
        assert!(long.validate().is_some());
        assert!(valid.validate().is_none());
    }
}
