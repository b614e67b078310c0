use serde::Serialize;

use mongodb::error::{Error as MongoError, ErrorKind};
use tracing::debug;

use super::kinds::{ConnectionError, StoreError, StoreErrorKind};

/// Structured error information extracted from MongoDB driver errors.
///
/// Serialized into debug logs so a failing store call can be correlated with
/// server-side diagnostics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl ErrorInfo {
    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// One-line human readable summary.
    pub fn summary(&self) -> String {
        let message = self.message.as_deref().unwrap_or("unknown error");
        match (self.code, self.name.as_deref()) {
            (Some(code), Some(name)) => format!("{message} ({name}, code {code})"),
            (Some(code), None) => format!("{message} (code {code})"),
            _ => message.to_string(),
        }
    }
}

/// Extract structured information from a MongoDB error using the driver API.
pub fn extract_error_info(error: &MongoError) -> ErrorInfo {
    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
            info.name = get_error_name(command_error.code);
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("mongo.authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("mongo.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::Io(io_error) => {
            info.error_type = Some("mongo.io_error".to_string());
            info.message = Some(io_error.to_string());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info
}

/// Map a driver error onto the store taxonomy the traversal understands.
pub fn classify(error: &MongoError) -> StoreErrorKind {
    match error.kind.as_ref() {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => StoreErrorKind::Unavailable,
        ErrorKind::Authentication { .. } => StoreErrorKind::PermissionDenied,
        ErrorKind::Command(command_error) if command_error.code == 13 => {
            StoreErrorKind::PermissionDenied
        }
        ErrorKind::BsonDeserialization(_) => StoreErrorKind::InvalidData,
        _ => StoreErrorKind::Other,
    }
}

/// Get a human-readable error name from a MongoDB error code.
fn get_error_name(code: i32) -> Option<String> {
    let name = match code {
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        50 => "MaxTimeMSExpired",
        89 => "NetworkTimeout",
        91 => "ShutdownInProgress",
        _ => return None,
    };

    Some(name.to_string())
}

impl From<MongoError> for StoreError {
    fn from(err: MongoError) -> Self {
        let info = extract_error_info(&err);
        if let Ok(json) = info.to_json_compact() {
            debug!(error = %json, "store driver error");
        }
        StoreError::new(classify(&err), info.summary()).with_source(err)
    }
}

impl From<MongoError> for ConnectionError {
    fn from(err: MongoError) -> Self {
        ConnectionError::ConnectionFailed(extract_error_info(&err).summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_error_names() {
        assert_eq!(get_error_name(13).as_deref(), Some("Unauthorized"));
        assert_eq!(get_error_name(26).as_deref(), Some("NamespaceNotFound"));
        assert_eq!(get_error_name(12345), None);
    }

    #[test]
    fn test_summary_formats() {
        let info = ErrorInfo {
            error_type: Some("mongo.command_error".to_string()),
            code: Some(13),
            name: Some("Unauthorized".to_string()),
            message: Some("not authorized on app".to_string()),
        };
        assert_eq!(info.summary(), "not authorized on app (Unauthorized, code 13)");

        let bare = ErrorInfo::default();
        assert_eq!(bare.summary(), "unknown error");
    }

    #[test]
    fn test_error_info_json_skips_empty_fields() {
        let info = ErrorInfo {
            message: Some("boom".to_string()),
            ..ErrorInfo::default()
        };
        assert_eq!(info.to_json_compact().unwrap(), r#"{"message":"boom"}"#);
    }
}
