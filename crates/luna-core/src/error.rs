use thiserror::Error;

/// Top-level error type for the Luna system.
///
/// Each variant covers one subsystem concern. Subsystem crates define their
/// own error types and implement `From<LunaError>` (or the reverse) so that
/// the `?` operator works seamlessly across crate boundaries.
///
/// The caller-facing taxonomy the rest of the system relies on:
/// - `InvalidInput` means the input must change before a retry can succeed.
/// - `Upstream` means an external capability (model, TTS, STT) failed and a
///   retry by the outermost caller is safe; nothing in the core retries
///   automatically.
/// - `Persistence` means a snapshot read/write failed; in-memory state stays
///   authoritative.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LunaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Call error: {0}")]
    Call(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for LunaError {
    fn from(err: toml::de::Error) -> Self {
        LunaError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LunaError {
    fn from(err: toml::ser::Error) -> Self {
        LunaError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LunaError {
    fn from(err: serde_json::Error) -> Self {
        LunaError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Luna operations.
pub type Result<T> = std::result::Result<T, LunaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LunaError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = LunaError::InvalidInput("empty message".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty message");

        let err = LunaError::Upstream("model timed out".to_string());
        assert_eq!(err.to_string(), "Upstream error: model timed out");

        let err = LunaError::Persistence("rename failed".to_string());
        assert_eq!(err.to_string(), "Persistence error: rename failed");

        let err = LunaError::Call("segment overflow".to_string());
        assert_eq!(err.to_string(), "Call error: segment overflow");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let luna_err: LunaError = io_err.into();
        assert!(matches!(luna_err, LunaError::Io(_)));
        assert!(luna_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let bad_toml = "invalid = [[[";
        let err: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        assert!(err.is_err());
        let luna_err: LunaError = err.unwrap_err().into();
        assert!(matches!(luna_err, LunaError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad_json = "{ invalid json }";
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str(bad_json);
        assert!(err.is_err());
        let luna_err: LunaError = err.unwrap_err().into();
        assert!(matches!(luna_err, LunaError::Serialization(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(LunaError::Upstream("quota exceeded".to_string()))
        }

        assert_eq!(returns_ok().unwrap(), 42);
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let _value = io_result?;
            Ok("success".to_string())
        }

        assert_eq!(inner().unwrap(), "success");
    }

    #[test]
    fn test_error_debug_impl() {
        let err = LunaError::Upstream("test debug".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Upstream"));
        assert!(debug_str.contains("test debug"));
    }
}
