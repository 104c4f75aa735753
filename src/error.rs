//! Centralized error type for the memory engine.
//!
//! DESIGN DECISION: one `thiserror`-derived enum at the crate root, the same
//! shape the teacher crate uses for its own `Error`/`Result<T>` pair, extended
//! with the kinds spec'd out for this engine (NotFound, AlreadyExists, ...).
//! Library code never panics; every fallible path returns `Result<T>`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Referenced entity/component/scratch/snapshot/scope does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// State transition inadmissible because the target already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Scratch entry has already been promoted to a component scope.
    #[error("already promoted: {0}")]
    AlreadyPromoted(String),

    /// Caller omitted a required argument or passed an unrecognized value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// File read/write failure or a malformed on-disk document.
    #[error("backing store error: {0}")]
    BackingStoreError(String),

    /// Version-control commit failed. Logged and swallowed by the post-write
    /// hook bus; surfaced here only to callers that invoke git2 directly.
    #[error("version control error: {0}")]
    VersionControlError(String),

    /// Neither the sampling nor the direct language-model path produced a
    /// response.
    #[error("language model unavailable: {0}")]
    LanguageModelUnavailable(String),

    /// The language model replied, but not in the schema the caller required.
    #[error("language model produced malformed output: {0}")]
    LanguageModelMalformed(String),

    /// The write validator returned a non-passing verdict. Advisory by
    /// default — callers decide whether this aborts the write.
    #[error("validation risk: {0}")]
    ValidationRisk(String),

    /// An external CLI call (search backend, helper binary) failed or timed
    /// out.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The system clock produced a timestamp earlier than one already used
    /// to mint an ID in this process.
    #[error("invalid time: {0}")]
    InvalidTime(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::BackingStoreError(format!("json: {err}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::BackingStoreError(format!("io: {err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::BackingStoreError(format!("toml decode: {err}"))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::BackingStoreError(format!("toml encode: {err}"))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::BackingStoreError(format!("yaml: {err}"))
    }
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Error::VersionControlError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::LanguageModelUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_readable() {
        let err = Error::NotFound("entities/claude".to_string());
        assert_eq!(err.to_string(), "not found: entities/claude");
    }

    #[test]
    fn json_errors_convert() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::BackingStoreError(_)));
    }
}
