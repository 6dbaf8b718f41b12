//! Wire-codec error.
//!
//! Per §7's propagation policy the decision surface (`find`, `ingest`,
//! `originate`) stays total and never returns this — `RouteNotFound`,
//! `MessageExpired`, `MaxHops`, and `DuplicateMessage` are instead observed
//! as distinct [`crate::Signal`] variants (or, for the silent duplicate
//! case, no signal at all). `CoreError` covers the one boundary in this
//! crate that genuinely is fallible: decoding a wire frame.
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("malformed wire frame")]
    DeserializationFailure,
}

impl From<serde_json::Error> for CoreError {
    fn from(_: serde_json::Error) -> Self {
        CoreError::DeserializationFailure
    }
}
