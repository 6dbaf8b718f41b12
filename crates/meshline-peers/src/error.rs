use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to serialize peer catalog: {0}")]
    SerializationFailed(String),
    #[error("failed to deserialize peer catalog: {0}")]
    DeserializationFailed(String),
}
