use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractPressError {
    /// Font bytes, form template bytes or another static asset could not be used.
    #[error("asset error: {0}")]
    Asset(String),
    /// Content template JSON is malformed or declares an unknown language.
    #[error("template error: {0}")]
    Template(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ContractPressError {
    fn from(value: serde_json::Error) -> Self {
        ContractPressError::Template(value.to_string())
    }
}
