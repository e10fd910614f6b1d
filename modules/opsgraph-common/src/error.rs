use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpsGraphError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown {vocabulary} '{value}'")]
    UnknownKind {
        vocabulary: &'static str,
        value: String,
    },
}
