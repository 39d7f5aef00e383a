use thiserror::Error;

#[derive(Error, Debug)]
pub enum MinatoError {
    /// The inbound text is not an HL7 v2 message this gateway can read.
    #[error("malformed HL7 message: {0}")]
    MalformedMessage(String),

    /// A mapping or validation spec is broken. Raised at load time only;
    /// specs are reviewed configuration, not per-request input.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MinatoError>;
