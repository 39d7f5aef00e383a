use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("token endpoint error: {0}")]
    Token(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("FHIR store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
