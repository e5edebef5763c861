use crate::models::PipelineStep;
use thiserror::Error;

pub const OUTLINE_FAILED_MESSAGE: &str =
    "Ocorreu um erro ao comunicar com a IA. Verifique sua chave API ou tente novamente.";
pub const OUTLINE_CREDENTIAL_MESSAGE: &str =
    "É necessário selecionar uma chave API para gerar o sumário.";
pub const CREDENTIAL_REQUIRED_MESSAGE: &str =
    "É necessário selecionar uma chave API para gerar imagens de alta qualidade.";

/// Failures at the generation provider boundary.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("outline has no chapters")]
    EmptyOutline,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("outline generation failed: {0}")]
    StructuralFailure(#[source] ProviderError),
    #[error("provider credential unavailable")]
    CredentialUnavailable { message: &'static str },
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("action requires step {expected}, session is at {actual}")]
    InvalidTransition {
        expected: PipelineStep,
        actual: PipelineStep,
    },
    #[error("another generation call is in flight")]
    Busy,
    #[error("the project is not ready for export")]
    NotReady,
    #[error("the project was restarted")]
    Discarded,
}

impl PipelineError {
    /// Text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::StructuralFailure(_) => OUTLINE_FAILED_MESSAGE.to_string(),
            PipelineError::CredentialUnavailable { message } => message.to_string(),
            other => other.to_string(),
        }
    }
}
