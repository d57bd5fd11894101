pub type WavecastResult<T> = Result<T, WavecastError>;

#[derive(thiserror::Error, Debug)]
pub enum WavecastError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown effect type: {0}")]
    UnknownEffectType(String),

    #[error("encoder initialization failed: {0}")]
    InitFailed(String),

    #[error("encode failed: {0}")]
    EncodeFailed(String),

    #[error("finalize failed: {0}")]
    FinalizeFailed(String),

    #[error("export cancelled")]
    Cancelled,

    #[error("render error: {0}")]
    Render(String),

    #[error("analysis error: {0}")]
    Analysis(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WavecastError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unknown_effect_type(tag: impl Into<String>) -> Self {
        Self::UnknownEffectType(tag.into())
    }

    pub fn init_failed(msg: impl Into<String>) -> Self {
        Self::InitFailed(msg.into())
    }

    pub fn encode_failed(msg: impl Into<String>) -> Self {
        Self::EncodeFailed(msg.into())
    }

    pub fn finalize_failed(msg: impl Into<String>) -> Self {
        Self::FinalizeFailed(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// Cancellation is a clean early exit, not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
