pub type EffectResult<T> = Result<T, EffectError>;

#[derive(thiserror::Error, Debug)]
pub enum EffectError {
    /// The surface handle cannot yield a usable backing store. Construction-time, fatal.
    #[error("invalid surface: {0}")]
    InvalidSurface(String),

    /// Caller misuse of a component API. Always synchronous.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Use after `destroy()`.
    #[error("instance destroyed")]
    InstanceDestroyed,

    /// The frame scheduler (and its fallback) failed to arm the next frame.
    #[error("scheduling error: {0}")]
    Scheduling(String),

    /// An internal rendering step failed and was replaced by a safe default artifact.
    #[error("render degraded: {0}")]
    RenderDegraded(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EffectError {
    pub fn invalid_surface(msg: impl Into<String>) -> Self {
        Self::InvalidSurface(msg.into())
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn invalid_dimensions(msg: impl Into<String>) -> Self {
        Self::InvalidDimensions(msg.into())
    }

    pub fn scheduling(msg: impl Into<String>) -> Self {
        Self::Scheduling(msg.into())
    }

    pub fn degraded(msg: impl Into<String>) -> Self {
        Self::RenderDegraded(msg.into())
    }
}
