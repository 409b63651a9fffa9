use thiserror::Error;

/// Errors surfaced by engine construction and tap acquisition.
///
/// Nothing on the running analysis or delivery path is fatal: malformed
/// frames are treated as empty and failing sinks are logged and skipped.
#[derive(Debug, Error)]
pub enum VizError {
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("audio tap already taken")]
    TapTaken,
}
