use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing violation on a connection: short read, oversized frame, or a
    /// decoder emitting more frames than packets. Terminates that
    /// connection only.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Decoder failure: {0}")]
    Decoder(String),

    #[error("Sink failure: {0}")]
    Sink(String),
}
