use thiserror::Error;

/// Camera-node failures. Everything except `BufferNotReady` and
/// `QueueFailed` is fatal at startup; those two surface on the trigger path
/// where the handler counts them and returns.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to start camera manager")]
    ManagerStart,

    #[error("No cameras available")]
    NoCameras,

    #[error("Failed to acquire camera")]
    AcquireFailed,

    #[error("Invalid camera configuration, unable to adjust")]
    ConfigurationRejected,

    #[error("Invalid camera configuration, adjusted")]
    ConfigurationAdjusted,

    #[error("Failed to allocate frame buffers")]
    AllocationFailed,

    #[error("Plane size does not match expected size")]
    PlaneLayout,

    #[error("Buffer is not ready for requeuing")]
    BufferNotReady,

    #[error("Failed to queue request")]
    QueueFailed,

    #[error("Handoff failure: {0}")]
    Handoff(#[from] handoff::HandoffError),
}

/// Stream-side failures. A lost packet is not fatal; the streamer reconnects
/// at the next packet boundary.
#[derive(Error, Debug)]
pub enum TransmitError {
    #[error("Connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("Write failed: {0}")]
    Write(#[source] std::io::Error),
}
