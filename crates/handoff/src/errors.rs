use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("Semaphore operation failed: {0}")]
    Semaphore(#[from] Errno),

    #[error("Invalid semaphore name")]
    InvalidName,

    #[error("Queue is full")]
    QueueFull,
}
