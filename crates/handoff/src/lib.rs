pub mod errors;
pub mod semaphore;
pub mod spsc;

pub use errors::HandoffError;
pub use semaphore::{NamedSemaphore, Semaphore};
pub use spsc::SpscRing;
