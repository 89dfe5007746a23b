use thiserror::Error;

/// Fatal errors: the deployment cannot satisfy the tuner's assumptions.
///
/// Everything recoverable is handled inside the capture engine and never
/// reaches this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("inexact sample rate {requested} Hz (hardware offers {actual} Hz)")]
    InexactRate { requested: u32, actual: u32 },

    #[error("ring buffer: {0}")]
    RingBuffer(#[from] RingBufferError),

    #[error("mapped area is not contiguous: {0}")]
    NonContiguousLayout(String),
}

/// Errors from the double-mapped ring buffer setup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("requested capacity is zero")]
    ZeroCapacity,

    #[error("granularity {unit} is not a multiple of the {page}-byte host page")]
    BadGranularity { unit: usize, page: usize },

    #[error("{op} failed: errno {errno}")]
    Os { op: &'static str, errno: i32 },

    #[error("mirror placed at {actual:#x}, expected {expected:#x}")]
    Misplaced { expected: usize, actual: usize },
}

/// Error codes reported by a capture device operation.
///
/// These are recoverable; the capture engine decides what to do with them.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    #[error("overrun")]
    Overrun,

    #[error("stream suspended")]
    Suspended,

    #[error("try again")]
    TryAgain,

    #[error("device lost")]
    Disconnected,

    #[error("mapped area layout unsupported")]
    Layout,

    #[error("{op} failed: errno {errno}")]
    Io { op: &'static str, errno: i32 },
}
