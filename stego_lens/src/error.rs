// THEORY:
// Errors are split by who is at fault, because each kind travels differently.
//
// - `LoadError` is the outside world failing us (bad path, undecodable bytes,
//   oversized image). It is fatal to a session and is reported exactly once.
// - `PreconditionViolation` is the caller asking for something the engine does
//   not do (bit 8, a 2-byte pixel, a 16-bit output raster). It is rejected before
//   any pixel work starts and is never coerced to a nearby valid value.
// - `TaskFailure` is one transform blowing up. It is isolated to that task and only
//   ever travels through the result stream.
// - `SessionError` is what the session facade returns to its caller.
//
// Payloads are owned strings so every error is `Clone`; the session keeps the
// error that failed it inside its `Stage` and hands out copies on request.

use crate::core_modules::channel::Channel;

/// Failure to turn an external source into a `PixelSource`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("file error: {0}")]
    FileSystem(String),

    #[error("unrecognised image format: {0}")]
    InvalidFormat(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("resource limit: {0}")]
    ResourceLimit(String),

    /// The background loading task died before it produced an image.
    #[error("loader task failed: {0}")]
    Worker(String),
}

/// A request the engine refuses on principle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionViolation {
    #[error("channel index {0} is outside 0..=3")]
    ChannelIndexOutOfRange(usize),

    #[error("bit index {0} is outside 0..=7")]
    BitIndexOutOfRange(u8),

    #[error("bit pair {0} is outside 0..=3")]
    PairIndexOutOfRange(u8),

    #[error("{0} bytes per pixel is not an interleaved layout (expected 3 or 4)")]
    BytesPerPixel(u8),

    #[error("buffer holds {actual} elements, expected {expected}")]
    BufferLength { expected: usize, actual: usize },

    #[error("channel order has no slot for {0}")]
    MissingColorSlot(Channel),

    #[error("source declares an alpha channel but its channel order has no alpha slot")]
    MissingAlphaSlot,

    #[error("channel {0} appears more than once in the channel order")]
    DuplicateChannel(Channel),

    #[error("unsupported output encoding: {0}")]
    UnsupportedOutput(String),

    #[error("worker count must be at least 1")]
    WorkerCount,
}

/// One transform task that panicked or whose worker died.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transform '{label}' failed: {message}")]
pub struct TaskFailure {
    pub label: String,
    pub message: String,
}

/// Error surface of `AnalysisSession`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Precondition(#[from] PreconditionViolation),

    #[error("cannot {operation} while the session is {stage}")]
    InvalidStage {
        operation: &'static str,
        stage: &'static str,
    },
}
