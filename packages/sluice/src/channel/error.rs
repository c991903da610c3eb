// channel and select error types.

use thiserror::Error;


// ==== base error types ====


/// Error for trying to put into a channel that is draining or closed
///
/// Also the rejection delivered to a blocked put when the channel is force-closed out from under
/// it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("attempt to put into a closed channel")]
pub struct ClosedError;

/// Error produced by an expired [`TimeoutChan`](crate::TimeoutChan), or by a
/// [`DelayChan`](crate::DelayChan) or [`FutureChan`](crate::FutureChan) firing with an error
/// outcome
///
/// Observing an expired timeout does not consume anything: every subsequent take of the same
/// timeout yields an equal `TimeoutError`.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("{message}")]
pub struct TimeoutError {
    message: String,
}

impl TimeoutError {
    /// Construct with an explicit message.
    pub fn new(message: impl Into<String>) -> Self {
        TimeoutError { message: message.into() }
    }

    /// Construct the message an expired timeout of the given duration reports.
    pub(crate) fn expired(after: std::time::Duration) -> Self {
        TimeoutError { message: format!("timeout of {} ms exceeded", after.as_millis()) }
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error for feeding an operation handle to a select after it has already been used
///
/// This indicates a caller bug, not a runtime condition, so it surfaces immediately from the
/// select rather than through the asynchronous failure path. The double-use cases (one handle in
/// two selects, or awaited and then selected) are mostly unrepresentable in this API because
/// handles move into the select; what remains detectable is a handle that was polled or resolved
/// directly before being handed over.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("operation handle was already polled or resolved outside of this select")]
pub struct MisuseError;

/// Error for attempting a non-blocking operation that could not complete immediately
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("operation would block")]
pub struct WouldBlockError;


// ==== compound error types ====


macro_rules! compound_from {
    ($compound:ident <$p:ident> {$(
        $variant:ident($inner:ty),
    )*})=>{$(
        impl<$p> From<$inner> for $compound<$p> {
            fn from(inner: $inner) -> Self {
                Self::$variant(inner)
            }
        }
    )*};
    ($compound:ident {$(
        $variant:ident($inner:ty),
    )*})=>{$(
        impl From<$inner> for $compound {
            fn from(inner: $inner) -> Self {
                Self::$variant(inner)
            }
        }
    )*};
}

/// Error for trying to put into a channel without blocking
///
/// Both variants hand the undelivered value back to the caller, since a failed `try_put` has no
/// side effects.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TryPutError<T> {
    /// The channel is draining or closed
    Closed(T),
    /// No waiting consumer exists and the buffer is full
    WouldBlock(T),
}

impl<T> TryPutError<T> {
    /// Recover the value that could not be put.
    pub fn into_value(self) -> T {
        match self {
            TryPutError::Closed(value) => value,
            TryPutError::WouldBlock(value) => value,
        }
    }

    /// Whether the cause was the channel being draining or closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, TryPutError::Closed(_))
    }
}

/// Error for trying to take from a channel without blocking
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TryTakeError {
    /// No value is currently takeable
    WouldBlock(WouldBlockError),
    /// A deadline-style source fired as an error
    Timeout(TimeoutError),
}

compound_from!(TryTakeError {
    WouldBlock(WouldBlockError),
    Timeout(TimeoutError),
});

/// Error resolving a select
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SelectError {
    /// The first failing arm was a timeout or an errored one-shot firing
    Timeout(TimeoutError),
    /// An operation handle was fed to the select after being used elsewhere
    Misuse(MisuseError),
}

compound_from!(SelectError {
    Timeout(TimeoutError),
    Misuse(MisuseError),
});

/// Error for probing a select synchronously
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TrySelectError {
    /// No arm was ready, but at least one is still open
    WouldBlock(WouldBlockError),
    /// The first failing arm was a timeout or an errored one-shot firing
    Timeout(TimeoutError),
    /// An operation handle was fed to the select after being used elsewhere
    Misuse(MisuseError),
}

compound_from!(TrySelectError {
    WouldBlock(WouldBlockError),
    Timeout(TimeoutError),
    Misuse(MisuseError),
});

impl From<SelectError> for TrySelectError {
    fn from(e: SelectError) -> Self {
        match e {
            SelectError::Timeout(inner) => TrySelectError::Timeout(inner),
            SelectError::Misuse(inner) => TrySelectError::Misuse(inner),
        }
    }
}

impl std::fmt::Display for TryTakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TryTakeError::WouldBlock(e) => e.fmt(f),
            TryTakeError::Timeout(e) => e.fmt(f),
        }
    }
}

impl std::fmt::Display for SelectError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SelectError::Timeout(e) => e.fmt(f),
            SelectError::Misuse(e) => e.fmt(f),
        }
    }
}

impl std::fmt::Display for TrySelectError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TrySelectError::WouldBlock(e) => e.fmt(f),
            TrySelectError::Timeout(e) => e.fmt(f),
            TrySelectError::Misuse(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for TryTakeError {}
impl std::error::Error for SelectError {}
impl std::error::Error for TrySelectError {}
