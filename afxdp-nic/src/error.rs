use std::collections::TryReserveError;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced through the hardware-ops contract.
///
/// Transport failures (socket options, mmap, BPF syscalls) pass through as
/// `Os`; everything else maps to the fixed taxonomy the generic caller
/// understands.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("unknown instance or owner")]
    NotFound,

    #[error("virtual interface is already bound")]
    Busy,

    #[error("out of memory")]
    OutOfMemory,

    #[error("owner id exceeds handle capacity")]
    NoSpace,

    #[error("not supported by the AF_XDP backend")]
    Unsupported,

    #[error(transparent)]
    Os(#[from] io::Error),
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

impl Error {
    /// Last OS error, as reported by the most recent failing syscall.
    pub(crate) fn last_os() -> Self {
        Error::Os(io::Error::last_os_error())
    }
}
