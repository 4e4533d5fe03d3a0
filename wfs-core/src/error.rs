//! Error taxonomy shared by the formatter and the server.
//!
//! Every variant here maps to exactly one POSIX errno at the `fuser`
//! callback boundary (see [`Error::to_errno`]); nothing upstream of that
//! boundary should match on raw integers.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such entry")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("directory busy")]
    Busy,
    #[error("no space left on device")]
    NoSpace,
    #[error("name too long")]
    NameTooLong,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Maps this error onto the `libc` errno the bridge should report.
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::NotFound => libc::ENOENT,
            Error::NotADirectory => libc::ENOTDIR,
            Error::IsADirectory => libc::EISDIR,
            Error::NotEmpty => libc::ENOTEMPTY,
            Error::Busy => libc::EBUSY,
            Error::NoSpace => libc::ENOSPC,
            Error::NameTooLong => libc::ENAMETOOLONG,
            Error::Io(_) => libc::EIO,
        }
    }

    /// True for errors fatal to the mount/format process itself.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
