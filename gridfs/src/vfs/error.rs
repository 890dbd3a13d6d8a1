use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no such entry: {0}")]
    NotFound(String),
    #[error("entry already exists: {0}")]
    AlreadyExists(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("invalid entry name: {0:?}")]
    InvalidName(String),
    #[error("file too large: {0}")]
    FileTooLarge(String),
    #[error("inconsistent record at {key}: {reason}")]
    InvalidState { key: String, reason: String },
    #[error("backing store error: {0}")]
    Store(#[from] StoreError),
}

impl FsError {
    /// POSIX error code reported to the kernel.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::NotEmpty(_) => libc::ENOTEMPTY,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::InvalidName(_) => libc::EINVAL,
            FsError::FileTooLarge(_) => libc::EFBIG,
            FsError::InvalidState { .. } | FsError::Store(_) => libc::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
