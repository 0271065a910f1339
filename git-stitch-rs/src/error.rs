use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline-level failures. Parser errors and interleaver sanity violations
/// are fatal: the output repository is not created.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed fast-export stream: {0}")]
    MalformedStream(String),

    #[error("escaped quotes in paths are not supported: {0}")]
    UnsupportedPathQuoting(String),

    #[error("mark :{0} from the branch log is not preceded by a commit command")]
    MissingCommitBeforeMark(u32),

    #[error("unexpected from command on the first commit of a branch")]
    UnexpectedFrom,

    #[error("duplicate blob mark :{0}")]
    DuplicateBlobMark(u32),

    #[error("dangling mark reference :{0}")]
    DanglingMarkReference(u32),

    #[error("{command}: {detail}")]
    HostToolFailed { command: String, detail: String },

    #[error("more than one input repository carries a .gitmodules manifest")]
    SubmoduleConflict,

    #[error("{0}")]
    Usage(String),

    #[error("failed to read config file {path}: {detail}")]
    Config { path: String, detail: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}
