use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("bad operator: {0}")]
    BadOperator(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("lock timeout: unable to acquire {0} lock")]
    LockTimeout(&'static str),

    #[error("sync timeout: pending changes did not settle in time")]
    SyncTimeout,

    #[error("watcher init failed: {0}")]
    InitFailed(String),

    #[error("root {0} has been removed, watch cancelled")]
    RootVanished(PathBuf),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
