use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("session directory is not configured")]
    Disabled,

    #[error("no directory entry for session {0}")]
    NotFound(String),

    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("directory returned HTTP {0}")]
    Status(u16),

    #[error("invalid directory entry: {0}")]
    Decode(String),
}
