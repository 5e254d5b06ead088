use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("invalid config, {0}")]
    InvalidConfig(String),
    #[error("unexpected error, {0}")]
    Other(#[source] Box<dyn std::error::Error + Sync + Send + 'static>),
    #[error("timeout")]
    Elapsed,
    #[error("{0}")]
    Msg(String),
    #[error("send error, {0}")]
    SendError(String),
    #[error("recv error, {0}")]
    RecvError(String),
}

impl Error {
    #[inline]
    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        Error::InvalidConfig(msg.into())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    #[inline]
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::SendError(e.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    #[inline]
    fn from(e: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::RecvError(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Other(Box::new(e))
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Self::Msg(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Self::Msg(e.to_owned())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    #[inline]
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Elapsed
    }
}
