use std::any::Any;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from the engine, its loader and its configuration.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is shutting down; work rejected")]
    Closed,
    #[error("run_once called from a thread that does not own the graphics context")]
    WrongThread,
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to spawn loader thread: {0}")]
    Spawn(String),
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
