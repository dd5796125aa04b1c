use std::any::Any;

use taskhub_core::error::CoreError;
use tokio::task::JoinError;

/// Why a handler did not produce a result.
///
/// Never escapes the worker pool: the pool turns it into a FAILURE record
/// whose description is this error's `Display` output.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A collaborator (artifact stager, ...) failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported output format '.{0}'")]
    UnsupportedFormat(String),

    #[error("Upscaled image would be {width}x{height}, above the {max}px limit")]
    TooLarge { width: u64, height: u64, max: u32 },

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Handler task was aborted: {0}")]
    Aborted(String),
}

impl From<JoinError> for HandlerError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            HandlerError::Panicked(panic_message(err.into_panic()))
        } else {
            HandlerError::Aborted(err.to_string())
        }
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
