//! Error taxonomy for the runtime host.

use std::any::Any;

/// Errors that can occur while registering or instantiating components.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Plugin '{0}' not found")]
    NotFound(String),

    #[error("Plugin '{id}' failed to load: {message}")]
    Load { id: String, message: String },

    #[error("Plugin '{id}' requires packages that are not installed: {}", .missing.join(", "))]
    Dependency { id: String, missing: Vec<String> },

    #[error("Error initializing '{id}': {message}")]
    Instantiation { id: String, message: String },
}

/// Errors from the shared-memory audio transport. Any of these causes a
/// fall back to JSON-supplied audio rather than a fatal failure.
#[derive(Debug, thiserror::Error)]
pub enum ShmError {
    #[error("bad magic 0x{found:08X}, expected 0x{expected:08X}")]
    BadMagic { found: u32, expected: u32 },

    #[error("region too small: {len} bytes")]
    TooSmall { len: usize },

    #[error("shared memory is not supported on this platform")]
    Unsupported,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Extract a printable message from a `catch_unwind` payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
