//! viz-bridge runtime host
//!
//! Supervised runtime for visual components: discovers plugins, manages
//! instance lifecycle, feeds components audio analysis from shared memory
//! (with a JSON fallback), and speaks a newline-delimited JSON protocol
//! with the rendering host over stdin/stdout.

pub mod bridge;
pub mod config;
pub mod deps;
pub mod error;
pub mod registry;
pub mod shm;

pub use bridge::{Bridge, PluginSummary, Response};
pub use config::Config;
pub use deps::DependencyCache;
pub use error::{RegistryError, ShmError};
pub use registry::{ComponentInstance, PluginRecord, PluginUnit, Registry, SavedInstance};
pub use shm::{AudioShmReader, DEFAULT_SHM_NAME};
