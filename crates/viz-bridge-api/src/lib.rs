//! SDK for viz-bridge visual components
//!
//! This crate provides everything a component plugin needs: the
//! [`Component`] trait, the drawing command vocabulary, audio analysis
//! types, and the [`declare_plugin!`] macro that exports the symbols the
//! host looks for when loading a library.

pub mod audio;
pub mod color;
pub mod command;
pub mod component;
pub mod context;
pub mod manifest;
pub mod properties;

pub use audio::{AudioFrame, ChannelLevels, DB_FLOOR};
pub use color::{Color, ColorParseError, Gradient, GradientStop};
pub use command::{BlendMode, Font, RenderCommand, TextAlign};
pub use component::{
    Component, ComponentBase, ComponentError, FrameStats, PluginEntry, StateBag,
};
pub use context::{CustomShader, RenderContext};
pub use manifest::{Category, Manifest, ManifestError};
pub use properties::{Property, PropertyError, PropertyKind, PropertyStore};

pub const ABI_VERSION: u32 = 1;
