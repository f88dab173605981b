//! Manifest descriptor for visual components.
//!
//! Every component exposes a manifest describing its identity and defaults.
//! The host uses it to present the component in its palette and to size the
//! component when first placed on the canvas.

use serde::{Deserialize, Serialize};

/// Logical grouping shown in the host's component palette.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    /// Audio level / loudness meters.
    Meter,
    /// Spectrum, FFT-based visualizations.
    Analyzer,
    /// Oscilloscope / Lissajous / goniometer.
    Scope,
    /// Stereo field visualizations.
    Stereo,
    /// Non-audio visual elements (shapes, images).
    Decoration,
    /// Utility / helper widgets.
    Utility,
    /// GPU-accelerated visual effects (shaders, particles).
    Visualizer,
    #[default]
    Other,
}

/// Describes a component type to the host.
///
/// Construct with [`Manifest::new`] and fill in the optional fields with a
/// struct update or the setters. Validation happens at registration time,
/// not at construction, so a bad manifest shows up as a per-plugin load
/// error rather than a panic inside component code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Reverse-domain unique identifier (e.g. `"com.example.my_meter"`).
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Category,
    /// Default (width, height) when first placed on the canvas.
    #[serde(default = "default_size")]
    pub default_size: (u32, u32),
    /// Minimum allowed resize.
    #[serde(default = "min_size")]
    pub min_size: (u32, u32),
    /// Maximum allowed resize; `None` = unlimited.
    #[serde(default)]
    pub max_size: Option<(u32, u32)>,
    #[serde(default)]
    pub icon: String,
    /// Searchable tags for palette filtering.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Project / documentation URL.
    #[serde(default)]
    pub url: String,
    /// External package dependencies that must be available before an
    /// instance can be created.
    #[serde(default)]
    pub requires: Vec<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

const fn default_size() -> (u32, u32) {
    (300, 200)
}

const fn min_size() -> (u32, u32) {
    (50, 50)
}

impl Manifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: default_version(),
            author: String::new(),
            description: String::new(),
            category: Category::Other,
            default_size: default_size(),
            min_size: min_size(),
            max_size: None,
            icon: String::new(),
            tags: Vec::new(),
            url: String::new(),
            requires: Vec::new(),
        }
    }

    /// Check the invariants the registry relies on: id and name are
    /// mandatory and the id is namespaced reverse-domain style.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.id.is_empty() || self.name.is_empty() {
            return Err(ManifestError::MissingIdentity);
        }
        if self.id.split('.').count() < 2 {
            return Err(ManifestError::UnqualifiedId(self.id.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest 'id' and 'name' are required")]
    MissingIdentity,
    #[error("manifest id must be reverse-domain style (e.g. 'com.example.my_meter'), got '{0}'")]
    UnqualifiedId(String),
}
