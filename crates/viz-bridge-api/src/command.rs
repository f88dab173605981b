//! Drawing command buffer vocabulary.
//!
//! Components never touch a graphics API directly; each render produces a
//! list of [`RenderCommand`]s which the host replays against its own
//! renderer. Commands serialize as tagged JSON objects with a `"cmd"`
//! discriminator, e.g. `{"cmd": "fill_rect", "x": 0.0, ...}`.

use crate::color::{Color, Gradient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Compositing mode for subsequent commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

/// Horizontal text alignment within the layout rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Font description for text commands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Font {
    pub family: String,
    pub size: f32,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

impl Font {
    pub fn new(family: impl Into<String>, size: f32) -> Self {
        Self {
            family: family.into(),
            size,
            bold: false,
            italic: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }
}

impl Default for Font {
    fn default() -> Self {
        Font::new("Arial", 14.0)
    }
}

/// One drawing operation in a frame's command buffer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum RenderCommand {
    Clear {
        color: Color,
    },
    FillRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Color,
    },
    StrokeRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Color,
        thickness: f32,
    },
    FillRoundedRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        radius: f32,
        color: Color,
    },
    StrokeRoundedRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        radius: f32,
        color: Color,
        thickness: f32,
    },
    FillEllipse {
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
        color: Color,
    },
    StrokeEllipse {
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
        color: Color,
        thickness: f32,
    },
    FillCircle {
        cx: f32,
        cy: f32,
        radius: f32,
        color: Color,
    },
    StrokeCircle {
        cx: f32,
        cy: f32,
        radius: f32,
        color: Color,
        thickness: f32,
    },
    DrawLine {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        color: Color,
        thickness: f32,
    },
    DrawPath {
        points: Vec<(f32, f32)>,
        color: Color,
        thickness: f32,
        closed: bool,
    },
    FillPath {
        points: Vec<(f32, f32)>,
        color: Color,
    },
    DrawPolyline {
        points: Vec<(f32, f32)>,
        color: Color,
        thickness: f32,
    },
    DrawArc {
        cx: f32,
        cy: f32,
        radius: f32,
        /// Start angle in radians.
        start: f32,
        /// End angle in radians.
        end: f32,
        color: Color,
        thickness: f32,
    },
    FillArc {
        cx: f32,
        cy: f32,
        radius: f32,
        start: f32,
        end: f32,
        color: Color,
    },
    DrawBezier {
        x1: f32,
        y1: f32,
        cx1: f32,
        cy1: f32,
        cx2: f32,
        cy2: f32,
        x2: f32,
        y2: f32,
        color: Color,
        thickness: f32,
    },
    DrawText {
        text: String,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Color,
        font: Font,
        align: TextAlign,
    },
    DrawImage {
        /// Key previously registered via image loading.
        key: String,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        opacity: f32,
    },
    FillGradientRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        gradient: Gradient,
    },
    SetClip {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    },
    ResetClip,
    PushTransform {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        translate: Option<(f32, f32)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rotate: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<(f32, f32)>,
    },
    PopTransform,
    SetOpacity {
        opacity: f32,
    },
    SetBlendMode {
        mode: BlendMode,
    },
    SaveState,
    RestoreState,
    /// Run one of the host's built-in shader effects.
    DrawShader {
        shader_id: String,
        uniforms: BTreeMap<String, f32>,
    },
    /// Compile and run component-supplied shader source. The host caches
    /// compiled pipelines by `cache_key`.
    DrawCustomShader {
        cache_key: String,
        fragment_source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        compute_source: Option<String>,
        buffer_size: u32,
        num_groups_x: u32,
        num_groups_y: u32,
        num_groups_z: u32,
        uniforms: BTreeMap<String, f32>,
    },
}
