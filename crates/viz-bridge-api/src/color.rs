//! Color and gradient types.
//!
//! Colors travel over the wire as 0xAARRGGBB integers, matching what the
//! host's graphics pipeline expects, so [`Color`] has custom serde
//! implementations rather than derived struct serialization.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Immutable RGBA color with 0-255 components.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const CYAN: Color = Color::rgb(0, 255, 255);
    pub const MAGENTA: Color = Color::rgb(255, 0, 255);

    /// Create from a 0xAARRGGBB integer.
    pub const fn from_hex(argb: u32) -> Self {
        Self {
            r: ((argb >> 16) & 0xFF) as u8,
            g: ((argb >> 8) & 0xFF) as u8,
            b: (argb & 0xFF) as u8,
            a: ((argb >> 24) & 0xFF) as u8,
        }
    }

    /// Create from a `"#RRGGBB"` or `"#AARRGGBB"` string.
    pub fn from_hex_str(s: &str) -> Result<Self, ColorParseError> {
        let s = s.trim_start_matches('#');
        let parse = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&s[range], 16).map_err(|_| ColorParseError(s.to_string()))
        };
        match s.len() {
            6 => Ok(Self::rgb(parse(0..2)?, parse(2..4)?, parse(4..6)?)),
            8 => Ok(Self::rgba(
                parse(2..4)?,
                parse(4..6)?,
                parse(6..8)?,
                parse(0..2)?,
            )),
            _ => Err(ColorParseError(s.to_string())),
        }
    }

    pub const fn to_argb(self) -> u32 {
        ((self.a as u32) << 24) | ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// Return a copy with the alpha scaled by `alpha` (0.0-1.0).
    pub fn with_alpha(self, alpha: f32) -> Self {
        let a = (alpha.clamp(0.0, 1.0) * 255.0) as u8;
        Self { a, ..self }
    }

    /// Linear interpolation toward `other` by `t` (clamped to 0.0-1.0).
    pub fn lerp(self, other: Color, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t) as u8;
        Self {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Failure to parse a hex color string.
#[derive(Debug, thiserror::Error)]
#[error("invalid hex color string: #{0}")]
pub struct ColorParseError(pub String);

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.to_argb())
    }
}

struct ColorVisitor;

impl<'de> Visitor<'de> for ColorVisitor {
    type Value = Color;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an ARGB integer or hex color string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Color, E> {
        Ok(Color::from_hex(v as u32))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Color, E> {
        Ok(Color::from_hex(v as u32))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Color, E> {
        Color::from_hex_str(v).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
        deserializer.deserialize_any(ColorVisitor)
    }
}

/// A single color stop in a gradient, serialized as a `(position, argb)` pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientStop {
    pub position: f32,
    pub color: Color,
}

impl GradientStop {
    pub const fn new(position: f32, color: Color) -> Self {
        Self { position, color }
    }
}

impl Serialize for GradientStop {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.position, self.color).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GradientStop {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (position, color) = <(f32, Color)>::deserialize(deserializer)?;
        Ok(Self { position, color })
    }
}

/// Linear or radial gradient definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gradient {
    pub stops: Vec<GradientStop>,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(rename = "radial")]
    pub is_radial: bool,
}

impl Gradient {
    pub fn linear(x1: f32, y1: f32, x2: f32, y2: f32, stops: Vec<GradientStop>) -> Self {
        Self {
            stops,
            x1,
            y1,
            x2,
            y2,
            is_radial: false,
        }
    }

    pub fn radial(cx: f32, cy: f32, radius: f32, stops: Vec<GradientStop>) -> Self {
        Self {
            stops,
            x1: cx,
            y1: cy,
            x2: cx + radius,
            y2: cy,
            is_radial: true,
        }
    }

    /// Sample the gradient color at position `t` (0.0-1.0).
    pub fn color_at(&self, t: f32) -> Color {
        let Some(first) = self.stops.first() else {
            return Color::WHITE;
        };
        let t = t.clamp(0.0, 1.0);
        let mut prev = *first;
        for stop in &self.stops {
            if stop.position >= t {
                if stop.position == prev.position {
                    return stop.color;
                }
                let frac = (t - prev.position) / (stop.position - prev.position);
                return prev.color.lerp(stop.color, frac);
            }
            prev = *stop;
        }
        self.stops.last().map(|s| s.color).unwrap_or(Color::WHITE)
    }
}
