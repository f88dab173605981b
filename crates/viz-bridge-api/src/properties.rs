//! Declarative property system for component settings.
//!
//! Properties declared by a component are surfaced in the host's property
//! panel; values round-trip as JSON, so the raw representation here is
//! [`serde_json::Value`]. Validation coerces a raw value to the declared
//! kind; numeric values out of range are clamped rather than rejected.

use crate::color::Color;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Supported property editor kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyKind {
    Int,
    Float,
    Bool,
    #[default]
    String,
    /// Opens a color picker; values are 0xAARRGGBB integers.
    Color,
    /// Drop-down with a fixed choice list.
    Enum,
    /// File browser dialog.
    FilePath,
    /// Slider with min/max/step.
    Range,
    /// An (x, y) pair.
    Point,
    /// A (w, h) pair.
    Size,
}

/// Describes a single editable property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Unique identifier within the component (used for storage).
    pub key: String,
    /// Human-readable label in the property panel.
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: PropertyKind,
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub description: String,
    /// Logical group name for collapsible panel sections.
    #[serde(default)]
    pub group: String,
    #[serde(rename = "min", default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(rename = "max", default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// (value, label) pairs for `Enum` properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<(Value, String)>>,
    /// Glob patterns for `FilePath` (e.g. `"*.png;*.jpg"`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_filter: String,
    /// Another property key -> required value for this property to be shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<BTreeMap<String, Value>>,
}

impl Property {
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
            default: Value::Null,
            description: String::new(),
            group: String::new(),
            min_value: None,
            max_value: None,
            step: None,
            choices: None,
            file_filter: String::new(),
            visible_when: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    pub fn with_color_default(mut self, color: Color) -> Self {
        self.default = Value::from(color.to_argb());
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_choices(mut self, choices: Vec<(Value, String)>) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Validate and coerce `value` to the declared kind.
    ///
    /// Null yields the declared default. Numeric kinds clamp to the
    /// declared `[min, max]`; the result is stable under re-validation.
    pub fn validate(&self, value: &Value) -> Result<Value, PropertyError> {
        if value.is_null() {
            return Ok(self.default.clone());
        }

        match self.kind {
            PropertyKind::Int => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| self.mismatch(value))?;
                let mut n = n as i64;
                if let Some(min) = self.min_value {
                    n = n.max(min as i64);
                }
                if let Some(max) = self.max_value {
                    n = n.min(max as i64);
                }
                Ok(Value::from(n))
            }
            PropertyKind::Float | PropertyKind::Range => {
                let mut n = value
                    .as_f64()
                    .ok_or_else(|| self.mismatch(value))?;
                if let Some(min) = self.min_value {
                    n = n.max(min);
                }
                if let Some(max) = self.max_value {
                    n = n.min(max);
                }
                Ok(Value::from(n))
            }
            PropertyKind::Bool => Ok(Value::Bool(json_truthy(value))),
            PropertyKind::String | PropertyKind::FilePath => match value {
                Value::String(_) => Ok(value.clone()),
                other => Ok(Value::String(other.to_string())),
            },
            PropertyKind::Color => {
                let color = match value {
                    Value::Number(n) => n
                        .as_u64()
                        .or_else(|| n.as_i64().map(|i| i as u64))
                        .map(|v| Color::from_hex(v as u32))
                        .ok_or_else(|| self.mismatch(value))?,
                    Value::String(s) => {
                        Color::from_hex_str(s).map_err(|_| self.mismatch(value))?
                    }
                    _ => return Err(self.mismatch(value)),
                };
                Ok(Value::from(color.to_argb()))
            }
            PropertyKind::Enum => {
                let choices = self.choices.as_deref().unwrap_or(&[]);
                if choices.iter().any(|(v, _)| v == value) {
                    Ok(value.clone())
                } else {
                    Err(PropertyError::InvalidChoice {
                        key: self.key.clone(),
                        value: value.clone(),
                    })
                }
            }
            PropertyKind::Point | PropertyKind::Size => {
                let pair = value
                    .as_array()
                    .filter(|a| a.len() == 2)
                    .and_then(|a| Some((a[0].as_f64()?, a[1].as_f64()?)))
                    .ok_or_else(|| self.mismatch(value))?;
                Ok(Value::from(vec![pair.0, pair.1]))
            }
        }
    }

    fn mismatch(&self, value: &Value) -> PropertyError {
        PropertyError::TypeMismatch {
            key: self.key.clone(),
            kind: self.kind,
            value: value.clone(),
        }
    }
}

/// JSON truthiness, matching how loosely-typed hosts send booleans.
fn json_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("property '{key}': cannot coerce {value} to {kind:?}")]
    TypeMismatch {
        key: String,
        kind: PropertyKind,
        value: Value,
    },
    #[error("property '{key}': invalid choice {value}")]
    InvalidChoice { key: String, value: Value },
}

/// Holds a component instance's declared descriptors and current values.
///
/// Setting a value runs it through [`Property::validate`]; a value that
/// fails validation is kept as given rather than rejected, so a host can
/// always write what the user typed and the component sees the raw value.
#[derive(Debug, Default)]
pub struct PropertyStore {
    defs: BTreeMap<String, Property>,
    values: BTreeMap<String, Value>,
}

impl PropertyStore {
    /// Record descriptors and populate missing values with their defaults.
    pub fn init_defaults(&mut self, props: &[Property]) {
        for prop in props {
            if !self.values.contains_key(&prop.key) {
                self.values.insert(prop.key.clone(), prop.default.clone());
            }
            self.defs.insert(prop.key.clone(), prop.clone());
        }
    }

    /// Validate-and-store; returns the value actually stored.
    pub fn set(&mut self, key: &str, value: Value) -> Value {
        let stored = match self.defs.get(key) {
            Some(def) => def.validate(&value).unwrap_or(value),
            None => value,
        };
        self.values.insert(key.to_string(), stored.clone());
        stored
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.values
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.values
            .get(key)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
    }

    pub fn get_color(&self, key: &str, default: Color) -> Color {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(default)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Overwrite values from a saved snapshot (used on project load).
    pub fn merge(&mut self, values: BTreeMap<String, Value>) {
        self.values.extend(values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gain() -> Property {
        Property::new("gain", "Gain", PropertyKind::Float)
            .with_default(0.5)
            .with_range(0.0, 1.0)
    }

    #[test]
    fn clamps_numeric_values() {
        let p = gain();
        assert_eq!(p.validate(&json!(1.5)).unwrap(), json!(1.0));
        assert_eq!(p.validate(&json!(-0.1)).unwrap(), json!(0.0));
        assert_eq!(p.validate(&json!(0.25)).unwrap(), json!(0.25));
    }

    #[test]
    fn validation_is_idempotent() {
        let p = gain();
        let once = p.validate(&json!(3.0)).unwrap();
        let twice = p.validate(&once).unwrap();
        assert_eq!(once, twice);

        let i = Property::new("bars", "Bars", PropertyKind::Int).with_range(1.0, 64.0);
        let once = i.validate(&json!(500)).unwrap();
        assert_eq!(once, json!(64));
        assert_eq!(i.validate(&once).unwrap(), once);
    }

    #[test]
    fn int_coerces_from_float() {
        let p = Property::new("count", "Count", PropertyKind::Int);
        assert_eq!(p.validate(&json!(12.7)).unwrap(), json!(12));
    }

    #[test]
    fn null_yields_default() {
        let p = gain();
        assert_eq!(p.validate(&Value::Null).unwrap(), json!(0.5));
    }

    #[test]
    fn enum_rejects_unknown_choice() {
        let p = Property::new("mode", "Mode", PropertyKind::Enum)
            .with_choices(vec![(json!("bars"), "Bars".into()), (json!("dots"), "Dots".into())]);
        assert!(p.validate(&json!("bars")).is_ok());
        assert!(matches!(
            p.validate(&json!("lines")),
            Err(PropertyError::InvalidChoice { .. })
        ));
    }

    #[test]
    fn color_accepts_int_and_string() {
        let p = Property::new("tint", "Tint", PropertyKind::Color);
        assert_eq!(
            p.validate(&json!(0xFF112233u32)).unwrap(),
            json!(0xFF112233u32)
        );
        assert_eq!(
            p.validate(&json!("#112233")).unwrap(),
            json!(0xFF112233u32)
        );
        assert!(p.validate(&json!([1, 2])).is_err());
    }

    #[test]
    fn point_coerces_arrays() {
        let p = Property::new("origin", "Origin", PropertyKind::Point);
        assert_eq!(p.validate(&json!([3, 4])).unwrap(), json!([3.0, 4.0]));
        assert!(p.validate(&json!("nope")).is_err());
    }

    #[test]
    fn store_keeps_raw_value_on_failed_validation() {
        let mut store = PropertyStore::default();
        store.init_defaults(&[Property::new("mode", "Mode", PropertyKind::Enum)
            .with_default("bars")
            .with_choices(vec![(json!("bars"), "Bars".into())])]);
        let stored = store.set("mode", json!("lines"));
        assert_eq!(stored, json!("lines"));
        assert_eq!(store.get("mode"), Some(&json!("lines")));
    }

    #[test]
    fn store_populates_defaults_once() {
        let mut store = PropertyStore::default();
        store.init_defaults(&[gain()]);
        assert_eq!(store.get_f64("gain", 0.0), 0.5);
        store.set("gain", json!(0.9));
        store.init_defaults(&[gain()]);
        assert_eq!(store.get_f64("gain", 0.0), 0.9);
    }

    #[test]
    fn kind_wire_names() {
        assert_eq!(
            serde_json::to_value(PropertyKind::FilePath).unwrap(),
            json!("FILE_PATH")
        );
        assert_eq!(serde_json::to_value(PropertyKind::Int).unwrap(), json!("INT"));
    }
}
