//! The component trait and per-instance support types.

use crate::audio::AudioFrame;
use crate::context::RenderContext;
use crate::manifest::Manifest;
use crate::properties::{Property, PropertyStore};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;

/// A render callback failed. The host keeps the instance alive and shows
/// an error overlay until a render succeeds again.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ComponentError(pub String);

impl From<&str> for ComponentError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for ComponentError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Free-form per-instance state that survives project save/load.
///
/// Anything a component wants persisted beyond its declared properties
/// goes here; values round-trip through the host's project file as JSON.
#[derive(Debug, Default)]
pub struct StateBag {
    entries: BTreeMap<String, Value>,
}

impl StateBag {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.entries.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.entries.get(key).and_then(Value::as_i64).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.entries.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.entries.clone()
    }

    pub fn merge(&mut self, entries: BTreeMap<String, Value>) {
        self.entries.extend(entries);
    }
}

/// Rolling frames-per-second estimate, refreshed every 30 frames.
#[derive(Debug)]
pub struct FrameStats {
    frame_count: u64,
    window_start: Instant,
    fps: f32,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            frame_count: 0,
            window_start: Instant::now(),
            fps: 0.0,
        }
    }
}

impl FrameStats {
    const WINDOW: u64 = 30;

    pub fn tick(&mut self) {
        self.frame_count += 1;
        if self.frame_count % Self::WINDOW == 0 {
            let elapsed = self.window_start.elapsed().as_secs_f32();
            if elapsed > 0.0 {
                self.fps = Self::WINDOW as f32 / elapsed;
            }
            self.window_start = Instant::now();
        }
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Shared per-instance plumbing every component owns.
///
/// Embed one of these in your component struct and hand it back from
/// [`Component::base`] / [`Component::base_mut`].
#[derive(Debug, Default)]
pub struct ComponentBase {
    pub state: StateBag,
    pub props: PropertyStore,
    images: BTreeMap<String, String>,
    stats: FrameStats,
}

impl ComponentBase {
    /// Register an image file for later [`RenderContext::draw_image`] use.
    /// The host loads the file and caches the texture under `key`.
    pub fn load_image(&mut self, key: impl Into<String>, path: impl Into<String>) {
        self.images.insert(key.into(), path.into());
    }

    pub fn images(&self) -> &BTreeMap<String, String> {
        &self.images
    }

    pub fn fps(&self) -> f32 {
        self.stats.fps()
    }

    /// Called by the host once per render.
    pub fn tick_frame(&mut self) {
        self.stats.tick();
    }
}

/// A visual component: produces a command buffer from audio analysis.
///
/// Only [`Component::on_render`] and the three accessors are required;
/// the lifecycle hooks default to no-ops.
pub trait Component {
    fn manifest(&self) -> Manifest;

    fn base(&self) -> &ComponentBase;

    fn base_mut(&mut self) -> &mut ComponentBase;

    /// Property descriptors shown in the host's property panel.
    fn properties(&self) -> Vec<Property> {
        Vec::new()
    }

    /// Called once after creation, before the first render.
    fn on_init(&mut self) {}

    /// Produce this frame's drawing commands.
    fn on_render(
        &mut self,
        ctx: &mut RenderContext,
        audio: &AudioFrame,
    ) -> Result<(), ComponentError>;

    fn on_resize(&mut self, _width: f32, _height: f32) {}

    /// Called after a property value change has been stored.
    fn on_property_changed(&mut self, _key: &str, _value: &Value) {}

    fn on_mouse_down(&mut self, _x: f32, _y: f32, _button: u8) {}

    fn on_mouse_move(&mut self, _x: f32, _y: f32) {}

    fn on_mouse_up(&mut self, _x: f32, _y: f32, _button: u8) {}

    /// Called once before the instance is dropped.
    fn on_destroy(&mut self) {}

    /// Validate, store, and notify. Returns the value actually stored,
    /// which may differ from `value` after clamping or coercion.
    fn set_property(&mut self, key: &str, value: Value) -> Value {
        let stored = self.base_mut().props.set(key, value);
        self.on_property_changed(key, &stored);
        stored
    }
}

/// One registrable component type inside a plugin library.
///
/// Function pointers rather than trait objects so entries stay `Copy` and
/// can cross the `extern` boundary without lifetime ties to the library.
#[derive(Clone, Copy)]
pub struct PluginEntry {
    pub type_name: &'static str,
    pub manifest: fn() -> Manifest,
    pub create: fn() -> Box<dyn Component>,
}

impl std::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl PartialEq for PluginEntry {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && std::ptr::eq(self.manifest as *const (), other.manifest as *const ())
            && std::ptr::eq(self.create as *const (), other.create as *const ())
    }
}

/// Export the symbols the host looks for when loading a plugin library.
///
/// Each listed type must implement [`Component`] and `Default`:
///
/// ```ignore
/// declare_plugin!(SpectrumBars, PeakMeter);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($($ty:ty),+ $(,)?) => {
        #[no_mangle]
        pub extern "C" fn viz_abi_version() -> u32 {
            $crate::ABI_VERSION
        }

        #[no_mangle]
        pub fn viz_plugin_entries() -> ::std::vec::Vec<$crate::PluginEntry> {
            ::std::vec![
                $(
                    $crate::PluginEntry {
                        type_name: stringify!($ty),
                        manifest: || {
                            <$ty as ::core::default::Default>::default().manifest()
                        },
                        create: || {
                            ::std::boxed::Box::new(
                                <$ty as ::core::default::Default>::default(),
                            )
                        },
                    },
                )+
            ]
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::PropertyKind;
    use serde_json::json;

    #[derive(Default)]
    struct Probe {
        base: ComponentBase,
        last_changed: Option<(String, Value)>,
    }

    impl Component for Probe {
        fn manifest(&self) -> Manifest {
            Manifest::new("com.example.probe", "Probe")
        }

        fn base(&self) -> &ComponentBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ComponentBase {
            &mut self.base
        }

        fn properties(&self) -> Vec<Property> {
            vec![Property::new("level", "Level", PropertyKind::Float)
                .with_default(0.5)
                .with_range(0.0, 1.0)]
        }

        fn on_render(
            &mut self,
            _ctx: &mut RenderContext,
            _audio: &AudioFrame,
        ) -> Result<(), ComponentError> {
            Ok(())
        }

        fn on_property_changed(&mut self, key: &str, value: &Value) {
            self.last_changed = Some((key.to_string(), value.clone()));
        }
    }

    #[test]
    fn set_property_validates_and_notifies() {
        let mut c = Probe::default();
        let props = c.properties();
        c.base_mut().props.init_defaults(&props);

        let stored = c.set_property("level", json!(5.0));
        assert_eq!(stored, json!(1.0));
        assert_eq!(c.last_changed, Some(("level".into(), json!(1.0))));
    }

    #[test]
    fn state_bag_round_trips() {
        let mut bag = StateBag::default();
        bag.set("phase", 0.25);
        bag.set("armed", true);
        let snapshot = bag.to_map();

        let mut restored = StateBag::default();
        restored.merge(snapshot);
        assert_eq!(restored.get_f64("phase", 0.0), 0.25);
        assert!(restored.get_bool("armed", false));
    }

    #[test]
    fn frame_stats_count_frames() {
        let mut stats = FrameStats::default();
        for _ in 0..10 {
            stats.tick();
        }
        assert_eq!(stats.frame_count(), 10);
    }

    declare_plugin!(Probe);

    #[test]
    fn declare_plugin_exports_entries() {
        assert_eq!(viz_abi_version(), crate::ABI_VERSION);
        let entries = viz_plugin_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].type_name, "Probe");
        assert_eq!((entries[0].manifest)().id, "com.example.probe");

        let mut component = (entries[0].create)();
        let mut ctx = RenderContext::new(10.0, 10.0);
        assert!(component
            .on_render(&mut ctx, &AudioFrame::default())
            .is_ok());
    }

    #[test]
    fn base_registers_images() {
        let mut base = ComponentBase::default();
        base.load_image("logo", "/tmp/logo.png");
        assert_eq!(base.images().get("logo").map(String::as_str), Some("/tmp/logo.png"));
    }
}
