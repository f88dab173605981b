//! Component type registry and live instance table.
//!
//! Discovers component types from plugin libraries (plus an embedded
//! registration table for built-ins), owns every live instance, and is the
//! sole source of truth for both. All mutation happens on the dispatch
//! thread, so no locking is needed.

use crate::deps::DependencyCache;
use crate::error::{panic_message, RegistryError};
use libloading::{Library, Symbol};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use viz_bridge_api::{Component, Manifest, PluginEntry, ABI_VERSION};

/// Platform-specific dynamic library extension.
fn lib_extension() -> &'static str {
    if cfg!(target_os = "macos") {
        "dylib"
    } else if cfg!(target_os = "windows") {
        "dll"
    } else {
        "so"
    }
}

/// Where a record came from: the embedded registration table or a
/// library file under the plugins directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PluginUnit {
    Builtin,
    Library(PathBuf),
}

impl PluginUnit {
    /// Short stem for palette/source display.
    fn stem(&self) -> String {
        match self {
            PluginUnit::Builtin => "builtin".to_string(),
            PluginUnit::Library(path) => unit_stem(path),
        }
    }

    /// Full location for scan diagnostics.
    pub fn file(&self) -> String {
        match self {
            PluginUnit::Builtin => "builtin".to_string(),
            PluginUnit::Library(path) => path.display().to_string(),
        }
    }
}

/// Stem naming a unit: the file stem for top-level libraries, the package
/// directory name for nested `plugin.<ext>` files.
fn unit_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    if stem == "plugin" {
        if let Some(dir) = path.parent().and_then(|p| p.file_name()).and_then(|s| s.to_str()) {
            return dir.to_string();
        }
    }
    stem.to_string()
}

/// One discovered component type (or one failed discovery attempt).
#[derive(Clone, Debug, PartialEq)]
pub struct PluginRecord {
    pub unit: PluginUnit,
    pub type_name: String,
    pub manifest: Manifest,
    pub ctor: Option<fn() -> Box<dyn Component>>,
    pub load_error: Option<String>,
    pub enabled: bool,
}

/// A live component, owned by the registry until explicitly destroyed.
pub struct ComponentInstance {
    pub manifest_id: String,
    pub component: Box<dyn Component>,
}

/// Persisted form of one instance for project save/load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedInstance {
    pub manifest_id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub state: BTreeMap<String, Value>,
}

pub struct Registry {
    plugins_dir: PathBuf,
    plugins: BTreeMap<String, PluginRecord>,
    // Declared before the library maps so instances drop first: a live
    // component still holds code pointers into its library's mapping.
    instances: HashMap<String, ComponentInstance>,
    libraries: HashMap<PathBuf, Library>,
    // Replaced libraries are parked here rather than dropped, because
    // instances created from the old mapping may still be alive.
    retired: Vec<Library>,
    builtins: Vec<PluginEntry>,
    deps: DependencyCache,
}

impl Registry {
    pub fn new(plugins_dir: PathBuf) -> Self {
        Self::with_builtins(plugins_dir, Vec::new())
    }

    /// A registry whose scans always include the given embedded entries.
    pub fn with_builtins(plugins_dir: PathBuf, builtins: Vec<PluginEntry>) -> Self {
        Self {
            plugins_dir,
            plugins: BTreeMap::new(),
            instances: HashMap::new(),
            libraries: HashMap::new(),
            retired: Vec::new(),
            builtins,
            deps: DependencyCache::default(),
        }
    }

    /// Full re-discovery pass. Replaces all type records; live instances
    /// are untouched and keep their original type bindings.
    pub fn scan(&mut self) {
        self.plugins.clear();

        let builtins = self.builtins.clone();
        self.register_entries(&PluginUnit::Builtin, &builtins);

        if !self.plugins_dir.exists() {
            debug!("Plugins directory {:?} does not exist yet", self.plugins_dir);
            return;
        }

        let extension = lib_extension();
        let mut units = Vec::new();
        match std::fs::read_dir(&self.plugins_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        let nested = path.join(format!("plugin.{extension}"));
                        if nested.is_file() {
                            units.push(nested);
                        }
                    } else if path.extension().map_or(false, |e| e == extension) {
                        units.push(path);
                    }
                }
            }
            Err(e) => {
                error!("Cannot read plugins directory {:?}: {e}", self.plugins_dir);
                return;
            }
        }
        units.sort();

        for path in units {
            if let Err(e) = self.load_unit(&path) {
                error!("Failed to load plugin unit {path:?}: {e}");
                let stem = unit_stem(&path);
                let id = format!("error.{stem}");
                self.plugins.insert(
                    id.clone(),
                    PluginRecord {
                        unit: PluginUnit::Library(path),
                        type_name: String::new(),
                        manifest: Manifest::new(id, stem),
                        ctor: None,
                        load_error: Some(e.to_string()),
                        enabled: false,
                    },
                );
            }
        }

        info!(
            "Registered {} component types from {:?}",
            self.plugins.len(),
            self.plugins_dir
        );
    }

    /// Load one library unit and register its entries. Registry state is
    /// only mutated after the library loads and exports the expected
    /// symbols, so a failure leaves existing records for this unit intact.
    fn load_unit(&mut self, path: &Path) -> Result<Vec<String>, RegistryError> {
        let stem = unit_stem(path);
        let load_err = |message: String| RegistryError::Load {
            id: stem.clone(),
            message,
        };

        let lib = unsafe { Library::new(path) }.map_err(|e| load_err(e.to_string()))?;

        let entries = unsafe {
            let abi: Symbol<extern "C" fn() -> u32> = lib
                .get(b"viz_abi_version")
                .map_err(|_| load_err("missing symbol 'viz_abi_version'".to_string()))?;
            let found = abi();
            if found != ABI_VERSION {
                return Err(load_err(format!(
                    "incompatible ABI version: found {found}, expected {ABI_VERSION}"
                )));
            }

            let entries_fn: Symbol<fn() -> Vec<PluginEntry>> = lib
                .get(b"viz_plugin_entries")
                .map_err(|_| load_err("missing symbol 'viz_plugin_entries'".to_string()))?;
            entries_fn()
        };

        if entries.is_empty() {
            return Err(load_err("library declares no component types".to_string()));
        }

        let unit = PluginUnit::Library(path.to_path_buf());
        if let Some(old) = self.libraries.remove(path) {
            self.retired.push(old);
        }
        self.plugins.retain(|_, record| record.unit != unit);
        let ids = self.register_entries(&unit, &entries);
        self.libraries.insert(path.to_path_buf(), lib);

        info!("Loaded plugin unit '{stem}': {}", ids.join(", "));
        Ok(ids)
    }

    fn register_entries(&mut self, unit: &PluginUnit, entries: &[PluginEntry]) -> Vec<String> {
        let mut ids = Vec::new();
        for entry in entries {
            let manifest = (entry.manifest)();

            if let Err(e) = manifest.validate() {
                warn!("Invalid manifest from type '{}': {e}", entry.type_name);
                let id = if manifest.id.is_empty() {
                    format!("error.{}", entry.type_name)
                } else {
                    manifest.id.clone()
                };
                self.plugins.insert(
                    id.clone(),
                    PluginRecord {
                        unit: unit.clone(),
                        type_name: entry.type_name.to_string(),
                        manifest,
                        ctor: None,
                        load_error: Some(e.to_string()),
                        enabled: false,
                    },
                );
                ids.push(id);
                continue;
            }

            let id = manifest.id.clone();
            if let Some(previous) = self.plugins.get(&id) {
                // Last-wins lets a directory unit shadow a built-in.
                warn!(
                    "Duplicate manifest id '{id}': {} overrides {}",
                    unit.file(),
                    previous.unit.file()
                );
            }
            self.plugins.insert(
                id.clone(),
                PluginRecord {
                    unit: unit.clone(),
                    type_name: entry.type_name.to_string(),
                    manifest,
                    ctor: Some(entry.create),
                    load_error: None,
                    enabled: true,
                },
            );
            ids.push(id);
        }
        ids
    }

    pub fn records(&self) -> impl Iterator<Item = &PluginRecord> {
        self.plugins.values()
    }

    pub fn record(&self, manifest_id: &str) -> Option<&PluginRecord> {
        self.plugins.get(manifest_id)
    }

    /// Manifest list shaped for the host's component palette. Errored and
    /// disabled records are excluded.
    pub fn manifest_list(&self) -> Vec<Value> {
        self.plugins
            .values()
            .filter(|r| r.enabled && r.load_error.is_none())
            .map(|r| {
                serde_json::json!({
                    "id": r.manifest.id,
                    "name": r.manifest.name,
                    "category": r.manifest.category,
                    "default_size": r.manifest.default_size,
                    "description": r.manifest.description,
                    "author": r.manifest.author,
                    "version": r.manifest.version,
                    "tags": r.manifest.tags,
                    "icon": r.manifest.icon,
                    "source": r.unit.stem(),
                })
            })
            .collect()
    }

    /// Instantiate a component type. Construction and `on_init` run inside
    /// a panic boundary; a panic becomes an `Instantiation` error and no
    /// instance is registered.
    pub fn create(
        &mut self,
        manifest_id: &str,
        instance_id: Option<String>,
    ) -> Result<String, RegistryError> {
        let record = self
            .plugins
            .get(manifest_id)
            .ok_or_else(|| RegistryError::NotFound(manifest_id.to_string()))?;

        if let Some(message) = &record.load_error {
            return Err(RegistryError::Load {
                id: manifest_id.to_string(),
                message: message.clone(),
            });
        }

        let missing = self.deps.missing_for(&record.manifest);
        if !missing.is_empty() {
            return Err(RegistryError::Dependency {
                id: manifest_id.to_string(),
                missing,
            });
        }

        let ctor = record.ctor.ok_or_else(|| RegistryError::Load {
            id: manifest_id.to_string(),
            message: "no constructor registered".to_string(),
        })?;

        let component = catch_unwind(AssertUnwindSafe(|| {
            let mut component = ctor();
            let descriptors = component.properties();
            component.base_mut().props.init_defaults(&descriptors);
            component.on_init();
            component
        }))
        .map_err(|payload| RegistryError::Instantiation {
            id: manifest_id.to_string(),
            message: panic_message(payload),
        })?;

        let instance_id = instance_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        info!("Created instance {instance_id} of '{manifest_id}'");
        self.instances.insert(
            instance_id.clone(),
            ComponentInstance {
                manifest_id: manifest_id.to_string(),
                component,
            },
        );
        Ok(instance_id)
    }

    pub fn instance_mut(&mut self, instance_id: &str) -> Option<&mut ComponentInstance> {
        self.instances.get_mut(instance_id)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Remove and tear down one instance. A panicking teardown hook is
    /// logged and swallowed so it cannot block cleanup.
    pub fn destroy_instance(&mut self, instance_id: &str) -> bool {
        match self.instances.remove(instance_id) {
            Some(mut instance) => {
                let result = catch_unwind(AssertUnwindSafe(|| instance.component.on_destroy()));
                if let Err(payload) = result {
                    warn!(
                        "Teardown of instance {instance_id} panicked: {}",
                        panic_message(payload)
                    );
                }
                true
            }
            None => false,
        }
    }

    pub fn destroy_all(&mut self) {
        let ids: Vec<String> = self.instances.keys().cloned().collect();
        for id in ids {
            self.destroy_instance(&id);
        }
    }

    /// Reload one plugin's unit from disk. Atomic per unit: on failure the
    /// previous records stay registered unchanged. Live instances of the
    /// old type are never migrated.
    pub fn reload(&mut self, manifest_id: &str) -> bool {
        let Some(record) = self.plugins.get(manifest_id) else {
            warn!("Reload requested for unknown plugin '{manifest_id}'");
            return false;
        };
        match record.unit.clone() {
            PluginUnit::Builtin => true,
            PluginUnit::Library(path) => match self.load_unit(&path) {
                Ok(_) => {
                    info!("Reloaded plugin '{manifest_id}'");
                    true
                }
                Err(e) => {
                    error!("Reload of '{manifest_id}' failed, keeping previous version: {e}");
                    false
                }
            },
        }
    }

    /// Snapshot every live instance's persisted form.
    pub fn serialize_all(&self) -> BTreeMap<String, SavedInstance> {
        self.instances
            .iter()
            .map(|(id, instance)| {
                (
                    id.clone(),
                    SavedInstance {
                        manifest_id: instance.manifest_id.clone(),
                        properties: instance.component.base().props.values().clone(),
                        state: instance.component.base().state.to_map(),
                    },
                )
            })
            .collect()
    }

    /// Re-create instances from a snapshot. An entry whose manifest id no
    /// longer resolves is skipped with a warning, never an error.
    pub fn deserialize_all(&mut self, saved: BTreeMap<String, SavedInstance>) {
        for (instance_id, blob) in saved {
            match self.create(&blob.manifest_id, Some(instance_id.clone())) {
                Ok(id) => {
                    if let Some(instance) = self.instances.get_mut(&id) {
                        for (key, value) in blob.properties {
                            instance.component.set_property(&key, value);
                        }
                        instance.component.base_mut().state.merge(blob.state);
                    }
                }
                Err(e) => {
                    warn!("Skipping saved instance '{instance_id}': {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write as _;
    use viz_bridge_api::{
        AudioFrame, Color, ComponentBase, ComponentError, Property, PropertyKind, RenderContext,
    };

    #[derive(Default)]
    struct Meter {
        base: ComponentBase,
    }

    impl Component for Meter {
        fn manifest(&self) -> Manifest {
            Manifest::new("com.example.meter", "Meter")
        }

        fn base(&self) -> &ComponentBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ComponentBase {
            &mut self.base
        }

        fn properties(&self) -> Vec<Property> {
            vec![Property::new("gain", "Gain", PropertyKind::Float)
                .with_default(1.0)
                .with_range(0.0, 2.0)]
        }

        fn on_render(
            &mut self,
            ctx: &mut RenderContext,
            audio: &AudioFrame,
        ) -> Result<(), ComponentError> {
            let level = audio.left().rms_linear * ctx.height;
            ctx.fill_rect(0.0, ctx.height - level, ctx.width, level, Color::GREEN);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Exploder {
        base: ComponentBase,
    }

    impl Component for Exploder {
        fn manifest(&self) -> Manifest {
            Manifest::new("com.example.exploder", "Exploder")
        }

        fn base(&self) -> &ComponentBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ComponentBase {
            &mut self.base
        }

        fn on_init(&mut self) {
            panic!("bad wiring");
        }

        fn on_render(
            &mut self,
            _ctx: &mut RenderContext,
            _audio: &AudioFrame,
        ) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    fn meter_entry() -> PluginEntry {
        PluginEntry {
            type_name: "Meter",
            manifest: || Meter::default().manifest(),
            create: || Box::new(Meter::default()),
        }
    }

    fn exploder_entry() -> PluginEntry {
        PluginEntry {
            type_name: "Exploder",
            manifest: || Exploder::default().manifest(),
            create: || Box::new(Exploder::default()),
        }
    }

    fn test_registry() -> Registry {
        let mut registry = Registry::with_builtins(
            PathBuf::from("/nonexistent/components"),
            vec![meter_entry(), exploder_entry()],
        );
        registry.scan();
        registry
    }

    #[test]
    fn scan_registers_builtins() {
        let registry = test_registry();
        let record = registry.record("com.example.meter").unwrap();
        assert!(record.enabled);
        assert!(record.load_error.is_none());
        assert_eq!(record.unit, PluginUnit::Builtin);
    }

    #[test]
    fn rescan_is_idempotent_for_builtins() {
        let mut registry = test_registry();
        registry.scan();
        registry.scan();
        assert!(registry.record("com.example.meter").is_some());
        assert_eq!(registry.records().count(), 2);
    }

    #[test]
    fn unloadable_file_becomes_error_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("bogus.{}", lib_extension()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"not a shared library").unwrap();

        let mut registry = Registry::new(dir.path().to_path_buf());
        registry.scan();

        let record = registry.record("error.bogus").unwrap();
        assert!(record.load_error.is_some());
        assert!(!record.enabled);
        assert_eq!(record.unit, PluginUnit::Library(path));
    }

    #[test]
    fn create_unknown_id_is_not_found() {
        let mut registry = test_registry();
        assert!(matches!(
            registry.create("com.example.ghost", None),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn create_checks_dependencies() {
        let mut registry = test_registry();
        registry.deps = DependencyCache::with_probe(Box::new(|_| false));
        let mut manifest = Manifest::new("com.example.needy", "Needy");
        manifest.requires = vec!["fftw".into()];
        registry.plugins.insert(
            manifest.id.clone(),
            PluginRecord {
                unit: PluginUnit::Builtin,
                type_name: "Needy".into(),
                manifest,
                ctor: Some(|| Box::new(Meter::default())),
                load_error: None,
                enabled: true,
            },
        );
        match registry.create("com.example.needy", None) {
            Err(RegistryError::Dependency { missing, .. }) => {
                assert_eq!(missing, vec!["fftw".to_string()]);
            }
            other => panic!("expected dependency error, got {other:?}"),
        }
        assert_eq!(registry.instance_count(), 0);
    }

    #[test]
    fn create_contains_init_panics() {
        let mut registry = test_registry();
        match registry.create("com.example.exploder", None) {
            Err(RegistryError::Instantiation { message, .. }) => {
                assert!(message.contains("bad wiring"));
            }
            other => panic!("expected instantiation error, got {other:?}"),
        }
        assert_eq!(registry.instance_count(), 0);
    }

    #[test]
    fn create_populates_defaults_and_honours_supplied_id() {
        let mut registry = test_registry();
        let id = registry
            .create("com.example.meter", Some("meter-1".into()))
            .unwrap();
        assert_eq!(id, "meter-1");
        let instance = registry.instance_mut("meter-1").unwrap();
        assert_eq!(instance.component.base().props.get_f64("gain", 0.0), 1.0);
    }

    #[test]
    fn generated_ids_are_unique() {
        let mut registry = test_registry();
        let a = registry.create("com.example.meter", None).unwrap();
        let b = registry.create("com.example.meter", None).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.instance_count(), 2);
    }

    #[test]
    fn destroy_removes_instance() {
        let mut registry = test_registry();
        let id = registry.create("com.example.meter", None).unwrap();
        assert!(registry.destroy_instance(&id));
        assert!(!registry.destroy_instance(&id));
        assert_eq!(registry.instance_count(), 0);
    }

    #[test]
    fn save_load_round_trips_properties_and_state() {
        let mut registry = test_registry();
        let id = registry
            .create("com.example.meter", Some("meter-1".into()))
            .unwrap();
        {
            let instance = registry.instance_mut(&id).unwrap();
            instance.component.set_property("gain", json!(1.5));
            instance.component.base_mut().state.set("phase", 0.75);
        }

        let saved = registry.serialize_all();
        registry.destroy_all();
        assert_eq!(registry.instance_count(), 0);

        registry.deserialize_all(saved.clone());
        assert_eq!(registry.serialize_all(), saved);
        let instance = registry.instance_mut("meter-1").unwrap();
        assert_eq!(instance.component.base().props.get_f64("gain", 0.0), 1.5);
        assert_eq!(instance.component.base().state.get_f64("phase", 0.0), 0.75);
    }

    #[test]
    fn load_skips_unresolvable_manifests() {
        let mut registry = test_registry();
        let mut saved = BTreeMap::new();
        saved.insert(
            "ghost-1".to_string(),
            SavedInstance {
                manifest_id: "com.example.ghost".into(),
                properties: BTreeMap::new(),
                state: BTreeMap::new(),
            },
        );
        registry.deserialize_all(saved);
        assert_eq!(registry.instance_count(), 0);
    }

    #[test]
    fn duplicate_manifest_id_last_wins() {
        let other_meter = PluginEntry {
            type_name: "MeterV2",
            manifest: || Meter::default().manifest(),
            create: || Box::new(Meter::default()),
        };
        let mut registry = Registry::with_builtins(
            PathBuf::from("/nonexistent/components"),
            vec![meter_entry(), other_meter],
        );
        registry.scan();
        assert_eq!(registry.record("com.example.meter").unwrap().type_name, "MeterV2");
    }

    #[test]
    fn failed_reload_keeps_previous_record() {
        let mut registry = test_registry();
        let record = PluginRecord {
            unit: PluginUnit::Library(PathBuf::from("/nonexistent/ghost.so")),
            type_name: "Ghost".into(),
            manifest: Manifest::new("com.example.ghost", "Ghost"),
            ctor: Some(|| Box::new(Meter::default())),
            load_error: None,
            enabled: true,
        };
        registry
            .plugins
            .insert("com.example.ghost".to_string(), record.clone());

        assert!(!registry.reload("com.example.ghost"));
        assert_eq!(registry.plugins["com.example.ghost"], record);
    }

    #[test]
    fn manifest_list_excludes_errored_records() {
        let mut registry = test_registry();
        registry.plugins.insert(
            "error.bogus".to_string(),
            PluginRecord {
                unit: PluginUnit::Library(PathBuf::from("/tmp/bogus.so")),
                type_name: String::new(),
                manifest: Manifest::new("error.bogus", "bogus"),
                ctor: None,
                load_error: Some("boom".into()),
                enabled: false,
            },
        );
        let list = registry.manifest_list();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|m| m["id"] != "error.bogus"));
        assert!(list.iter().any(|m| m["source"] == "builtin"));
    }
}
