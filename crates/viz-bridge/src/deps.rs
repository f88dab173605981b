//! External dependency availability checks.
//!
//! A manifest may declare external packages in `requires`. Probing for a
//! package means attempting a dynamic-library load, which is expensive, so
//! results are cached for the process lifetime and only invalidated when
//! the host reports a successful install.

use std::collections::HashMap;
use tracing::debug;
use viz_bridge_api::Manifest;

type Probe = Box<dyn Fn(&str) -> bool + Send>;

pub struct DependencyCache {
    checked: HashMap<String, bool>,
    probe: Probe,
}

impl Default for DependencyCache {
    fn default() -> Self {
        Self::with_probe(Box::new(default_probe))
    }
}

fn default_probe(name: &str) -> bool {
    let filename = libloading::library_filename(name);
    // Load purely as an availability check; the handle is dropped again.
    unsafe { libloading::Library::new(filename).is_ok() }
}

impl DependencyCache {
    pub fn with_probe(probe: Probe) -> Self {
        Self {
            checked: HashMap::new(),
            probe,
        }
    }

    pub fn is_available(&mut self, name: &str) -> bool {
        if let Some(known) = self.checked.get(name) {
            return *known;
        }
        let available = (self.probe)(name);
        debug!("Dependency probe '{name}': available = {available}");
        self.checked.insert(name.to_string(), available);
        available
    }

    /// Forget the cached verdict after the host installs a package, so the
    /// next check re-probes.
    pub fn mark_installed(&mut self, name: &str) {
        self.checked.remove(name);
    }

    /// Declared dependencies of `manifest` that are not available.
    pub fn missing_for(&mut self, manifest: &Manifest) -> Vec<String> {
        manifest
            .requires
            .iter()
            .filter(|name| !self.is_available(name))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn probe_results_are_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut cache = DependencyCache::with_probe(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            false
        }));

        assert!(!cache.is_available("fftw"));
        assert!(!cache.is_available("fftw"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.mark_installed("fftw");
        assert!(!cache.is_available("fftw"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_for_filters_available_packages() {
        let mut cache = DependencyCache::with_probe(Box::new(|name| name == "present"));
        let mut manifest = Manifest::new("com.example.x", "X");
        manifest.requires = vec!["present".into(), "absent".into()];
        assert_eq!(cache.missing_for(&manifest), vec!["absent".to_string()]);
    }

    #[test]
    fn empty_requires_is_never_missing() {
        let mut cache = DependencyCache::with_probe(Box::new(|_| false));
        let manifest = Manifest::new("com.example.x", "X");
        assert!(cache.missing_for(&manifest).is_empty());
    }
}
