//! Shared-data registries: manager-scoped storage that survives a
//! plugin's unload/reload cycle.
//!
//! Plugin-scoped data lives directly on [`crate::plugin::Plugin::data`]
//! and is dropped along with the record. Manager-scoped data is the other
//! half of spec §4.5: an opaque slot keyed by plugin name, allocated
//! lazily and released explicitly, independent of whether that plugin is
//! currently loaded.

use std::any::Any;
use std::collections::HashMap;

/// Manager-scoped opaque data registry.
///
/// The manager does not interpret the stored bytes at all; it only
/// guarantees the lifetime rule from the spec: an entry survives its
/// producing plugin being unloaded and reloaded, and is only ever removed
/// by an explicit [`OpaqueRegistry::release`] (or manager teardown).
#[derive(Default)]
pub struct OpaqueRegistry {
    slots: HashMap<String, Box<dyn Any + Send>>,
}

impl OpaqueRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a typed reference to a plugin's slot, if present and of type `T`.
    pub fn get<T: 'static>(&self, plugin_name: &str) -> Option<&T> {
        self.slots.get(plugin_name)?.downcast_ref()
    }

    /// Get a typed mutable reference to a plugin's slot, if present and of
    /// type `T`.
    pub fn get_mut<T: 'static>(&mut self, plugin_name: &str) -> Option<&mut T> {
        self.slots.get_mut(plugin_name)?.downcast_mut()
    }

    /// Allocate (or overwrite) a plugin's slot.
    pub fn set<T: Send + 'static>(&mut self, plugin_name: impl Into<String>, value: T) {
        self.slots.insert(plugin_name.into(), Box::new(value));
    }

    /// Get the slot if present, otherwise allocate it with `default` first.
    pub fn get_or_insert_with<T: Send + 'static>(
        &mut self,
        plugin_name: impl Into<String>,
        default: impl FnOnce() -> T,
    ) -> &mut T {
        self.slots
            .entry(plugin_name.into())
            .or_insert_with(|| Box::new(default()))
            .downcast_mut()
            .expect("registry slot type mismatch")
    }

    /// Explicitly release a plugin's slot, dropping its contents.
    pub fn release(&mut self, plugin_name: &str) -> bool {
        self.slots.remove(plugin_name).is_some()
    }

    /// Whether a slot exists for `plugin_name`.
    pub fn contains(&self, plugin_name: &str) -> bool {
        self.slots.contains_key(plugin_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip() {
        let mut reg = OpaqueRegistry::new();
        reg.set("plg1", 42u32);
        assert_eq!(reg.get::<u32>("plg1"), Some(&42));
    }

    #[test]
    fn survives_logical_unload_since_manager_owns_it() {
        // The registry itself has no notion of plugin load state; the
        // manager simply never calls release() on unload, only on
        // explicit teardown. This test documents that guarantee.
        let mut reg = OpaqueRegistry::new();
        reg.set("plg1", vec!["state".to_string()]);
        // Simulate unload/reload: nothing touches the registry.
        assert_eq!(
            reg.get::<Vec<String>>("plg1"),
            Some(&vec!["state".to_string()])
        );
    }

    #[test]
    fn release_drops_the_slot() {
        let mut reg = OpaqueRegistry::new();
        reg.set("plg1", 1u32);
        assert!(reg.release("plg1"));
        assert_eq!(reg.get::<u32>("plg1"), None);
        assert!(!reg.release("plg1"));
    }

    #[test]
    fn get_or_insert_with_allocates_lazily() {
        let mut reg = OpaqueRegistry::new();
        assert!(!reg.contains("plg1"));
        let slot = reg.get_or_insert_with("plg1", || 7u32);
        *slot += 1;
        assert_eq!(reg.get::<u32>("plg1"), Some(&8));
    }
}
