//! The native plugin ABI: symbol names, callback signatures, and the
//! opaque handle a plugin receives on every call.
//!
//! A plugin is a cdylib that links this crate (for `PluginHandle` and
//! `CmdData`) and exports `#[no_mangle] extern "C"` functions under the
//! fixed lifecycle names below, plus zero or more user-defined names it
//! declares into its handle's callback index during `onLoad`. The macro
//! sugar a plugin author might use to generate those exports is outside
//! this crate's concern — only the resulting symbols matter here.

use crate::cmd::CmdData;

/// Required entry point: called once after a plugin's native handle is
/// open and its dependencies (if any) are satisfied.
pub const SYM_ON_LOAD: &[u8] = b"onLoad\0";
/// Called once, synchronously, right after the native handle is opened,
/// before dependency resolution — populates `PluginHandle::depends`.
pub const SYM_ON_DEPENDS: &[u8] = b"onDepends\0";
/// Called when the plugin is about to be unloaded.
pub const SYM_ON_UNLOAD: &[u8] = b"onUnload\0";
/// Called once per `Manager::sync`.
pub const SYM_ON_TICK: &[u8] = b"onTick\0";
/// Called for every `notifyAll` broadcast.
pub const SYM_ON_NOTIFY: &[u8] = b"onNotify\0";
/// Called once, the first time the monitor reaches its ready state.
pub const SYM_ON_READY: &[u8] = b"onReady\0";

/// Signature shared by every lifecycle and user-defined callback: an
/// opaque handle to the calling plugin's own record, and the call
/// envelope.
pub type CallbackFn = unsafe extern "C" fn(*mut PluginHandle, *mut CmdData);

/// Opaque per-plugin handle passed to every callback invocation.
///
/// Concretely this crate's type (plugins depend on `pluginhost` as an
/// ordinary crate dependency rather than treating it as a fully foreign
/// C header), but plugins only ever touch it through the methods below —
/// never its field layout — so the loader is free to change the private
/// representation.
#[derive(Debug, Default)]
pub struct PluginHandle {
    cindex: Vec<String>,
    depends: Vec<String>,
}

impl PluginHandle {
    /// Create a fresh, empty handle. Used once per `Plugin` record by the
    /// loader; plugin code never constructs one itself.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by a plugin's `onDepends` to declare a dependency on another
    /// plugin by name.
    pub fn declare_dependency(&mut self, name: impl Into<String>) {
        self.depends.push(name.into());
    }

    /// Called by a plugin's `onLoad` to publish a user-defined callback
    /// name that the host should resolve and index (`cindex`).
    pub fn declare_callback(&mut self, name: impl Into<String>) {
        self.cindex.push(name.into());
    }

    /// Dependencies declared so far.
    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    /// Callback names declared so far.
    pub fn cindex(&self) -> &[String] {
        &self.cindex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_accumulates_declarations() {
        let mut handle = PluginHandle::new();
        handle.declare_dependency("base");
        handle.declare_callback("greet");
        handle.declare_callback("farewell");

        assert_eq!(handle.depends(), &["base".to_string()]);
        assert_eq!(
            handle.cindex(),
            &["greet".to_string(), "farewell".to_string()]
        );
    }
}
