//! The `Plugin` record: one per loaded (or half-loaded) native library.

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexSet;
use libloading::Library;

use crate::abi::{CallbackFn, PluginHandle};

/// Resolved lifecycle callback pointers. Present only once a plugin has
/// cleared dependency resolution — see [`Plugin::is_ready`].
pub(crate) struct Callbacks {
    pub on_load: CallbackFn,
    pub on_unload: Option<CallbackFn>,
    pub on_tick: Option<CallbackFn>,
    pub on_notify: Option<CallbackFn>,
    pub on_ready: Option<CallbackFn>,
}

/// One record per plugin known to the manager.
///
/// A `Plugin` exists in one of two states even though it's a single Rust
/// type: *pending* (native handle open, `depends` resolved from
/// `onDepends`, but one or more dependencies are not yet in the table, so
/// `onLoad` has not run and `callbacks` is `None`) and *ready* (`onLoad`
/// has run successfully and `callbacks` is populated). `initPlugin` is the
/// only thing that promotes a plugin from pending to ready, and doing so
/// is idempotent: calling it again on an already-ready plugin, or on a
/// pending plugin whose dependencies are still missing, is a no-op.
pub struct Plugin {
    /// Unique name: file stem with any platform library prefix stripped.
    pub name: String,
    /// Source path, if this plugin was compiled from source.
    pub source_path: Option<PathBuf>,
    /// Resolved shared-library path actually opened.
    pub lib_path: PathBuf,
    /// The open native handle. Kept alive for as long as the record
    /// exists; dropping it is what `unloadPlugin` ultimately does.
    pub(crate) library: Arc<Library>,
    /// Declared dependency names (from `onDepends`).
    pub depends: Vec<String>,
    /// Names of plugins that declared a dependency on this one.
    pub dependents: IndexSet<String>,
    /// Accumulator the plugin itself writes into during `onDepends`/`onLoad`.
    pub(crate) handle: Box<PluginHandle>,
    /// Resolved lifecycle callbacks; `None` while pending.
    pub(crate) callbacks: Option<Callbacks>,
    /// Name -> resolved function pointer for user-defined callbacks.
    /// Always a subset of `self.handle.cindex()`.
    pub(crate) callback_map: HashMap<String, CallbackFn>,
    /// Opaque, plugin-scoped data. Destroyed with the plugin.
    pub data: Option<Box<dyn Any + Send>>,
    /// Whether a missing-dependency notify has already been emitted for
    /// this half-initialized plugin. The first `initPlugin` retry that
    /// finds a dependency still missing stays silent; the second (and
    /// every later one) does not repeat the notify either — only the
    /// first *miss after load* does, per the error table.
    pub(crate) dependency_notice_sent: bool,
}

impl Plugin {
    /// Whether `onLoad` has run and lifecycle callbacks are resolved.
    pub fn is_ready(&self) -> bool {
        self.callbacks.is_some()
    }

    /// Names of user-defined callbacks this plugin declared, whether or
    /// not the host was able to resolve all of them.
    pub fn declared_callbacks(&self) -> &[String] {
        self.handle.cindex()
    }

    /// Names of user-defined callbacks the host successfully resolved.
    pub fn resolved_callback_names(&self) -> impl Iterator<Item = &str> {
        self.callback_map.keys().map(String::as_str)
    }

    pub(crate) fn on_unload(&self) -> Option<CallbackFn> {
        self.callbacks.as_ref().and_then(|c| c.on_unload)
    }

    pub(crate) fn on_tick(&self) -> Option<CallbackFn> {
        self.callbacks.as_ref().and_then(|c| c.on_tick)
    }

    pub(crate) fn on_notify(&self) -> Option<CallbackFn> {
        self.callbacks.as_ref().and_then(|c| c.on_notify)
    }

    pub(crate) fn on_ready(&self) -> Option<CallbackFn> {
        self.callbacks.as_ref().and_then(|c| c.on_ready)
    }

    pub(crate) fn clear_on_notify(&mut self) {
        if let Some(callbacks) = &mut self.callbacks {
            callbacks.on_notify = None;
        }
    }

    pub(crate) fn clear_on_ready(&mut self) {
        if let Some(callbacks) = &mut self.callbacks {
            callbacks.on_ready = None;
        }
    }

    pub(crate) fn callback(&self, name: &str) -> Option<CallbackFn> {
        self.callback_map.get(name).copied()
    }
}
