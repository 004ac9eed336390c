//! Load/unload/init: dependency-ordered opening and closing of native
//! plugin libraries.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use libloading::Library;

use crate::abi::{
    CallbackFn, PluginHandle, SYM_ON_DEPENDS, SYM_ON_LOAD, SYM_ON_NOTIFY, SYM_ON_READY,
    SYM_ON_TICK, SYM_ON_UNLOAD,
};
use crate::cmd::CmdData;
use crate::manager::Manager;
use crate::naming;
use crate::plugin::{Callbacks, Plugin};

impl Manager {
    /// Open (or reopen) the library at `path` and add it to the plugin
    /// table, deferring `onLoad` if dependencies are not yet satisfied.
    ///
    /// `path` may be a live library path or a `.new` sidecar produced by
    /// the monitor in source mode.
    pub(crate) fn load_plugin(&mut self, path: &Path) {
        // `path` may be a `.new` sidecar (`libplg1.so.new`), in which case
        // the name must be derived from the *live* path it replaces
        // (`libplg1.so`) rather than from `path` itself — `file_stem` only
        // strips one extension, so deriving from the sidecar path directly
        // would yield `plg1.so` instead of `plg1`.
        let live_path = if naming::is_sidecar(path) {
            naming::strip_sidecar(path)
        } else {
            path.to_path_buf()
        };
        let name = naming::derive_plugin_name(&live_path);

        if self.plugins.contains_key(&name) {
            self.unload_plugin(&name, true);
        }

        if naming::is_sidecar(path) {
            if let Err(reason) = self.replace_with_sidecar(path, &live_path) {
                self.notify_all(&format!(
                    "Plugin '{name}' replace failed, falling back to existing library: {reason}"
                ));
                return;
            }
        }

        let library = match unsafe { Library::new(&live_path) } {
            Ok(lib) => Arc::new(lib),
            Err(source) => {
                tracing::warn!(plugin = %name, path = %live_path.display(), error = %source, "failed to open plugin library");
                self.notify_all(&format!("Plugin '{name}' failed to open: {source}"));
                return;
            }
        };

        let mut handle = Box::new(PluginHandle::new());
        if let Ok(on_depends) = unsafe { library.get::<CallbackFn>(SYM_ON_DEPENDS) } {
            let on_depends: CallbackFn = *on_depends;
            let mut cmd = CmdData::new();
            match invoke(&name, "onDepends", on_depends, &mut handle, &mut cmd) {
                Ok(()) if !cmd.failed => {}
                _ => {
                    self.notify_all(&format!("Plugin '{name}' onDepends failed, not loaded"));
                    return;
                }
            }
        }

        let plugin = Plugin {
            name: name.clone(),
            source_path: None,
            lib_path: live_path,
            library,
            depends: handle.depends().to_vec(),
            dependents: Default::default(),
            handle,
            callbacks: None,
            callback_map: Default::default(),
            data: None,
            dependency_notice_sent: false,
        };

        self.plugins.insert(name.clone(), plugin);
        self.init_plugin(&name);
    }

    /// Attempt to promote a pending plugin to ready: resolve `onLoad`
    /// and the rest of its lifecycle/user callbacks once every declared
    /// dependency is present in the table. A no-op if the plugin is
    /// already ready, unknown, or still missing a dependency.
    pub(crate) fn init_plugin(&mut self, name: &str) {
        if !self.plugins.contains_key(name) {
            return;
        }
        if self.plugins[name].is_ready() {
            return;
        }

        let depends = self.plugins[name].depends.clone();
        // A dependency only counts as satisfied once it's fully loaded
        // (onLoad has run and its callbacks are resolved) — a dependency
        // merely present in the table but still pending its own
        // dependencies is not enough, otherwise two plugins depending on
        // each other would let one spuriously load off the other's
        // half-initialized record instead of both staying pending.
        let missing = depends
            .iter()
            .find(|d| !self.plugins.get(d.as_str()).is_some_and(|p| p.is_ready()))
            .cloned();

        if let Some(dependency) = missing {
            let already_notified = self.plugins[name].dependency_notice_sent;
            if !already_notified {
                self.notify_all(&format!("Plugin '{name}' dependency '{dependency}' not loaded"));
                self.plugins[name].dependency_notice_sent = true;
            }
            return;
        }

        let library = Arc::clone(&self.plugins[name].library);

        let on_load = match unsafe { library.get::<CallbackFn>(SYM_ON_LOAD) } {
            Ok(sym) => *sym,
            Err(_) => {
                self.notify_all(&format!("Plugin '{name}' missing required onLoad, unloading"));
                self.unload_plugin(name, true);
                return;
            }
        };

        let on_unload = unsafe { library.get::<CallbackFn>(SYM_ON_UNLOAD) }.ok().map(|s| *s);
        let on_tick = unsafe { library.get::<CallbackFn>(SYM_ON_TICK) }.ok().map(|s| *s);
        let on_notify = unsafe { library.get::<CallbackFn>(SYM_ON_NOTIFY) }.ok().map(|s| *s);
        let on_ready = unsafe { library.get::<CallbackFn>(SYM_ON_READY) }.ok().map(|s| *s);

        {
            let plugin = self.plugins.get_mut(name).expect("checked above");
            let mut cmd = CmdData::new();
            let outcome = invoke(name, "onLoad", on_load, &mut plugin.handle, &mut cmd);
            if outcome.is_err() || cmd.failed {
                drop(plugin);
                self.notify_all(&format!("Plugin '{name}' onLoad failed, unloading"));
                self.unload_plugin(name, true);
                return;
            }
        }

        let mut resolved = Vec::new();
        {
            let plugin = self.plugins.get_mut(name).expect("checked above");
            for callback_name in plugin.handle.cindex().to_vec() {
                let symbol_name = format!("{callback_name}\0");
                if let Ok(sym) = unsafe { library.get::<CallbackFn>(symbol_name.as_bytes()) } {
                    plugin.callback_map.insert(callback_name.clone(), *sym);
                    resolved.push(callback_name);
                }
            }
        }
        let declared = self.plugins[name].handle.cindex().to_vec();
        for missing_callback in declared.iter().filter(|c| !resolved.contains(c)) {
            self.notify_all(&format!(
                "Plugin '{name}' callback '{missing_callback}' not found, skipped"
            ));
        }

        {
            let plugin = self.plugins.get_mut(name).expect("checked above");
            plugin.callbacks = Some(Callbacks {
                on_load,
                on_unload,
                on_tick,
                on_notify,
                on_ready,
            });
        }

        for dependency in &depends {
            if let Some(dep_plugin) = self.plugins.get_mut(dependency) {
                dep_plugin.dependents.insert(name.to_string());
            }
        }

        tracing::info!(plugin = %name, callbacks = %resolved.join(","), "plugin loaded");
        self.notify_all(&format!("Plugin '{name}' loaded ({})", resolved.join(", ")));
    }

    /// Retry `initPlugin` on every plugin still pending dependency
    /// resolution. Called once per `sync` drain.
    pub(crate) fn retry_pending(&mut self) {
        let pending: Vec<String> = self
            .plugins
            .iter()
            .filter(|(_, p)| !p.is_ready())
            .map(|(name, _)| name.clone())
            .collect();
        for name in pending {
            self.init_plugin(&name);
        }
    }

    /// Close a plugin's native handle and remove it from the table.
    ///
    /// Returns `false` (and does nothing) if the plugin is unknown, or if
    /// `force` is false and other loaded plugins still depend on it.
    pub fn unload_plugin(&mut self, name: &str, force: bool) -> bool {
        let Some(plugin) = self.plugins.get(name) else {
            return false;
        };

        if !force && !plugin.dependents.is_empty() {
            return false;
        }

        for dependent in plugin.dependents.clone() {
            self.notify_all(&format!(
                "Plugin '{name}' unloading but '{dependent}' depends on it and might crash"
            ));
        }

        if let Some(on_unload) = self.plugins[name].on_unload() {
            let plugin = self.plugins.get_mut(name).expect("checked above");
            let mut cmd = CmdData::new();
            if invoke(name, "onUnload", on_unload, &mut plugin.handle, &mut cmd).is_err() {
                self.notify_all(&format!("Plugin '{name}' onUnload panicked, continuing teardown"));
            }
        }

        let depends = self.plugins[name].depends.clone();
        for dependency in &depends {
            if let Some(dep_plugin) = self.plugins.get_mut(dependency) {
                dep_plugin.dependents.shift_remove(name);
            }
        }

        self.plugins.shift_remove(name);
        tracing::info!(plugin = %name, "plugin unloaded");
        self.notify_all(&format!("Plugin '{name}' unloaded"));
        true
    }

    /// Replace a live library file with its freshly compiled `.new`
    /// sidecar: up to `config.replace_attempts` attempts, `replace_retry_delay`
    /// apart, each deleting the current file (ignoring a missing file)
    /// and renaming the sidecar over it.
    fn replace_with_sidecar(&self, sidecar: &Path, live: &Path) -> Result<(), String> {
        let attempts = self.config.replace_attempts.max(1);
        let delay = self.config.replace_retry_delay;
        let mut last_err = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                thread::sleep(delay);
            }
            if let Err(e) = fs::remove_file(live) {
                if live.exists() {
                    last_err = e.to_string();
                    continue;
                }
            }
            match fs::rename(sidecar, live) {
                Ok(()) => return Ok(()),
                Err(e) => last_err = e.to_string(),
            }
        }

        Err(last_err)
    }
}

/// Invoke a single lifecycle or user-defined callback, containing a
/// panic across the FFI boundary.
fn invoke(
    plugin_name: &str,
    callback: &'static str,
    f: CallbackFn,
    handle: &mut PluginHandle,
    cmd: &mut CmdData,
) -> Result<(), String> {
    let handle_ptr = handle as *mut PluginHandle;
    let cmd_ptr = cmd as *mut CmdData;
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        f(handle_ptr, cmd_ptr);
    }));
    result.map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "plugin callback panicked".to_string());
        let _ = (plugin_name, callback);
        message
    })
}
