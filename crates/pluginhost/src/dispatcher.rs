//! Broadcast and point-to-point dispatch, with crash containment around
//! every foreign call.

use crate::abi::CallbackFn;
use crate::cmd::CmdData;
use crate::manager::Manager;

/// Result of invoking a single foreign callback.
enum Invocation {
    Ok,
    Failed,
    Crashed(String),
}

impl Manager {
    /// Broadcast `msg` to every plugin's `onNotify`, in an insertion-order
    /// snapshot taken before the first call, then echo `msg` to the
    /// notify sink.
    ///
    /// A panicking `onNotify` is contained, reported, and its slot is
    /// nulled so the same plugin cannot crash again on a later broadcast;
    /// the plugin itself stays loaded.
    pub fn notify_all(&mut self, msg: &str) {
        let snapshot: Vec<String> = self.plugins.keys().cloned().collect();
        let mut reports = Vec::new();

        for name in snapshot {
            let Some(plugin) = self.plugins.get(&name) else {
                continue;
            };
            let Some(on_notify) = plugin.on_notify() else {
                continue;
            };

            match self.invoke(&name, "onNotify", on_notify, CmdData::with_param(msg)) {
                Invocation::Ok => {}
                Invocation::Failed => {
                    reports.push(format!("Plugin '{name}' callback 'onNotify' reported failure"));
                }
                Invocation::Crashed(message) => {
                    // Null the slot before the loop moves on so a
                    // self-crashing onNotify is never re-entered by a
                    // later broadcast, including the report below.
                    if let Some(p) = self.plugins.get_mut(&name) {
                        p.clear_on_notify();
                    }
                    reports.push(format!("Plugin '{name}' callback 'onNotify' panicked: {message}"));
                }
            }
        }

        (self.notify_sink)(msg);

        for report in reports {
            self.report(&report);
        }
    }

    /// Invoked once, the first time the monitor reaches its ready state:
    /// calls every plugin's `onReady` over an insertion-order snapshot.
    ///
    /// Like `onNotify`, a crashing `onReady` has its slot nulled rather
    /// than unloading the plugin.
    pub fn ready_all(&mut self) {
        let snapshot: Vec<String> = self.plugins.keys().cloned().collect();
        let mut reports = Vec::new();

        for name in snapshot {
            let Some(plugin) = self.plugins.get(&name) else {
                continue;
            };
            let Some(on_ready) = plugin.on_ready() else {
                continue;
            };

            match self.invoke(&name, "onReady", on_ready, CmdData::new()) {
                Invocation::Ok => {}
                Invocation::Failed => {
                    reports.push(format!("Plugin '{name}' callback 'onReady' reported failure"));
                }
                Invocation::Crashed(message) => {
                    if let Some(p) = self.plugins.get_mut(&name) {
                        p.clear_on_ready();
                    }
                    reports.push(format!("Plugin '{name}' callback 'onReady' panicked: {message}"));
                }
            }
        }

        for report in reports {
            self.report(&report);
        }
    }

    /// Called once per `sync`: calls every plugin's `onTick` over an
    /// insertion-order snapshot. A plugin whose `onTick` crashes is
    /// unloaded; one that merely reports failure stays loaded.
    pub fn tick_all(&mut self) {
        let snapshot: Vec<String> = self.plugins.keys().cloned().collect();
        let mut reports = Vec::new();
        let mut crashed_plugins = Vec::new();

        for name in snapshot {
            let Some(plugin) = self.plugins.get(&name) else {
                continue;
            };
            let Some(on_tick) = plugin.on_tick() else {
                continue;
            };

            match self.invoke(&name, "onTick", on_tick, CmdData::new()) {
                Invocation::Ok => {}
                Invocation::Failed => {
                    reports.push(format!("Plugin '{name}' callback 'onTick' reported failure"));
                }
                Invocation::Crashed(message) => {
                    reports.push(format!("Plugin '{name}' callback 'onTick' panicked: {message}"));
                    crashed_plugins.push(name);
                }
            }
        }

        for report in reports {
            self.report(&report);
        }
        for name in crashed_plugins {
            self.unload_plugin(&name, true);
        }
    }

    /// Find the first plugin, in insertion order, whose declared
    /// callback index contains `name`, and invoke it. A no-op (with
    /// `cmd.failed = true`) if no plugin claims the name.
    pub fn call(&mut self, name: &str, cmd: &mut CmdData) {
        let owner = self
            .plugins
            .iter()
            .find(|(_, p)| p.declared_callbacks().iter().any(|c| c == name))
            .map(|(plugin_name, _)| plugin_name.clone());

        let Some(plugin_name) = owner else {
            cmd.failed = true;
            return;
        };

        self.call_plugin(&plugin_name, name, cmd);
    }

    /// Route a raw `CmdData` through the command router: `cmd.params`
    /// joined with spaces is the command line, and the router's own
    /// output (return values, `failed`) ends up back on the same `cmd`.
    pub fn call_command(&mut self, cmd: &mut CmdData) {
        let line = cmd.params.join(" ");
        self.handle_command(&line, cmd);
    }

    /// Directly invoke `callback_name` on `plugin_name`. A true no-op,
    /// `cmd` untouched, if either the plugin or the named callback is
    /// absent — unlike [`Manager::call`], which fails `cmd` on a miss.
    pub fn call_plugin(&mut self, plugin_name: &str, callback_name: &str, cmd: &mut CmdData) {
        let Some(plugin) = self.plugins.get(plugin_name) else {
            return;
        };
        let Some(callback) = plugin.callback(callback_name) else {
            return;
        };

        match self.invoke_into(plugin_name, "<user>", callback, cmd) {
            Invocation::Ok => {}
            Invocation::Failed => {
                self.report(&format!(
                    "Plugin '{plugin_name}' callback '{callback_name}' reported failure"
                ));
            }
            Invocation::Crashed(message) => {
                self.report(&format!(
                    "Plugin '{plugin_name}' callback '{callback_name}' panicked: {message}"
                ));
                self.unload_plugin(plugin_name, true);
            }
        }
    }

    /// Broadcast an internally-generated error/status message through
    /// [`Manager::notify_all`], the same single channel every operational
    /// message uses — except once a report is itself already being
    /// broadcast as the result of an earlier report. That guard exists
    /// only to bound pathological cases (a plugin whose `onNotify` always
    /// sets `cmd.failed`, for instance, would otherwise recurse forever);
    /// it never fires for an ordinary single crash or failure.
    fn report(&mut self, msg: &str) {
        if self.report_depth > 0 {
            tracing::warn!(%msg, "nested error report suppressed from re-broadcast");
            (self.notify_sink)(msg);
            return;
        }
        self.report_depth += 1;
        self.notify_all(msg);
        self.report_depth -= 1;
    }

    /// Invoke `callback` on `plugin_name`'s handle with a fresh
    /// `CmdData` carrying `params`, wrapped in crash containment.
    fn invoke(&mut self, plugin_name: &str, callback: &'static str, f: CallbackFn, mut cmd: CmdData) -> Invocation {
        self.invoke_into(plugin_name, callback, f, &mut cmd)
    }

    fn invoke_into(
        &mut self,
        plugin_name: &str,
        callback: &'static str,
        f: CallbackFn,
        cmd: &mut CmdData,
    ) -> Invocation {
        let Some(plugin) = self.plugins.get_mut(plugin_name) else {
            return Invocation::Ok;
        };
        let handle_ptr = &mut *plugin.handle as *mut crate::abi::PluginHandle;
        let cmd_ptr = cmd as *mut CmdData;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            f(handle_ptr, cmd_ptr);
        }));

        match result {
            Ok(()) if cmd.failed => Invocation::Failed,
            Ok(()) => Invocation::Ok,
            Err(payload) => {
                let message = panic_message(payload);
                tracing::error!(plugin = %plugin_name, callback, %message, "plugin callback panicked");
                Invocation::Crashed(message)
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "plugin callback panicked".to_string())
}
