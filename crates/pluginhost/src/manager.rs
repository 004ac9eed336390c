//! The `Manager`: the single host-side aggregate.

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::cmd::CmdData;
use crate::config::PluginHostConfig;
use crate::monitor::{Monitor, RunState};
use crate::plugin::Plugin;
use crate::registry::OpaqueRegistry;

/// The plugin host's single aggregate: owns the plugin table, the
/// monitor, the run-state, and the tick counter.
///
/// Exposes exactly three operations to the embedding host: [`Manager::init`],
/// [`Manager::sync`] (call once per host-loop iteration), and
/// [`Manager::stop`]. Every other public method (`notify_all`, `call`,
/// `plugin_names`, ...) exists so a host can also drive individual pieces
/// directly instead of only going through the three-operation surface or
/// the textual command router.
pub struct Manager {
    pub(crate) plugins: IndexMap<String, Plugin>,
    pub(crate) monitor: Monitor,
    pub(crate) run_state: RunState,
    pub(crate) ready: bool,
    pub(crate) tick: u64,
    pub(crate) queued_commands: Vec<String>,
    pub(crate) shared_data: OpaqueRegistry,
    pub(crate) config: PluginHostConfig,
    pub(crate) notify_sink: Box<dyn FnMut(&str) + Send>,
    /// Re-entrancy guard around [`Manager::report`]: bounds recursive
    /// notify broadcasts triggered by reporting a crash/failure from
    /// inside another broadcast.
    pub(crate) report_depth: u32,
}

impl Manager {
    /// Allocate the manager, seed the monitor with `config.paths`, and
    /// start the monitor thread. `initial_commands` are queued and run
    /// through the command router the first time the monitor reports
    /// ready.
    pub fn init(config: PluginHostConfig, initial_commands: Vec<String>) -> Self {
        tracing::info!(paths = ?config.paths, mode = ?config.mode, "starting plugin host");
        let monitor = Monitor::start(config.clone());
        Self {
            plugins: IndexMap::new(),
            monitor,
            run_state: RunState::Executing,
            ready: false,
            tick: 0,
            queued_commands: initial_commands,
            shared_data: OpaqueRegistry::new(),
            config,
            notify_sink: Box::new(|msg: &str| println!("{msg}")),
            report_depth: 0,
        }
    }

    /// Replace the sink that `notify_all` echoes messages to after
    /// fan-out. Defaults to printing to standard output.
    pub fn set_notify_sink(&mut self, sink: Box<dyn FnMut(&str) + Send>) {
        self.notify_sink = sink;
    }

    /// Current run-state (`Executing`, `Paused`, `Stopped`). Set by the
    /// `quit`/`exit` commands; the host's own loop is responsible for
    /// observing it and stopping.
    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Insertion-ordered list of currently loaded plugin names.
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    /// Whether a plugin is present in the table (ready or still pending
    /// on dependencies).
    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// The manager-scoped opaque data registry.
    pub fn shared_data(&mut self) -> &mut OpaqueRegistry {
        &mut self.shared_data
    }

    /// One host-loop iteration's worth of work:
    ///
    /// 1. increment the tick counter;
    /// 2. every `config.sync_gate_ticks` ticks, or while not yet ready,
    ///    drain the monitor's load-queue and retry `initPlugin` on any
    ///    half-initialized plugins;
    /// 3. on the first transition to ready, run `readyAll` and flush the
    ///    queued initial commands through the command router;
    /// 4. call `tickAll`.
    pub fn sync(&mut self) {
        self.tick += 1;

        let gate_due = self.config.sync_gate_ticks != 0 && self.tick % self.config.sync_gate_ticks == 0;
        if gate_due || !self.ready {
            for entry in self.monitor.drain_queue() {
                let path = PathBuf::from(&entry);
                if path.exists() {
                    self.load_plugin(&path);
                } else {
                    self.notify_all(&entry);
                }
            }
            self.retry_pending();
        }

        if !self.ready && self.monitor.is_ready() {
            self.ready = true;
            self.ready_all();
            let commands = std::mem::take(&mut self.queued_commands);
            for command in commands {
                let mut cmd = CmdData::new();
                self.handle_command(&command, &mut cmd);
            }
        }

        self.tick_all();
    }

    /// Tear the manager down: stop the monitor, drain the plugin table
    /// (leaves first, forcing a final pass if dependency cycles remain),
    /// and join the monitor thread.
    pub fn stop(&mut self) {
        tracing::info!("stopping plugin host");
        self.monitor.request_stop();

        loop {
            let names: Vec<String> = self.plugins.keys().cloned().collect();
            if names.is_empty() {
                break;
            }

            let mut progressed = false;
            for name in &names {
                if self.unload_plugin(name, false) {
                    progressed = true;
                }
            }

            if !progressed {
                for name in &names {
                    self.unload_plugin(name, true);
                }
                break;
            }
        }

        self.monitor.join();
    }
}
