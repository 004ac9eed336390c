//! A native plugin host: discovers source or binary plugin modules on
//! disk, optionally recompiles them, loads them as shared libraries,
//! dispatches lifecycle and user-defined callbacks, and unloads them
//! cleanly.
//!
//! The embedding host only ever touches [`Manager`]: [`Manager::init`]
//! once, [`Manager::sync`] once per host-loop iteration, and
//! [`Manager::stop`] on shutdown. Everything else — the background
//! monitor, dependency-ordered loader, crash-contained dispatcher, and
//! textual router — is reached through `Manager`'s own methods rather
//! than constructed directly.
//!
//! A plugin is an ordinary cdylib crate that depends on this crate and
//! exports `#[no_mangle] extern "C"` functions under the names in
//! [`abi`]. See [`abi::PluginHandle`] for what a plugin is allowed to do
//! with the handle it's passed.

mod abi;
mod cmd;
mod config;
mod dispatcher;
mod error;
mod loader;
mod logging;
mod manager;
mod monitor;
mod naming;
mod plugin;
mod registry;
mod router;

pub use abi::{CallbackFn, PluginHandle};
pub use cmd::CmdData;
pub use config::{MonitorMode, PluginHostConfig};
pub use error::{PluginHostError, PluginResult};
pub use logging::init_logging;
pub use manager::Manager;
pub use monitor::RunState;
pub use plugin::Plugin;
pub use registry::OpaqueRegistry;
pub use router::VERSION;
