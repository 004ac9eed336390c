//! Error types for the plugin host.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for plugin host operations.
pub type PluginResult<T> = Result<T, PluginHostError>;

/// Errors surfaced by the plugin host.
///
/// These map onto the error kinds in the error-handling design: most of
/// them are also turned into a notify broadcast by the caller rather than
/// propagated to the embedding host, since the host API itself is not
/// fallible at the `sync`/`notifyAll` level. `PluginHostError` exists so
/// internal code has one type to construct and match on before deciding
/// how (or whether) to surface a failure as a notify message.
#[derive(Debug, Error)]
pub enum PluginHostError {
    /// `dlopen`-equivalent failure opening a shared library.
    #[error("failed to open library {path}: {source}")]
    LibraryOpen {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// A required symbol (only `onLoad` is required) could not be resolved.
    #[error("plugin '{name}' is missing required symbol '{symbol}'")]
    MissingSymbol { name: String, symbol: &'static str },

    /// Replacing the live library with its `.new` sidecar failed.
    #[error("failed to replace library at {path} with compiled sidecar: {reason}")]
    FileReplace { path: PathBuf, reason: String },

    /// A plugin declared a dependency that will never resolve because it
    /// isn't present in the manager's plugin table by the time the load
    /// was attempted and load never reached the `depends` list.
    #[error("plugin '{name}' depends on unknown plugin '{dependency}'")]
    UnknownDependency { name: String, dependency: String },

    /// A plugin-supplied callback panicked across the FFI boundary.
    #[error("plugin '{name}' callback '{callback}' panicked: {message}")]
    CallbackPanicked {
        name: String,
        callback: &'static str,
        message: String,
    },

    /// A plugin-supplied callback set `cmd.failed`.
    #[error("plugin '{name}' callback '{callback}' reported failure")]
    CallbackFailed { name: String, callback: &'static str },

    /// The compiler subprocess used to build a source-mode plugin failed.
    #[error("compiling plugin source {path} failed: {diagnostic}")]
    CompileFailed { path: PathBuf, diagnostic: String },

    /// Attempted an operation against a plugin name not in the table.
    #[error("no such plugin '{0}'")]
    NoSuchPlugin(String),

    /// Filesystem error reading a plugin directory, filter file, or config.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
