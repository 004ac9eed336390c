//! `CmdData`: the parameter/return envelope for a single callback invocation.

use std::ffi::c_void;

/// Call envelope passed across the plugin ABI boundary.
///
/// Created by the caller before each dispatch, mutated by the callee, and
/// consumed by the caller after the call returns. A `CmdData` is never
/// shared across threads: every dispatch in this crate runs on the host
/// thread, and the raw pointer fields make that a structural guarantee
/// rather than just a convention (`CmdData` is neither `Send` nor `Sync`).
#[derive(Debug, Default)]
pub struct CmdData {
    /// Ordered string parameters supplied by the caller.
    pub params: Vec<String>,
    /// Ordered opaque pointer parameters supplied by the caller.
    pub ptr_params: Vec<*mut c_void>,
    /// Set by the callee to signal the call did not succeed.
    pub failed: bool,
    /// Ordered string return values set by the callee.
    pub returned: Vec<String>,
    /// Ordered opaque pointer return values set by the callee.
    pub ptr_returned: Vec<*mut c_void>,
}

impl CmdData {
    /// Create an empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an envelope with a single string parameter.
    ///
    /// This is the common case: most lifecycle dispatches (`notify`,
    /// `call`) only ever pass one string in.
    pub fn with_param(param: impl Into<String>) -> Self {
        Self {
            params: vec![param.into()],
            ..Self::default()
        }
    }

    /// Create an envelope from an ordered list of string parameters.
    pub fn with_params(params: Vec<String>) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// First string parameter, if any.
    pub fn first_param(&self) -> Option<&str> {
        self.params.first().map(String::as_str)
    }

    /// First string return value, if any.
    pub fn first_returned(&self) -> Option<&str> {
        self.returned.first().map(String::as_str)
    }
}

// `CmdData` carries raw pointers but is only ever touched from the host
// thread while a single dispatch is in flight; it is intentionally not
// `Send`/`Sync` and the auto traits correctly reflect that already via the
// `*mut c_void` fields, so no explicit unsafe impl is required or wanted.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_param_sets_single_entry() {
        let cmd = CmdData::with_param("hello");
        assert_eq!(cmd.first_param(), Some("hello"));
        assert!(!cmd.failed);
        assert!(cmd.returned.is_empty());
    }

    #[test]
    fn default_is_empty_and_not_failed() {
        let cmd = CmdData::new();
        assert!(cmd.params.is_empty());
        assert!(!cmd.failed);
    }
}
