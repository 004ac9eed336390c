//! Command router: parses textual commands and maps reserved verbs onto
//! manager operations, falling back to `call` for everything else.

use crate::cmd::CmdData;
use crate::manager::Manager;
use crate::monitor::RunState;

/// Build identifier embedded in `getVersion`/`getVersionBanner`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Toolchain tag embedded in `getVersionBanner`. There's no build script
/// here to stamp an exact compiler version, so this names the ABI
/// family instead of a specific `rustc` release.
const TOOLCHAIN_TAG: &str = "rustc-stable-cdylib-abi";

impl Manager {
    /// Parse and execute a single textual command line.
    ///
    /// The first whitespace-delimited token is matched case-sensitively
    /// against the reserved verb table; anything else is forwarded to
    /// [`Manager::call`] with that token stripped from the parameters. An
    /// empty command line fails immediately.
    pub fn handle_command(&mut self, line: &str, cmd: &mut CmdData) {
        let mut tokens = line.split_whitespace();
        let Some(verb) = tokens.next() else {
            cmd.failed = true;
            return;
        };
        let rest: Vec<&str> = tokens.collect();

        match verb {
            "quit" | "exit" => {
                self.run_state = RunState::Stopped;
            }
            "notify" => {
                self.notify_all(&rest.join(" "));
            }
            "getVersion" => {
                cmd.returned.push(VERSION.to_string());
            }
            "getVersionBanner" => {
                cmd.returned.push(format!(
                    "pluginhost {VERSION} ({} {TOOLCHAIN_TAG})",
                    env!("CARGO_PKG_NAME")
                ));
            }
            "plist" => {
                cmd.returned = self.plugin_names();
            }
            "pload" | "preload" => {
                if rest.is_empty() {
                    self.monitor.clear_processed();
                } else {
                    for name in rest {
                        self.monitor.mark_unprocessed(name);
                    }
                }
            }
            "punload" => {
                if rest.is_empty() {
                    let names = self.plugin_names();
                    for name in names {
                        self.unload_plugin(&name, true);
                    }
                } else {
                    for name in rest {
                        if !self.has_plugin(name) {
                            self.notify_all(&format!("punload: no such plugin '{name}'"));
                            continue;
                        }
                        self.unload_plugin(name, true);
                    }
                }
            }
            "ppause" => self.monitor.pause(),
            "presume" => self.monitor.resume(),
            "pstop" => self.monitor.request_stop(),
            other => {
                cmd.params = rest.into_iter().map(str::to_string).collect();
                self.call(other, cmd);
            }
        }
    }
}
