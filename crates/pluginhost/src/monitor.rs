//! Background filesystem/compile monitor.
//!
//! Runs on its own thread, communicating with the host thread through a
//! single mutex-guarded [`MonitorState`]. The lock is held only for short
//! bookkeeping; directory enumeration and the compiler subprocess always
//! run against an unlocked snapshot, with results staged locally before
//! being published back under the lock.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{MonitorMode, PluginHostConfig};
use crate::naming::{self, SOURCE_EXTENSION};

/// Run state shared by the manager and the monitor. The manager uses one
/// instance for its own `quit`/`exit` handling; the monitor carries an
/// independent one, toggled by `ppause`/`presume`/`pstop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Executing,
    Paused,
    Stopped,
}

/// The monitor's shared record. Every field is accessed only while
/// holding the owning [`Monitor`]'s mutex.
struct MonitorState {
    paths: Vec<PathBuf>,
    mode: MonitorMode,
    processed: HashSet<String>,
    /// Entries the host thread hasn't drained yet. Each entry is either an
    /// existing file path to load, or (if no such file exists) a message
    /// to surface as a notify/error.
    queue: Vec<String>,
    run_state: RunState,
    ready: bool,
    poll_delay: Duration,
}

/// Handle to the running monitor thread and its shared state.
pub struct Monitor {
    shared: Arc<Mutex<MonitorState>>,
    worker: Option<JoinHandle<()>>,
    config: PluginHostConfig,
}

impl Monitor {
    /// Spawn the monitor thread watching `config.paths`.
    pub fn start(config: PluginHostConfig) -> Self {
        let shared = Arc::new(Mutex::new(MonitorState {
            paths: config.paths.clone(),
            mode: config.mode,
            processed: HashSet::new(),
            queue: Vec::new(),
            run_state: RunState::Executing,
            ready: false,
            poll_delay: config.poll_delay_before_ready,
        }));

        let worker_shared = Arc::clone(&shared);
        let worker_config = config.clone();
        let worker = thread::Builder::new()
            .name("pluginhost-monitor".to_string())
            .spawn(move || run_loop(worker_shared, worker_config))
            .expect("failed to spawn plugin host monitor thread");

        Self {
            shared,
            worker: Some(worker),
            config,
        }
    }

    /// Set the monitor's run-state to `Paused`.
    pub fn pause(&self) {
        self.shared.lock().unwrap().run_state = RunState::Paused;
    }

    /// Set the monitor's run-state back to `Executing`.
    pub fn resume(&self) {
        self.shared.lock().unwrap().run_state = RunState::Executing;
    }

    /// Set the monitor's run-state to `Stopped`. The thread exits at its
    /// next wake; call [`Monitor::join`] afterward to wait for it.
    pub fn request_stop(&self) {
        self.shared.lock().unwrap().run_state = RunState::Stopped;
    }

    /// Join the worker thread. Blocks until the thread observes `Stopped`.
    pub fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    /// Whether every candidate in the current scan cycle has been handled
    /// at least once.
    pub fn is_ready(&self) -> bool {
        self.shared.lock().unwrap().ready
    }

    /// Drain the load-queue non-blockingly.
    pub fn drain_queue(&self) -> Vec<String> {
        let mut state = self.shared.lock().unwrap();
        std::mem::take(&mut state.queue)
    }

    /// Mark a single plugin name as un-processed so the monitor re-picks
    /// it on its next cycle (`pload <name>`).
    pub fn mark_unprocessed(&self, name: &str) {
        self.shared.lock().unwrap().processed.remove(name);
    }

    /// Clear the entire processed set (`pload`/`preload` with no names).
    pub fn clear_processed(&self) {
        let mut state = self.shared.lock().unwrap();
        state.processed.clear();
        state.ready = false;
        state.poll_delay = self.config.poll_delay_before_ready;
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.request_stop();
        self.join();
    }
}

fn run_loop(shared: Arc<Mutex<MonitorState>>, config: PluginHostConfig) {
    loop {
        let delay = shared.lock().unwrap().poll_delay;
        thread::sleep(delay);

        let (paths, mode, run_state) = {
            let state = shared.lock().unwrap();
            (state.paths.clone(), state.mode, state.run_state)
        };

        match run_state {
            RunState::Stopped => return,
            RunState::Paused => continue,
            RunState::Executing => {}
        }

        let already_processed = { shared.lock().unwrap().processed.clone() };

        let candidates = scan_candidates(&paths, mode);
        let allowed = read_filter_list(&config.allow_file);
        let blocked = read_filter_list(&config.block_file);

        let mut newly_processed = Vec::new();
        let mut queue_additions = Vec::new();

        for candidate in &candidates {
            let name = naming::derive_plugin_name(candidate);
            if already_processed.contains(&name) {
                continue;
            }

            if !passes_filters(&name, &allowed, &blocked) {
                newly_processed.push(name);
                continue;
            }

            match mode {
                MonitorMode::Binary => {
                    newly_processed.push(name);
                    queue_additions.push(candidate.display().to_string());
                }
                MonitorMode::Source => {
                    let lib_path = source_library_path(candidate);
                    if needs_compile(candidate, &lib_path) {
                        let sidecar = naming::sidecar_path(&lib_path);
                        match compile_source(candidate, &sidecar) {
                            Ok(()) => {
                                newly_processed.push(name);
                                queue_additions.push(sidecar.display().to_string());
                            }
                            Err(diagnostic) => {
                                tracing::warn!(source = %candidate.display(), %diagnostic, "plugin compile failed");
                                newly_processed.push(name);
                                queue_additions.push(diagnostic);
                            }
                        }
                    } else {
                        newly_processed.push(name);
                        queue_additions.push(lib_path.display().to_string());
                    }
                }
            }
        }

        let mut state = shared.lock().unwrap();
        for name in newly_processed {
            state.processed.insert(name);
        }
        state.queue.extend(queue_additions);

        if !state.ready && state.processed.len() >= candidates.len() {
            state.ready = true;
            state.poll_delay = config.poll_delay_after_ready;
        }
    }
}

/// Enumerate candidate files across all watched paths, sorted
/// lexicographically so ordering is reproducible.
fn scan_candidates(paths: &[PathBuf], mode: MonitorMode) -> Vec<PathBuf> {
    let wanted_ext = match mode {
        MonitorMode::Binary => naming::LIBRARY_EXTENSION,
        MonitorMode::Source => SOURCE_EXTENSION,
    };

    let mut found = Vec::new();
    for dir in paths {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(wanted_ext) {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

/// Parse a newline-delimited filter file: one name per line, blank lines
/// and `#`-prefixed lines ignored. Missing file => no constraint.
fn read_filter_list(path: &Path) -> HashSet<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn passes_filters(name: &str, allowed: &HashSet<String>, blocked: &HashSet<String>) -> bool {
    if !allowed.is_empty() && !allowed.contains(name) {
        return false;
    }
    !blocked.contains(name)
}

fn source_library_path(source: &Path) -> PathBuf {
    let name = naming::derive_plugin_name(source);
    source
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(naming::library_filename(&name))
}

/// Whether a source-mode plugin needs (re)compilation: the library is
/// missing, the source is newer than it, or a sibling fragment directory
/// with the same stem holds sources newer than it.
fn needs_compile(source: &Path, lib_path: &Path) -> bool {
    let Ok(lib_meta) = fs::metadata(lib_path) else {
        return true;
    };
    let Ok(lib_modified) = lib_meta.modified() else {
        return true;
    };

    if let Ok(src_meta) = fs::metadata(source) {
        if let Ok(src_modified) = src_meta.modified() {
            if src_modified > lib_modified {
                return true;
            }
        }
    }

    let stem = naming::derive_plugin_name(source);
    let sibling = source.parent().unwrap_or_else(|| Path::new(".")).join(stem);
    if sibling.is_dir() {
        if let Ok(entries) = fs::read_dir(&sibling) {
            for entry in entries.flatten() {
                if let Ok(meta) = entry.metadata() {
                    if let Ok(modified) = meta.modified() {
                        if modified > lib_modified {
                            return true;
                        }
                    }
                }
            }
        }
    }

    false
}

/// Compile `source` into a cdylib at `sidecar`, returning the compiler's
/// diagnostic text on failure.
fn compile_source(source: &Path, sidecar: &Path) -> Result<(), String> {
    let output = Command::new("rustc")
        .arg("--crate-type")
        .arg("cdylib")
        .arg("-O")
        .arg("-o")
        .arg(sidecar)
        .arg(source)
        .output();

    match output {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(format!(
            "compiling {} failed: {}",
            source.display(),
            String::from_utf8_lossy(&output.stderr)
        )),
        Err(e) => Err(format!(
            "failed to invoke compiler for {}: {e}",
            source.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn scan_candidates_sorted_and_filtered_by_extension() {
        let dir = tempdir().unwrap();
        for f in ["b.so", "a.so", "ignore.txt"] {
            std::fs::File::create(dir.path().join(f)).unwrap();
        }
        let found = scan_candidates(&[dir.path().to_path_buf()], MonitorMode::Binary);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.so".to_string(), "b.so".to_string()]);
    }

    #[test]
    fn filter_list_ignores_blank_and_comment_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("allow.ini");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "plg1").unwrap();
        writeln!(file, "plg2").unwrap();

        let list = read_filter_list(&path);
        assert_eq!(list.len(), 2);
        assert!(list.contains("plg1"));
        assert!(list.contains("plg2"));
    }

    #[test]
    fn missing_filter_file_means_no_constraint() {
        let list = read_filter_list(Path::new("/nonexistent/allow.ini"));
        assert!(list.is_empty());
        assert!(passes_filters("anything", &list, &HashSet::new()));
    }

    #[test]
    fn block_list_rejects_even_without_allow_list() {
        let mut blocked = HashSet::new();
        blocked.insert("plg1".to_string());
        assert!(!passes_filters("plg1", &HashSet::new(), &blocked));
        assert!(passes_filters("plg2", &HashSet::new(), &blocked));
    }

    #[test]
    fn needs_compile_true_when_library_missing() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("plg1.rs");
        std::fs::File::create(&source).unwrap();
        let lib = dir.path().join(naming::library_filename("plg1"));
        assert!(needs_compile(&source, &lib));
    }

    #[test]
    fn monitor_pause_prevents_queue_growth() {
        let dir = tempdir().unwrap();
        std::fs::File::create(dir.path().join(naming::library_filename("plg1"))).unwrap();

        let config = PluginHostConfig {
            paths: vec![dir.path().to_path_buf()],
            mode: MonitorMode::Binary,
            poll_delay_before_ready: Duration::from_millis(5),
            poll_delay_after_ready: Duration::from_millis(5),
            allow_file: dir.path().join("allow.ini"),
            block_file: dir.path().join("block.ini"),
            ..Default::default()
        };

        let mut monitor = Monitor::start(config);
        monitor.pause();
        thread::sleep(Duration::from_millis(50));
        assert!(monitor.drain_queue().is_empty());

        monitor.resume();
        thread::sleep(Duration::from_millis(50));
        let queue = monitor.drain_queue();
        assert_eq!(queue.len(), 1);

        monitor.request_stop();
        monitor.join();
    }
}
