//! Tracking and terminating the subprocesses spawned on behalf of candidate
//! jobs.
//!
//! The interestingness test is free to spawn arbitrary descendants, and some
//! passes shell out to external tools. All of those processes have to die
//! when a candidate is cancelled or times out, so every subprocess invocation
//! is wrapped in a `ProcessEventNotifier` that publishes the child's pid on a
//! shared queue right after `spawn` and again after `wait`. The engine drains
//! that queue after each parallel batch and force-kills whatever is still
//! alive, walking the whole process tree because interestingness tests are
//! usually shell scripts.

use std::fs;
use std::io::{self, Read};
use std::path;
use std::process;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time;

/// Whether a process just started or just finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessEventKind {
    /// The process was spawned and has the contained pid.
    Started,
    /// The process was waited upon and is gone.
    Finished,
}

/// A start/finish notification for one subprocess.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessEvent {
    /// The subprocess's pid.
    pub pid: u32,
    /// Did it start or finish?
    pub kind: ProcessEventKind,
}

impl ProcessEvent {
    /// Construct a `Started` event for the given pid.
    pub fn started(pid: u32) -> ProcessEvent {
        ProcessEvent {
            pid: pid,
            kind: ProcessEventKind::Started,
        }
    }

    /// Construct a `Finished` event for the given pid.
    pub fn finished(pid: u32) -> ProcessEvent {
        ProcessEvent {
            pid: pid,
            kind: ProcessEventKind::Finished,
        }
    }
}

/// The result of running a subprocess to completion (or not).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited on its own.
    Finished {
        /// Everything the process wrote to stdout.
        stdout: String,
        /// Everything the process wrote to stderr.
        stderr: String,
        /// The exit code; negated signal number if killed by a signal.
        code: i32,
    },

    /// The process blew through its wall-clock deadline and was killed along
    /// with its descendants.
    TimedOut,

    /// The engine requested cancellation while the process was running; it
    /// was killed along with its descendants.
    Cancelled,
}

/// A handle that candidate jobs use to run subprocesses.
///
/// Cloned into every worker. The sender half publishes pid events for the
/// engine's kill sweep; the stop flag makes in-flight subprocess waits abort
/// early when the engine cancels the batch.
#[derive(Clone, Debug)]
pub struct ProcessEventNotifier {
    sender: Option<mpsc::Sender<ProcessEvent>>,
    stop: Option<Arc<AtomicBool>>,
}

/// How often we poll a child process for exit, cancellation, or deadline.
const POLL_INTERVAL_MS: u64 = 10;

impl ProcessEventNotifier {
    /// Construct a notifier that publishes on the given queue and honors the
    /// given cancellation flag.
    pub fn new(
        sender: mpsc::Sender<ProcessEvent>,
        stop: Option<Arc<AtomicBool>>,
    ) -> ProcessEventNotifier {
        ProcessEventNotifier {
            sender: Some(sender),
            stop: stop,
        }
    }

    /// Construct a notifier that publishes nowhere. Only useful for driving a
    /// pass outside the engine, e.g. in tests.
    pub fn none() -> ProcessEventNotifier {
        ProcessEventNotifier {
            sender: None,
            stop: None,
        }
    }

    fn publish(&self, event: ProcessEvent) {
        if let Some(ref sender) = self.sender {
            // The engine may already have torn the queue down during
            // shutdown; nothing useful to do about a failed send.
            let _ = sender.send(event);
        }
    }

    fn stopped(&self) -> bool {
        self.stop
            .as_ref()
            .map_or(false, |s| s.load(Ordering::SeqCst))
    }

    /// Spawn `cmd` and wait for it, publishing start/finish events around the
    /// child's lifetime.
    ///
    /// If `deadline` passes before the child exits, or the engine flips the
    /// cancellation flag, the child's whole process tree is killed and
    /// `TimedOut`/`Cancelled` is returned instead of the captured output.
    pub fn run_process(
        &self,
        mut cmd: process::Command,
        deadline: Option<time::Instant>,
    ) -> io::Result<RunOutcome> {
        cmd.stdin(process::Stdio::null())
            .stdout(process::Stdio::piped())
            .stderr(process::Stdio::piped());

        let mut child = cmd.spawn()?;
        let pid = child.id();
        self.publish(ProcessEvent::started(pid));

        // Drain the pipes on their own threads so a chatty child cannot
        // deadlock against our exit polling.
        let stdout_reader = slurp_pipe(child.stdout.take());
        let stderr_reader = slurp_pipe(child.stderr.take());

        let mut aborted = None;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break Some(status),
                None => {}
            }

            if self.stopped() {
                aborted = Some(RunOutcome::Cancelled);
            } else if deadline.map_or(false, |d| time::Instant::now() >= d) {
                aborted = Some(RunOutcome::TimedOut);
            }

            if aborted.is_some() {
                kill_process_tree(pid);
                // Reap the child so we do not leak a zombie.
                let _ = child.wait();
                break None;
            }

            thread::sleep(time::Duration::from_millis(POLL_INTERVAL_MS));
        };

        self.publish(ProcessEvent::finished(pid));

        let stdout = stdout_reader.join().unwrap_or_else(|_| String::new());
        let stderr = stderr_reader.join().unwrap_or_else(|_| String::new());

        match aborted {
            Some(outcome) => Ok(outcome),
            None => {
                let status = status.expect("exited normally, so the status must be present");
                Ok(RunOutcome::Finished {
                    stdout: stdout,
                    stderr: stderr,
                    code: exit_code(&status),
                })
            }
        }
    }
}

fn slurp_pipe<R>(pipe: Option<R>) -> thread::JoinHandle<String>
where
    R: 'static + Read + Send,
{
    thread::spawn(move || {
        let mut contents = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut contents);
        }
        String::from_utf8_lossy(&contents).into_owned()
    })
}

#[cfg(unix)]
fn exit_code(status: &process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(1))
}

#[cfg(not(unix))]
fn exit_code(status: &process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Forcefully terminate the process with the given pid and every transitive
/// descendant it has.
///
/// The whole tree is snapshotted up front and killed in one sweep, root
/// last. Processes that are already gone are ignored; pids race with
/// process exit by nature and there is nothing better to do.
pub fn kill_process_tree(pid: u32) {
    let mut victims = descendants(pid);
    victims.push(pid);
    for victim in victims {
        kill(victim);
    }
}

/// Resolve the transitive descendants of `pid`, deepest last.
#[cfg(all(unix, target_os = "linux"))]
fn descendants(pid: u32) -> Vec<u32> {
    // Snapshot the parent links of every live process.
    let mut children: Vec<(u32, u32)> = Vec::new();
    if let Ok(entries) = fs::read_dir("/proc") {
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let candidate = match name.to_str().and_then(|n| n.parse::<u32>().ok()) {
                Some(p) => p,
                None => continue,
            };
            if let Some(ppid) = parent_of(candidate) {
                children.push((ppid, candidate));
            }
        }
    }

    // Breadth-first walk down from `pid`.
    let mut result = Vec::new();
    let mut frontier = vec![pid];
    while let Some(parent) = frontier.pop() {
        for &(ppid, child) in &children {
            if ppid == parent && !result.contains(&child) {
                result.push(child);
                frontier.push(child);
            }
        }
    }
    result
}

#[cfg(not(all(unix, target_os = "linux")))]
fn descendants(_pid: u32) -> Vec<u32> {
    Vec::new()
}

/// Read the parent pid out of `/proc/<pid>/stat`.
///
/// The second field (the command name) is an arbitrary string wrapped in
/// parentheses, so parse from the last closing paren.
#[cfg(all(unix, target_os = "linux"))]
fn parent_of(pid: u32) -> Option<u32> {
    let stat = {
        let mut contents = String::new();
        let path = path::PathBuf::from(format!("/proc/{}/stat", pid));
        let mut file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(_) => return None,
        };
        if file.read_to_string(&mut contents).is_err() {
            return None;
        }
        contents
    };

    let after_comm = match stat.rfind(')') {
        Some(i) => &stat[i + 1..],
        None => return None,
    };
    after_comm.split_whitespace().nth(1).and_then(
        |ppid| ppid.parse().ok(),
    )
}

#[cfg(unix)]
fn kill(pid: u32) {
    unsafe {
        ::libc::kill(pid as ::libc::pid_t, ::libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill(_pid: u32) {}
