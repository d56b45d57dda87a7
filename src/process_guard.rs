//! Cleanup of live ssh sessions
//!
//! Every remote command runs as a local `ssh` child. If the driver is
//! interrupted while `ansible-playbook` is running on the installer node,
//! the ssh child must not outlive it: an orphaned session keeps the playbook
//! going against a cluster nobody is watching.
//!
//! Sessions are spawned as process-group leaders that die with the driver.
//! While a command runs, a [`LiveSession`] handle keeps its node and command
//! line in the [`SessionRegistry`], so an interrupt can report exactly which
//! remote work it cut short.

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;

/// How long interrupted sessions get to exit before they are killed
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

static SESSIONS: OnceLock<Mutex<SessionRegistry>> = OnceLock::new();

/// One ssh child running a remote command
#[derive(Debug, Clone)]
pub struct Session {
    /// Pid of the ssh child, which is also its process group id
    pub pgid: u32,
    pub node: String,
    pub command: String,
    pub started: Instant,
}

impl Session {
    fn group(&self) -> Pid {
        Pid::from_raw(self.pgid as i32)
    }

    /// Whether anything in the session's process group is still running
    fn is_running(&self) -> bool {
        !matches!(killpg(self.group(), None), Err(Errno::ESRCH))
    }

    fn signal(&self, signal: Signal) {
        match killpg(self.group(), signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => log::warn!("Failed to send {} to session on {}: {}", signal, self.node, e),
        }
    }
}

/// Sessions currently open, keyed by the order they were opened in
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<u64, Session>,
    next_id: u64,
    shutting_down: bool,
}

impl SessionRegistry {
    /// The registry shared by every [`LiveSession`] in the process
    pub fn global() -> &'static Mutex<SessionRegistry> {
        SESSIONS.get_or_init(|| Mutex::new(SessionRegistry::default()))
    }

    /// Record a session and return its key.
    ///
    /// Once shutdown has begun, new sessions are killed straight away and
    /// not recorded.
    pub fn open(&mut self, pgid: u32, node: &str, command: &str) -> Option<u64> {
        let session = Session {
            pgid,
            node: node.to_string(),
            command: command.to_string(),
            started: Instant::now(),
        };
        if self.shutting_down {
            log::warn!("Shutting down; killing new session on {}: {}", node, command);
            session.signal(Signal::SIGKILL);
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        log::debug!("Session {} opened on {} (pgid {})", id, node, pgid);
        self.sessions.insert(id, session);
        Some(id)
    }

    pub fn close(&mut self, id: u64) -> Option<Session> {
        let session = self.sessions.remove(&id);
        if let Some(s) = &session {
            log::debug!("Session {} on {} closed after {:?}", id, s.node, s.started.elapsed());
        }
        session
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Interrupt every open session: SIGTERM to each group, then SIGKILL to
    /// whatever is left after `grace`. Only the first call does anything.
    pub fn terminate_all(&mut self, grace: Duration) {
        if std::mem::replace(&mut self.shutting_down, true) {
            return;
        }
        let sessions: Vec<Session> = std::mem::take(&mut self.sessions).into_values().collect();
        if sessions.is_empty() {
            return;
        }

        for session in &sessions {
            log::warn!(
                "Interrupting `{}` on {} after {}s",
                session.command,
                session.node,
                session.started.elapsed().as_secs()
            );
            session.signal(Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !sessions.iter().any(Session::is_running) {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        for session in sessions.iter().filter(|s| s.is_running()) {
            log::warn!("Session on {} ignored SIGTERM, killing it", session.node);
            session.signal(Signal::SIGKILL);
        }
    }
}

/// Registration of one running ssh child; closed again on drop.
#[derive(Debug)]
pub struct LiveSession {
    registry: &'static Mutex<SessionRegistry>,
    id: Option<u64>,
}

impl LiveSession {
    /// Register with the global registry
    pub fn open(pgid: u32, node: &str, command: &str) -> Self {
        Self::open_in(SessionRegistry::global(), pgid, node, command)
    }

    pub fn open_in(
        registry: &'static Mutex<SessionRegistry>,
        pgid: u32,
        node: &str,
        command: &str,
    ) -> Self {
        let id = registry
            .lock()
            .ok()
            .and_then(|mut sessions| sessions.open(pgid, node, command));
        Self { registry, id }
    }

    /// False when the session was refused because shutdown already began
    pub fn is_tracked(&self) -> bool {
        self.id.is_some()
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let (Some(id), Ok(mut sessions)) = (self.id, self.registry.lock()) {
            sessions.close(id);
        }
    }
}

/// Held by the binary for the whole run; interrupts leftover sessions on drop,
/// including during a panic unwind.
pub struct SessionGuard;

impl SessionGuard {
    pub fn new() -> Self {
        SessionGuard
    }
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = SessionRegistry::global().lock() {
            sessions.terminate_all(SHUTDOWN_GRACE);
        }
    }
}

/// Interrupt open sessions and exit on SIGINT, SIGTERM or SIGHUP.
pub fn init_signal_handlers() -> std::io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
    std::thread::spawn(move || {
        if let Some(raw) = signals.forever().next() {
            let name = Signal::try_from(raw).map(Signal::as_str).unwrap_or("signal");
            log::warn!("Received {}, closing remote sessions", name);
            if let Ok(mut sessions) = SessionRegistry::global().lock() {
                sessions.terminate_all(SHUTDOWN_GRACE);
            }
            std::process::exit(128 + raw);
        }
    });
    Ok(())
}

/// Spawn options for ssh children
pub trait SessionCommand {
    /// Lead a new process group and receive SIGTERM if the driver dies
    fn as_session_leader(&mut self) -> &mut Self;
}

impl SessionCommand for std::process::Command {
    fn as_session_leader(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        self.process_group(0);
        // SAFETY: prctl is async-signal-safe and touches no shared state
        unsafe {
            self.pre_exec(|| {
                nix::sys::prctl::set_pdeathsig(Signal::SIGTERM).map_err(std::io::Error::from)
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaked_registry() -> &'static Mutex<SessionRegistry> {
        Box::leak(Box::new(Mutex::new(SessionRegistry::default())))
    }

    #[test]
    fn test_live_session_closes_on_drop() {
        let registry = leaked_registry();
        {
            let session = LiveSession::open_in(registry, 99_999_001, "ceph-node1", "sudo ceph -s");
            assert!(session.is_tracked());
            let sessions = registry.lock().expect("lock");
            let open: Vec<&Session> = sessions.sessions().collect();
            assert_eq!(open.len(), 1);
            assert_eq!(open[0].node, "ceph-node1");
            assert_eq!(open[0].command, "sudo ceph -s");
        }
        assert_eq!(registry.lock().expect("lock").count(), 0);
    }

    #[test]
    fn test_sessions_refused_after_shutdown() {
        let registry = leaked_registry();
        registry.lock().expect("lock").terminate_all(Duration::ZERO);

        let session = LiveSession::open_in(registry, 99_999_002, "ceph-node2", "true");
        assert!(!session.is_tracked());
        assert_eq!(registry.lock().expect("lock").count(), 0);
    }

    #[test]
    fn test_close_returns_session() {
        let mut registry = SessionRegistry::default();
        let id = registry.open(99_999_003, "ceph-node3", "hostname").expect("open");
        let closed = registry.close(id).expect("was open");
        assert_eq!(closed.pgid, 99_999_003);
        assert!(registry.close(id).is_none());
    }

    #[test]
    fn test_missing_group_is_not_running() {
        let session = Session {
            pgid: 99_999_004,
            node: "ceph-node4".to_string(),
            command: "true".to_string(),
            started: Instant::now(),
        };
        assert!(!session.is_running());
    }
}
