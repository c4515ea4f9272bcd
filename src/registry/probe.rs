use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Answers whether a registered pid still belongs to a running process.
pub trait LivenessProbe: Send + Sync + 'static {
    /// Returns `true` if `pid` is alive.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Checks liveness with `kill(pid, 0)`.
///
/// `EPERM` counts as alive: the process exists but belongs to another user.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessProbe;

impl LivenessProbe for ProcessProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

impl<F> LivenessProbe for F
where
    F: Fn(u32) -> bool + Send + Sync + 'static,
{
    fn is_alive(&self, pid: u32) -> bool {
        self(pid)
    }
}
