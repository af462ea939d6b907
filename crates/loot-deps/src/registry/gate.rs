use std::path::PathBuf;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::{DepsError, Result};

/// Lifecycle of one registered dependency within this process
#[derive(Debug, Clone)]
pub enum InstallState {
    NotStarted,
    InProgress,
    Installed(PathBuf),
    /// Sticky: later calls get the same error without retrying
    Failed(DepsError),
}

impl InstallState {
    pub fn is_installed(&self) -> bool {
        matches!(self, InstallState::Installed(_))
    }
}

/// One-shot gate: the first caller installs, concurrent callers wait for
/// and share its outcome.
#[derive(Debug)]
pub struct InstallGate {
    name: String,
    state: Mutex<InstallState>,
    done: Condvar,
}

impl InstallGate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(InstallState::NotStarted),
            done: Condvar::new(),
        }
    }

    pub fn state(&self) -> InstallState {
        self.lock().clone()
    }

    /// Run `install` at most once, returning its (shared) result
    pub fn run<F>(&self, install: F) -> Result<PathBuf>
    where
        F: FnOnce() -> Result<PathBuf>,
    {
        {
            let mut state = self.lock();
            loop {
                let in_progress = match &*state {
                    InstallState::Installed(path) => return Ok(path.clone()),
                    InstallState::Failed(err) => return Err(err.clone()),
                    InstallState::InProgress => true,
                    InstallState::NotStarted => false,
                };

                if !in_progress {
                    *state = InstallState::InProgress;
                    break;
                }
                state = self.done.wait(state).unwrap_or_else(|e| e.into_inner());
            }
        }

        let mut leader = Leader { gate: self, finished: false };
        let outcome = install();
        leader.finish(&outcome);
        outcome
    }

    fn complete(&self, state: InstallState) {
        *self.lock() = state;
        self.done.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, InstallState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Publishes the leader's outcome, or a failure if it unwinds
struct Leader<'a> {
    gate: &'a InstallGate,
    finished: bool,
}

impl Leader<'_> {
    fn finish(&mut self, outcome: &Result<PathBuf>) {
        let state = match outcome {
            Ok(path) => InstallState::Installed(path.clone()),
            Err(err) => InstallState::Failed(err.clone()),
        };
        self.gate.complete(state);
        self.finished = true;
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let err = DepsError::Interrupted(self.gate.name.clone());
            self.gate.complete(InstallState::Failed(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_runs_once() {
        let gate = InstallGate::new("tool");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let path = gate
                .run(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(PathBuf::from("/cache/tool"))
                })
                .unwrap();
            assert_eq!(path, PathBuf::from("/cache/tool"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(gate.state().is_installed());
    }

    #[test]
    fn test_failure_is_sticky() {
        let gate = InstallGate::new("tool");
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let err = gate
                .run(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(DepsError::Config("boom".into()))
                })
                .unwrap_err();
            assert!(matches!(err, DepsError::Config(ref m) if m == "boom"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(gate.state(), InstallState::Failed(_)));
    }

    #[test]
    fn test_followers_wait_for_leader() {
        let gate = Arc::new(InstallGate::new("tool"));
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    gate.run(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok(PathBuf::from("/cache/tool"))
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), PathBuf::from("/cache/tool"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_leader_fails_gate() {
        let gate = Arc::new(InstallGate::new("tool"));

        let leader = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.run(|| panic!("installer crashed")))
        };
        assert!(leader.join().is_err());

        let err = gate.run(|| Ok(PathBuf::from("/never"))).unwrap_err();
        assert!(matches!(err, DepsError::Interrupted(ref name) if name == "tool"));
    }
}
