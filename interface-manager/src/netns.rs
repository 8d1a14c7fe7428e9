// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Scoped network namespace entry.

use nix::sched::{CloneFlags, setns};
use std::fs::File;
use std::os::fd::AsFd;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use tracing::error;

/// Errors which can occur while entering a network namespace.
#[derive(Debug, thiserror::Error)]
#[must_use]
pub enum NetnsError {
    #[error("failed to open netns path {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to enter netns {path}: {source}")]
    Enter {
        path: PathBuf,
        #[source]
        source: nix::errno::Errno,
    },
    #[error("failed to restore the original netns: {0}")]
    Restore(#[source] nix::errno::Errno),
    #[error("failed to spawn netns worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("netns action panicked")]
    ActionPanicked,
}

/// Run `action` with the network namespace at `path` as the current one.
///
/// The action executes on a dedicated OS thread whose namespace is swapped
/// with `setns(2)`; nothing else can be scheduled onto that thread, and the
/// original namespace is restored on every exit path, including a panic in
/// the action.  Keep actions short and do not hand work to other threads
/// from inside: only the pinned thread is in the target namespace.
///
/// The caller blocks until the action completes; call through
/// `tokio::task::spawn_blocking` from async contexts.
///
/// # Errors
///
/// Returns an error if the namespace cannot be opened or entered, if the
/// original namespace cannot be restored, or if the action panicked.
pub fn with_netns<T, F>(path: &Path, action: F) -> Result<T, NetnsError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let target = File::open(path).map_err(|source| NetnsError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let target_path = path.to_path_buf();

    let worker = std::thread::Builder::new()
        .name("netns-worker".to_string())
        .spawn(move || -> Result<T, NetnsError> {
            // the per-task path: this thread's namespace, not the process's
            let tid = nix::unistd::gettid();
            let original_path = PathBuf::from(format!("/proc/self/task/{tid}/ns/net"));
            let original = File::open(&original_path).map_err(|source| NetnsError::Open {
                path: original_path,
                source,
            })?;

            setns(target.as_fd(), CloneFlags::CLONE_NEWNET).map_err(|source| {
                NetnsError::Enter {
                    path: target_path,
                    source,
                }
            })?;
            let outcome = catch_unwind(AssertUnwindSafe(action));
            // restore before reporting anything about the action
            let restored = setns(original.as_fd(), CloneFlags::CLONE_NEWNET);
            if let Err(errno) = restored {
                error!("failed to restore netns on worker thread: {errno}");
                return Err(NetnsError::Restore(errno));
            }
            outcome.map_err(|_| NetnsError::ActionPanicked)
        })
        .map_err(NetnsError::Spawn)?;

    worker.join().map_err(|_| NetnsError::ActionPanicked)?
}

#[cfg(test)]
mod test {
    use super::*;

    // setns(2) needs CAP_SYS_ADMIN even for the caller's own namespace
    fn privileged() -> bool {
        nix::unistd::geteuid().is_root()
    }

    // Entering our own namespace is a no-op that still exercises the full
    // open/enter/restore path.
    #[test]
    fn runs_action_in_own_netns() {
        if !privileged() {
            return;
        }
        let out = with_netns(Path::new("/proc/self/ns/net"), || 21 * 2).unwrap();
        assert_eq!(out, 42);
    }

    #[test]
    fn missing_netns_path_is_a_typed_error() {
        let err = with_netns(Path::new("/proc/0/ns/net"), || ()).unwrap_err();
        assert!(matches!(err, NetnsError::Open { .. }));
    }

    #[test]
    fn panic_in_action_is_contained_and_reported() {
        if !privileged() {
            return;
        }
        let err = with_netns(Path::new("/proc/self/ns/net"), || -> () {
            panic!("boom");
        })
        .unwrap_err();
        assert!(matches!(err, NetnsError::ActionPanicked));
    }
}
