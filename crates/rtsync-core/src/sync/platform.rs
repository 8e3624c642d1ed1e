//! Backend selection
//!
//! A [`Platform`] is a shared handle to the one threading backend in use.
//! Backends are tried in preference order; each must initialise and then
//! survive a probe (spawn a thread, join it, check the status it returned)
//! before it is accepted.
//!
//! Most code uses the process-wide platform via [`platform()`]. Tests and
//! tools may build their own with [`Platform::select`] or the profile
//! constructors to exercise a specific backend.

use std::sync::{Arc, OnceLock};

use super::backend::{Capabilities, ThreadId, ThreadPriority, ThreadsBackend};
use super::error::{SyncError, SyncResult};
use super::std_backend::StdBackend;
use crate::config::BackendKind;

/// Status the probe thread must return
const PROBE_STATUS: i32 = 0x5EED;

/// Process-wide platform, selected on first use
static PLATFORM: OnceLock<Platform> = OnceLock::new();

/// Owns the backend and shuts it down when the last handle goes away
struct Installed {
    backend: Box<dyn ThreadsBackend>,
}

impl Drop for Installed {
    fn drop(&mut self) {
        log::debug!("[SYNC] Shutting down '{}' backend", self.backend.name());
        self.backend.quit();
    }
}

/// Shared handle to the active threading backend
#[derive(Clone)]
pub struct Platform {
    installed: Arc<Installed>,
}

impl Platform {
    /// Wrap a backend without probing it
    fn from_backend(backend: StdBackend) -> Self {
        Self {
            installed: Arc::new(Installed {
                backend: Box::new(backend),
            }),
        }
    }

    /// Native semaphores, mutexes and condition variables
    pub fn native() -> Self {
        Self::from_backend(StdBackend::native())
    }

    /// Semaphores only; mutexes and condition variables are emulated
    pub fn semaphore_only() -> Self {
        Self::from_backend(StdBackend::semaphore_only())
    }

    /// Mutexes and condition variables only; semaphores are emulated
    pub fn lock_only() -> Self {
        Self::from_backend(StdBackend::lock_only())
    }

    /// Pick the first candidate for `kind` that initialises and passes the probe
    pub fn select(kind: BackendKind) -> SyncResult<Self> {
        for backend in candidates(kind) {
            let name = backend.name();
            if !backend.capabilities().is_complete() {
                log::warn!("[SYNC] Backend '{}' lacks required primitives, skipping", name);
                continue;
            }
            if !backend.init() {
                log::debug!("[SYNC] Backend '{}' failed to initialise", name);
                continue;
            }

            let platform = Self::from_backend(backend);
            match platform.probe() {
                Ok(()) => {
                    log::info!(
                        "[SYNC] Using '{}' threading backend ({:?})",
                        name,
                        platform.capabilities()
                    );
                    return Ok(platform);
                }
                Err(e) => log::warn!("[SYNC] Backend '{}' failed probe: {}", name, e),
            }
        }

        log::error!("[SYNC] No usable threading backend for {:?}", kind);
        Err(SyncError::NoBackend)
    }

    fn probe(&self) -> SyncResult<()> {
        let status = self
            .backend()
            .spawn("rtsync-probe", Box::new(|| PROBE_STATUS))?
            .join()?;
        if status == PROBE_STATUS {
            Ok(())
        } else {
            Err(SyncError::ThreadCreate {
                name: "rtsync-probe".to_string(),
                reason: format!("probe returned status {}", status),
            })
        }
    }

    pub fn name(&self) -> &'static str {
        self.installed.backend.name()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.installed.backend.capabilities()
    }

    pub fn current_thread_id(&self) -> ThreadId {
        self.installed.backend.current_thread_id()
    }

    pub fn set_priority(&self, priority: ThreadPriority) {
        self.installed.backend.set_priority(priority);
    }

    pub(crate) fn backend(&self) -> &dyn ThreadsBackend {
        self.installed.backend.as_ref()
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("name", &self.name())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// Backends to try for `kind`, most preferred first
fn candidates(kind: BackendKind) -> Vec<StdBackend> {
    match kind {
        BackendKind::Auto => vec![
            StdBackend::native(),
            StdBackend::lock_only(),
            StdBackend::semaphore_only(),
        ],
        BackendKind::Native => vec![StdBackend::native()],
        BackendKind::SemaphoreOnly => vec![StdBackend::semaphore_only()],
        BackendKind::LockOnly => vec![StdBackend::lock_only()],
    }
}

/// Select the process-wide backend explicitly
///
/// Must run before anything calls [`platform()`]. Later calls keep the
/// platform that is already installed and say so in the log.
pub fn init(kind: BackendKind) -> SyncResult<&'static Platform> {
    if let Some(existing) = PLATFORM.get() {
        log::warn!(
            "[SYNC] Threading backend already initialised as '{}', ignoring {:?}",
            existing.name(),
            kind
        );
        return Ok(existing);
    }

    let selected = Platform::select(kind)?;
    Ok(PLATFORM.get_or_init(|| selected))
}

/// The process-wide platform, selecting one automatically on first use
pub fn platform() -> SyncResult<&'static Platform> {
    match PLATFORM.get() {
        Some(platform) => Ok(platform),
        None => {
            let selected = Platform::select(BackendKind::Auto)?;
            Ok(PLATFORM.get_or_init(|| selected))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_prefers_native() {
        let platform = Platform::select(BackendKind::Auto).unwrap();
        assert_eq!(platform.name(), "native");
        assert!(platform.capabilities().is_complete());
    }

    #[test]
    fn test_select_specific_profile() {
        let platform = Platform::select(BackendKind::SemaphoreOnly).unwrap();
        assert_eq!(platform.capabilities(), Capabilities::SEMAPHORE);

        let platform = Platform::select(BackendKind::LockOnly).unwrap();
        assert!(!platform.capabilities().contains(Capabilities::SEMAPHORE));
    }

    #[test]
    fn test_global_platform_is_stable() {
        let a = platform().unwrap();
        let b = platform().unwrap();
        assert!(std::ptr::eq(a, b));
        // init after first use keeps the installed backend
        let c = init(BackendKind::SemaphoreOnly).unwrap();
        assert!(std::ptr::eq(a, c));
    }

    #[test]
    fn test_clones_share_thread_ids() {
        let platform = Platform::native();
        let clone = platform.clone();
        assert_eq!(platform.current_thread_id(), clone.current_thread_id());
    }
}
