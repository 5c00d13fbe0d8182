//! Crash-safe chrome restoration
//!
//! Before the mapper strips a window's border or title it arms a
//! [`RestoreGuard`] on the [`RestorationLedger`]. The guard restores the
//! original style and rectangle when it is released or dropped. The ledger
//! keeps the pending snapshots too, so a process-wide sweep can restore
//! whatever is still outstanding when the process exits or aborts.
//!
//! Every snapshot is restored at most once: whoever removes it from the
//! ledger first (guard or sweep) performs the restoration.

use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Once, OnceLock, Weak};

use crate::native::{NativeSurface, PositionFlags, Rectangle, WindowHandle, WindowStyle};

/// Original appearance of a window whose chrome was overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestoreSnapshot {
    pub rect: Rectangle,
    pub style: WindowStyle,
}

/// Puts the original style back, then the original rectangle with a frame
/// refresh. Failures are swallowed; the window may already be gone.
pub fn restore_window_state(surface: &dyn NativeSurface, handle: WindowHandle, snapshot: &RestoreSnapshot) {
    if let Err(e) = surface.set_style(handle, snapshot.style) {
        debug!("Could not restore style of window {}: {}", handle, e);
    }

    // Position must follow the style so the frame is recomputed.
    let flags = PositionFlags::FRAME_CHANGED | PositionFlags::NO_ZORDER | PositionFlags::ASYNC_WINDOW_POS;
    if let Err(e) = surface.set_position(handle, None, snapshot.rect, flags) {
        debug!("Could not restore position of window {}: {}", handle, e);
    }
}

/// Pending restorations, shared by the guards and the exit sweep.
pub struct RestorationLedger {
    surface: Arc<dyn NativeSurface>,
    pending: Mutex<HashMap<WindowHandle, RestoreSnapshot>>,
}

impl fmt::Debug for RestorationLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestorationLedger")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl RestorationLedger {
    pub fn new(surface: Arc<dyn NativeSurface>) -> Arc<Self> {
        Arc::new(Self {
            surface,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Records a restoration obligation and returns the guard that owns it.
    /// Must be called before the window is modified.
    pub fn arm(self: &Arc<Self>, handle: WindowHandle, snapshot: RestoreSnapshot) -> RestoreGuard {
        let mut pending = self.pending.lock();
        // An older snapshot for the same handle is the true original.
        let snapshot = *pending.entry(handle).or_insert(snapshot);
        RestoreGuard {
            handle,
            snapshot,
            ledger: Arc::clone(self),
        }
    }

    pub fn is_pending(&self, handle: WindowHandle) -> bool {
        self.pending.lock().contains_key(&handle)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Restores one window if it still has an obligation. Returns whether a
    /// restoration ran.
    fn restore(&self, handle: WindowHandle) -> bool {
        let snapshot = self.pending.lock().remove(&handle);
        match snapshot {
            Some(snapshot) => {
                restore_window_state(self.surface.as_ref(), handle, &snapshot);
                true
            }
            None => false,
        }
    }

    fn rekey(&self, old: WindowHandle, new: WindowHandle) {
        let mut pending = self.pending.lock();
        if let Some(snapshot) = pending.remove(&old) {
            pending.insert(new, snapshot);
        }
    }

    /// Restores every outstanding window. Returns how many were restored.
    pub fn sweep(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        self.restore_all(drained)
    }

    /// Sweep variant for exit paths: never blocks on the ledger lock, since
    /// the thread that is exiting may be the one holding it.
    fn sweep_on_exit(&self) -> usize {
        let drained: Vec<_> = match self.pending.try_lock() {
            Some(mut pending) => pending.drain().collect(),
            None => return 0,
        };
        self.restore_all(drained)
    }

    fn restore_all(&self, drained: Vec<(WindowHandle, RestoreSnapshot)>) -> usize {
        for (handle, snapshot) in &drained {
            restore_window_state(self.surface.as_ref(), *handle, snapshot);
        }
        drained.len()
    }
}

/// Owns one window's restoration obligation.
#[derive(Debug)]
pub struct RestoreGuard {
    handle: WindowHandle,
    snapshot: RestoreSnapshot,
    ledger: Arc<RestorationLedger>,
}

impl RestoreGuard {
    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn snapshot(&self) -> &RestoreSnapshot {
        &self.snapshot
    }

    /// Restores the window now.
    pub fn release(self) {
        drop(self);
    }

    pub(crate) fn rekey(&mut self, handle: WindowHandle) {
        self.ledger.rekey(self.handle, handle);
        self.handle = handle;
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        self.ledger.restore(self.handle);
    }
}

static EXIT_LEDGERS: OnceLock<Mutex<Vec<Weak<RestorationLedger>>>> = OnceLock::new();
static EXIT_HOOKS: Once = Once::new();

fn exit_ledgers() -> &'static Mutex<Vec<Weak<RestorationLedger>>> {
    EXIT_LEDGERS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Enrolls a ledger in the process teardown sweep. The first call installs
/// an `atexit` handler that runs [`run_exit_sweep`].
///
/// With `panic = "abort"` every panic ends the process without running
/// `atexit` or dropping guards, so a panic hook sweeps too. Under unwinding
/// a panic may be caught and the windows are still managed afterwards; the
/// guards dropped while unwinding and `atexit` cover the process-ending case.
pub fn register_exit_sweep(ledger: &Arc<RestorationLedger>) {
    {
        let mut ledgers = exit_ledgers().lock();
        ledgers.retain(|weak| weak.strong_count() > 0);
        ledgers.push(Arc::downgrade(ledger));
    }

    EXIT_HOOKS.call_once(|| {
        #[cfg(panic = "abort")]
        {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |panic_info| {
                let restored = run_exit_sweep();
                if restored > 0 {
                    log::error!("Restored {} window(s) before aborting on panic", restored);
                }
                previous(panic_info);
            }));
        }

        #[cfg(unix)]
        {
            // SAFETY: `sweep_at_exit` is a plain extern "C" fn with no
            // arguments, as atexit requires.
            let rc = unsafe { libc::atexit(sweep_at_exit) };
            if rc != 0 {
                debug!("atexit registration failed ({})", rc);
            }
        }

        debug!("Process exit restoration sweep installed");
    });
}

/// Restores every outstanding window of every enrolled ledger.
pub fn run_exit_sweep() -> usize {
    let ledgers: Vec<Arc<RestorationLedger>> = match exit_ledgers().try_lock() {
        Some(ledgers) => ledgers.iter().filter_map(Weak::upgrade).collect(),
        None => return 0,
    };
    let restored: usize = ledgers.iter().map(|ledger| ledger.sweep_on_exit()).sum();
    if restored > 0 {
        info!("Exit sweep restored {} window(s)", restored);
    }
    restored
}

#[cfg(unix)]
extern "C" fn sweep_at_exit() {
    run_exit_sweep();
}
