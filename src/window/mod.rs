//! Tracked window state
//!
//! This module holds the per-window bookkeeping of the mapper:
//! - [`WindowRecord`]: static metadata captured at admission plus the chrome
//!   restoration obligation, if any
//! - [`WindowInfo`]: the outward-facing snapshot published with every event
//! - [`WindowRegistry`]: the bijective handle/cid index
//!
//! Chrome stripping, crash-safe restoration and placement live in the
//! `chrome`, `restore` and `placement` submodules.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::ids::CorrelationId;
use crate::native::{NativeSurface, ProcessId, Rectangle, VisibilityStates, WindowHandle};

pub mod chrome;
pub mod placement;
pub mod registry;
pub mod restore;

pub use chrome::{chrome_policy, ChromeDecision};
pub use placement::{HorizontalSnap, PlacementRequest, VerticalSnap};
pub use registry::WindowRegistry;
pub use restore::{RestorationLedger, RestoreGuard, RestoreSnapshot};

/// A window admitted by the mapper.
#[derive(Debug)]
pub struct WindowRecord {
    cid: CorrelationId,
    handle: WindowHandle,
    pub class_name: String,
    pub module_filename: String,
    pub exec_filename: String,
    pub pid: ProcessId,
    /// Visibility at admission time
    pub visible: bool,
    /// Present while this window's chrome is overridden
    restore: Option<RestoreGuard>,
}

impl WindowRecord {
    pub fn new(
        cid: CorrelationId,
        handle: WindowHandle,
        class_name: String,
        module_filename: String,
        exec_filename: String,
        pid: ProcessId,
        visible: bool,
    ) -> Self {
        Self {
            cid,
            handle,
            class_name,
            module_filename,
            exec_filename,
            pid,
            visible,
            restore: None,
        }
    }

    pub fn cid(&self) -> CorrelationId {
        self.cid
    }

    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn chrome_override_active(&self) -> bool {
        self.restore.is_some()
    }

    pub fn restore_snapshot(&self) -> Option<&RestoreSnapshot> {
        self.restore.as_ref().map(RestoreGuard::snapshot)
    }

    /// Hands the restoration obligation to this record. The window is
    /// restored when the record is dropped or the guard is released.
    pub(crate) fn attach_restore(&mut self, guard: RestoreGuard) {
        self.restore = Some(guard);
    }

    /// Moves the record onto a replacement handle, carrying the restoration
    /// obligation along.
    pub(crate) fn rekey(&mut self, handle: WindowHandle) {
        if let Some(guard) = self.restore.as_mut() {
            guard.rekey(handle);
        }
        self.handle = handle;
    }

    /// Snapshot without any live reads.
    pub fn static_info(&self) -> WindowInfo {
        WindowInfo {
            cid: self.cid,
            handle: self.handle,
            title: String::new(),
            border: Rectangle::default(),
            visibility: VisibilityStates::empty(),
            class_name: self.class_name.clone(),
            module_filename: self.module_filename.clone(),
            exec_filename: self.exec_filename.clone(),
            pid: self.pid,
            visible: self.visible,
        }
    }
}

/// Snapshot of a window handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub cid: CorrelationId,
    pub handle: WindowHandle,
    pub title: String,
    pub border: Rectangle,
    pub visibility: VisibilityStates,
    pub class_name: String,
    pub module_filename: String,
    pub exec_filename: String,
    pub pid: ProcessId,
    pub visible: bool,
}

impl WindowInfo {
    /// Builds the snapshot for a record. Visible windows get their title,
    /// border and visibility states read live; if the window vanished in the
    /// meantime those fall back to empty values. Invisible records are
    /// returned without live reads.
    pub fn materialize(record: &WindowRecord, surface: &dyn NativeSurface) -> Self {
        let mut info = record.static_info();
        if !record.visible {
            return info;
        }

        let live = surface.title(record.handle).and_then(|title| {
            let border = surface.border_rectangle(record.handle)?;
            let visibility = surface.visibility_states(record.handle)?;
            Ok((title, border, visibility))
        });
        match live {
            Ok((title, border, visibility)) => {
                info.title = title;
                info.border = border;
                info.visibility = visibility;
            }
            Err(e) => {
                debug!("Window {} vanished while reading its state: {}", record.handle, e);
            }
        }
        info
    }
}
