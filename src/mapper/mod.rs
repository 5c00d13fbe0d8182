//! Window mapper
//!
//! Ties native window handles to correlation ids and is the only component
//! that mutates tracked windows. It:
//! - admits windows found at startup or reported as created,
//! - strips chrome the policy does not want and guarantees its restoration,
//! - turns OS notifications into normalized downstream events,
//! - executes placement, focus, minimize/maximize and resize commands and
//!   checks what the OS actually did.
//!
//! Handlers run one at a time through [`WindowMapper::dispatch`], which is
//! also the boundary where handler errors are logged and dropped.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::bus::{Command, EventSink, Inbound, OsEvent, PublishedEvent, Target, WindowEventKind};
use crate::config::MapperConfig;
use crate::ids::{CorrelationId, IdAllocator};
use crate::native::{NativeError, NativeSurface, Rectangle, UserIdentity, VisibilityStates, WindowHandle};
use crate::policy::WindowPolicy;
use crate::window::chrome::strip_chrome;
use crate::window::placement::move_resize_window;
use crate::window::restore::register_exit_sweep;
use crate::window::{
    chrome_policy, HorizontalSnap, PlacementRequest, RestorationLedger, VerticalSnap, WindowInfo,
    WindowRecord, WindowRegistry,
};


/// Why a window was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    OwnProcess,
    ForeignOwner(UserIdentity),
    NoClass,
    SyntheticClass(String),
    Invisible,
    AlreadyTracked,
}

/// Result of running admission on one handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted { cid: CorrelationId, tile_managed: bool },
    Rejected(Rejection),
}

/// The window registry and controller.
pub struct WindowMapper {
    surface: Arc<dyn NativeSurface>,
    policy: Box<dyn WindowPolicy>,
    ids: Box<dyn IdAllocator>,
    sink: Box<dyn EventSink>,
    config: MapperConfig,
    identity: UserIdentity,
    registry: WindowRegistry,
    ledger: Arc<RestorationLedger>,
    closed: bool,
}

impl WindowMapper {
    /// Creates the mapper and admits every window that already exists.
    ///
    /// This publishes events, so every consumer should be subscribed before
    /// the mapper is built.
    pub fn new(
        surface: Arc<dyn NativeSurface>,
        policy: Box<dyn WindowPolicy>,
        ids: Box<dyn IdAllocator>,
        sink: Box<dyn EventSink>,
        config: MapperConfig,
    ) -> Result<Self> {
        let identity = surface
            .current_identity()
            .context("Failed to read the identity running the window mapper")?;
        let ledger = RestorationLedger::new(Arc::clone(&surface));
        if config.restore_on_exit {
            register_exit_sweep(&ledger);
        }

        let mut mapper = Self {
            surface,
            policy,
            ids,
            sink,
            config,
            identity,
            registry: WindowRegistry::new(),
            ledger,
            closed: false,
        };
        mapper.register_existing_windows()?;
        Ok(mapper)
    }

    fn register_existing_windows(&mut self) -> Result<()> {
        let handles = self
            .surface
            .enumerate_windows()
            .context("Failed to enumerate top-level windows")?;
        for handle in handles {
            if let Err(e) = self.admit(handle) {
                error!("Failed to initialize window {}: {:#}", handle, e);
            }
        }
        debug!(
            "Finished existing window registration; tracking {} window(s)",
            self.registry.len()
        );
        Ok(())
    }

    pub fn registry(&self) -> &WindowRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<RestorationLedger> {
        &self.ledger
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub fn handle_for(&self, cid: CorrelationId) -> Option<WindowHandle> {
        self.registry.handle_for(cid)
    }

    pub fn cid_for(&self, handle: WindowHandle) -> Option<CorrelationId> {
        self.registry.get(handle).map(WindowRecord::cid)
    }

    /// Current snapshot of a tracked window.
    pub fn window_info(&self, cid: CorrelationId) -> Option<WindowInfo> {
        self.registry
            .get_by_cid(cid)
            .map(|record| WindowInfo::materialize(record, self.surface.as_ref()))
    }

    /// Runs one handler. Errors are logged here and never propagate.
    pub fn dispatch(&mut self, inbound: Inbound) {
        if self.closed {
            debug!("Window mapper is shut down; dropping {:?}", inbound);
            return;
        }
        let result = match inbound {
            Inbound::Os { event } => self.handle_os_event(event),
            Inbound::Command { target, command } => self.handle_command(target, command),
        };
        if let Err(e) = result {
            error!("Window mapper handler failed: {:#}", e);
        }
    }

    pub fn dispatch_all(&mut self, inbound: impl IntoIterator<Item = Inbound>) {
        for item in inbound {
            self.dispatch(item);
        }
    }

    /// Decides whether a native window becomes tracked, and tracks it.
    pub fn admit(&mut self, handle: WindowHandle) -> Result<Admission> {
        if self.registry.contains(handle) {
            return Ok(Admission::Rejected(Rejection::AlreadyTracked));
        }

        let pid = self
            .surface
            .process_id(handle)
            .with_context(|| format!("Failed to read process id of window {}", handle))?;
        if pid == self.surface.current_process_id() {
            return Ok(Admission::Rejected(Rejection::OwnProcess));
        }

        let class_name = self
            .surface
            .class_name(handle)
            .with_context(|| format!("Failed to read class of window {}", handle))?;

        // Windows we cannot inspect are not ours to manage.
        let owner = match self.surface.process_owner(pid) {
            Ok(owner) => {
                debug!("window {}, pid {}, owned by [{}]", handle, pid, owner);
                owner
            }
            Err(e) => {
                debug!(
                    "username/domain read problem for window {}, pid {}, class {:?}: {}",
                    handle, pid, class_name, e
                );
                UserIdentity::aborted()
            }
        };
        if owner != self.identity {
            debug!(
                "Ignoring window {} with pid {}, class {:?} from other user {}",
                handle, pid, class_name, owner
            );
            return Ok(Admission::Rejected(Rejection::ForeignOwner(owner)));
        }

        let class_name = match class_name {
            None => {
                debug!("Ignoring window {} without a class", handle);
                return Ok(Admission::Rejected(Rejection::NoClass));
            }
            Some(class) if class.starts_with(&self.config.synthetic_class_prefix) => {
                debug!("Ignoring self-managed window with class {}", class);
                return Ok(Admission::Rejected(Rejection::SyntheticClass(class)));
            }
            Some(class) => class,
        };

        let visible = self
            .surface
            .is_visible(handle)
            .with_context(|| format!("Failed to read visibility of window {}", handle))?;
        if !visible {
            debug!("Ignoring invisible window {} ({})", handle, class_name);
            return Ok(Admission::Rejected(Rejection::Invisible));
        }

        let cid = self.ids.allocate(&self.config.window_category);
        let module_filename = self.surface.module_filename(handle).unwrap_or_else(|e| {
            debug!("Ignoring problem reading module of window {}: {}", handle, e);
            String::new()
        });
        let exec_filename = self.surface.executable_filename(pid).unwrap_or_else(|e| {
            debug!("Ignoring problem reading executable of pid {}: {}", pid, e);
            String::new()
        });

        let mut record = WindowRecord::new(
            cid,
            handle,
            class_name,
            module_filename,
            exec_filename,
            pid,
            visible,
        );

        // Policy sees the live title as well as the static metadata.
        let info = WindowInfo::materialize(&record, self.surface.as_ref());
        let decision = chrome_policy(&info, self.policy.as_ref());
        if decision.should_modify {
            let guard = strip_chrome(self.surface.as_ref(), &self.ledger, handle, decision)
                .with_context(|| format!("Failed to snapshot chrome of window {}", handle))?;
            record.attach_restore(guard);
        }

        let tile_managed = self.is_tile_managed(&info);
        debug!(
            "Registered {} ({}) ({}) ({}) as {}",
            handle, record.module_filename, record.exec_filename, pid, cid
        );
        self.registry.insert(record)?;

        if tile_managed {
            self.publish_for(WindowEventKind::Created, handle);
        } else if let Some(record) = self.registry.get(handle) {
            let info = WindowInfo::materialize(record, self.surface.as_ref());
            self.sink.publish(PublishedEvent {
                kind: WindowEventKind::PutOutsideManagement,
                target: Target::UnownedPortal,
                cid,
                info,
            });
        }
        Ok(Admission::Admitted { cid, tile_managed })
    }

    fn is_tile_managed(&self, info: &WindowInfo) -> bool {
        info.visible && self.policy.is_tiled(info) && !self.policy.matches_shell_window(info)
    }

    /// Publishes a fresh snapshot of a tracked, visible window. Returns
    /// whether anything was published.
    fn publish_for(&mut self, kind: WindowEventKind, handle: WindowHandle) -> bool {
        let Some(record) = self.registry.get(handle) else {
            return false;
        };
        if !record.visible {
            return false;
        }
        let info = WindowInfo::materialize(record, self.surface.as_ref());
        self.sink.publish(PublishedEvent::for_window(kind, info));
        true
    }

    fn handle_os_event(&mut self, event: OsEvent) -> Result<()> {
        match event {
            OsEvent::WindowCreated { target_hwnd } => {
                if let Admission::Rejected(reason) = self.admit(target_hwnd)? {
                    debug!("Window {} not admitted: {:?}", target_hwnd, reason);
                }
            }
            OsEvent::WindowDestroyed { target_hwnd } | OsEvent::WindowForcedEnd { target_hwnd } => {
                self.on_window_destroyed(target_hwnd);
            }
            OsEvent::WindowFocused {
                target_hwnd,
                source_hwnd,
            } => {
                if let Some(handle) = target_hwnd.or(source_hwnd) {
                    self.publish_for(WindowEventKind::Focused, handle);
                }
            }
            OsEvent::WindowMinimized { target_hwnd } => {
                if let Some(cid) = self.cid_for(target_hwnd) {
                    debug!("Window {} ({}) minimized", target_hwnd, cid);
                }
            }
            OsEvent::WindowRedraw { target_hwnd } => {
                self.publish_for(WindowEventKind::Redraw, target_hwnd);
            }
            OsEvent::WindowFlash { target_hwnd } => {
                self.publish_for(WindowEventKind::Flashing, target_hwnd);
            }
            OsEvent::WindowReplacing { target_hwnd } => {
                if let Some(cid) = self.cid_for(target_hwnd) {
                    debug!("Window {} ({}) is being replaced", target_hwnd, cid);
                }
            }
            OsEvent::WindowReplaced {
                target_hwnd,
                replacement_hwnd,
            } => self.on_window_replaced(target_hwnd, replacement_hwnd),
        }
        Ok(())
    }

    /// Publishes `window-closed` and forgets the window, restoring its
    /// chrome. Unknown handles are ignored, so repeated delivery is
    /// harmless. Returns whether the window was tracked.
    fn on_window_destroyed(&mut self, handle: WindowHandle) -> bool {
        if !self.registry.contains(handle) {
            return false;
        }
        self.publish_for(WindowEventKind::Closed, handle);
        if let Some(record) = self.registry.remove(handle) {
            debug!("Forgot window {} ({})", handle, record.cid());
        }
        true
    }

    fn on_window_replaced(&mut self, old: WindowHandle, replacement: Option<WindowHandle>) {
        let Some(cid) = self.cid_for(old) else {
            return;
        };
        match replacement {
            Some(new) if self.registry.rekey(old, new) => {
                info!("Window {} replaced by {}; keeping {}", old, new, cid);
            }
            Some(new) => {
                debug!(
                    "Ignoring replacement of {} ({}) by {}: already tracked",
                    old, cid, new
                );
            }
            None => {
                debug!("Window {} ({}) replaced without a replacement handle", old, cid);
            }
        }
    }

    /// Escalates a failed control call to destroy handling.
    fn drop_unresponsive(&mut self, command: &str, target: Target, handle: WindowHandle, e: NativeError) {
        if e.is_gone() {
            info!("Could not run {}; no such window id {} / {}", command, target, handle);
        } else {
            info!(
                "Attempted {} on a window that isn't responsive ({} / {}): {}",
                command, target, handle, e
            );
        }
        self.on_window_destroyed(handle);
    }

    fn handle_command(&mut self, target: Target, command: Command) -> Result<()> {
        let name = command.name();
        match command {
            Command::SetRectangle {
                x,
                y,
                width,
                height,
                make_focused,
                h_snap,
                v_snap,
            } => {
                let rect = match (x, y, width, height) {
                    (Some(x), Some(y), Some(width), Some(height)) => {
                        Some(Rectangle::new(x, y, width, height))
                    }
                    _ => None,
                };
                self.set_rectangle(target, rect, make_focused, h_snap, v_snap);
            }
            Command::FocusWindow | Command::SetWindowOnTop => self.focus_window(name, target),
            Command::MinimizeWindow => {
                if let Some(handle) = self.target_or_active(target)? {
                    if let Err(e) = self.surface.minimize(handle) {
                        self.drop_unresponsive(name, target, handle, e);
                    }
                } else {
                    debug!("Nothing to minimize");
                }
            }
            Command::MaximizeWindow => {
                if let Some(handle) = self.target_or_active(target)? {
                    if let Err(e) = self.surface.maximize(handle) {
                        self.drop_unresponsive(name, target, handle, e);
                    }
                } else {
                    debug!("Nothing to maximize");
                }
            }
            Command::ResizeWindow { adjust_x, adjust_y } => {
                self.resize_window(target, adjust_x, adjust_y)?;
            }
            Command::MakeOwnedPortalActive => self.make_owned_portal_active()?,
            Command::ResendCreatedEvents => self.resend_created_events(),
        }
        Ok(())
    }

    fn resolve(&self, target: Target) -> Option<WindowHandle> {
        target.cid().and_then(|cid| self.registry.handle_for(cid))
    }

    /// The targeted window, or the active native window when the target is
    /// not a known cid.
    fn target_or_active(&self, target: Target) -> Result<Option<WindowHandle>> {
        match self.resolve(target) {
            Some(handle) => Ok(Some(handle)),
            None => self
                .surface
                .active_window()
                .context("Failed to read the active window"),
        }
    }

    fn set_rectangle(
        &mut self,
        target: Target,
        rect: Option<Rectangle>,
        make_focused: bool,
        h_snap: HorizontalSnap,
        v_snap: VerticalSnap,
    ) {
        let Some(handle) = self.resolve(target) else {
            info!("Could not run set-rectangle; no such window id {}", target);
            return;
        };

        let Some(rect) = rect else {
            if make_focused {
                if let Err(e) = self.surface.activate(handle) {
                    self.drop_unresponsive("set-rectangle", target, handle, e);
                }
            }
            return;
        };

        let do_resize = match self.registry.get(handle) {
            Some(record) => {
                let info = WindowInfo::materialize(record, self.surface.as_ref());
                self.policy.is_resizable(&info)
            }
            None => true,
        };
        let request = PlacementRequest {
            rect,
            make_focused,
            h_snap,
            v_snap,
        };
        match move_resize_window(self.surface.as_ref(), handle, &request, do_resize) {
            Ok(outcome) => debug!("Placed window {} at {:?}: {:?}", handle, rect, outcome),
            Err(e) => self.drop_unresponsive("set-rectangle", target, handle, e),
        }
    }

    fn focus_window(&mut self, name: &str, target: Target) {
        let Some(handle) = self.resolve(target) else {
            info!("Could not run {}; no such window id {}", name, target);
            return;
        };
        let Some(info) = self.window_info_for(handle) else {
            return;
        };
        debug!("Making window active: {} ({})", handle, info.cid);

        // Maximized or minimized windows are restored first.
        if !info.visibility.contains(VisibilityStates::RESTORED) {
            if let Err(e) = self.surface.restore(handle) {
                debug!("Could not restore window {}: {}", handle, e);
            }
        }

        match self.surface.activate(handle) {
            Ok(()) => {
                self.publish_for(WindowEventKind::Focused, handle);
            }
            Err(e) => self.drop_unresponsive(name, target, handle, e),
        }
    }

    fn window_info_for(&self, handle: WindowHandle) -> Option<WindowInfo> {
        self.registry
            .get(handle)
            .map(|record| WindowInfo::materialize(record, self.surface.as_ref()))
    }

    fn resize_window(&mut self, target: Target, adjust_x: i32, adjust_y: i32) -> Result<()> {
        let Some(handle) = self.target_or_active(target)? else {
            warn!("No active window found");
            return Ok(());
        };
        let current = self
            .surface
            .border_rectangle(handle)
            .with_context(|| format!("Failed to read the size of window {}", handle))?;
        let resized = Rectangle::new(
            current.x,
            current.y,
            current.width.saturating_add(adjust_x),
            current.height.saturating_add(adjust_y),
        );
        debug!(
            "Resizing window {} to ({}, {}), {}x{}",
            handle, resized.x, resized.y, resized.width, resized.height
        );
        self.surface
            .move_resize(handle, resized)
            .with_context(|| format!("Failed to resize window {}", handle))
    }

    fn make_owned_portal_active(&mut self) -> Result<()> {
        let active = self
            .surface
            .active_window()
            .context("Failed to read the active window")?;
        match active {
            Some(handle) if self.registry.contains(handle) => {
                // The owned portal activates itself on its window's focus event.
                self.publish_for(WindowEventKind::Focused, handle);
            }
            Some(handle) => warn!("Could not find window CID that is active; handle is {}", handle),
            None => warn!("Could not find window CID that is active; no active window"),
        }
        Ok(())
    }

    fn resend_created_events(&mut self) {
        debug!("Resending window created events");
        let handles: Vec<WindowHandle> = self
            .registry
            .records()
            .filter(|record| {
                let info = WindowInfo::materialize(record, self.surface.as_ref());
                self.is_tile_managed(&info)
            })
            .map(WindowRecord::handle)
            .collect();
        for handle in handles {
            self.publish_for(WindowEventKind::Created, handle);
        }
    }

    /// Reverts every chrome override and stops tracking all windows.
    /// Returns how many windows were restored. Later calls do nothing.
    pub fn shutdown(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        self.closed = true;

        // Obligations already honoured by an exit sweep are not counted.
        let restored = self.ledger.pending_count();
        drop(self.registry.drain());
        let stragglers = self.ledger.sweep();
        debug!("{} restoration(s) had no tracked window", stragglers);

        info!("Window mapper shut down; restored {} window(s)", restored);
        restored
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed
    }
}

impl Drop for WindowMapper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
