//! In-memory native surface
//!
//! `HeadlessDesktop` simulates a desktop of top-level windows closely enough
//! to exercise the mapper without an OS: windows can refuse sizes outside
//! their constraints, hang, vanish between calls, or belong to processes the
//! manager cannot inspect. Every mutating call is appended to a journal so
//! callers can check exactly what was asked of the OS.

use log::trace;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{
    NativeError, NativeResult, NativeSurface, PositionFlags, ProcessId, Rectangle, UserIdentity,
    VisibilityStates, WindowHandle, WindowStyle, ZOrder,
};

/// Style of a freshly created decorated window.
pub const DECORATED_STYLE: WindowStyle = WindowStyle::TITLE.union(WindowStyle::SIZE_BORDER);

/// A simulated top-level window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlessWindow {
    pub handle: WindowHandle,
    pub pid: ProcessId,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default = "HeadlessWindow::default_rect")]
    pub rect: Rectangle,
    #[serde(default = "HeadlessWindow::default_style")]
    pub style: WindowStyle,
    #[serde(default = "HeadlessWindow::default_true")]
    pub visible: bool,
    #[serde(default)]
    pub minimized: bool,
    #[serde(default)]
    pub maximized: bool,
    /// Smallest size the window accepts.
    #[serde(default)]
    pub min_size: Option<(i32, i32)>,
    /// Largest size the window accepts.
    #[serde(default)]
    pub max_size: Option<(i32, i32)>,
    /// A hung window fails every control operation.
    #[serde(default = "HeadlessWindow::default_true")]
    pub responsive: bool,
    #[serde(default)]
    pub module_filename: String,
}

impl HeadlessWindow {
    pub fn new(handle: u64, pid: u32, class_name: &str) -> Self {
        Self {
            handle: WindowHandle(handle),
            pid: ProcessId(pid),
            class_name: Some(class_name.to_string()),
            title: String::new(),
            rect: Self::default_rect(),
            style: Self::default_style(),
            visible: true,
            minimized: false,
            maximized: false,
            min_size: None,
            max_size: None,
            responsive: true,
            module_filename: String::new(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_rect(mut self, rect: Rectangle) -> Self {
        self.rect = rect;
        self
    }

    pub fn with_style(mut self, style: WindowStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_min_size(mut self, width: i32, height: i32) -> Self {
        self.min_size = Some((width, height));
        self
    }

    pub fn with_max_size(mut self, width: i32, height: i32) -> Self {
        self.max_size = Some((width, height));
        self
    }

    pub fn with_module(mut self, path: &str) -> Self {
        self.module_filename = path.to_string();
        self
    }

    pub fn without_class(mut self) -> Self {
        self.class_name = None;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn unresponsive(mut self) -> Self {
        self.responsive = false;
        self
    }

    fn default_rect() -> Rectangle {
        Rectangle::new(0, 0, 800, 600)
    }

    fn default_style() -> WindowStyle {
        DECORATED_STYLE
    }

    fn default_true() -> bool {
        true
    }

    /// Clamps a requested size to the window's constraints.
    fn constrain(&self, width: i32, height: i32) -> (i32, i32) {
        let (mut w, mut h) = (width, height);
        if let Some((min_w, min_h)) = self.min_size {
            w = w.max(min_w);
            h = h.max(min_h);
        }
        if let Some((max_w, max_h)) = self.max_size {
            w = w.min(max_w);
            h = h.min(max_h);
        }
        (w, h)
    }
}

/// A simulated process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlessProcess {
    pub pid: ProcessId,
    /// `None` models a process whose owner cannot be read (access denied).
    #[serde(default)]
    pub owner: Option<UserIdentity>,
    #[serde(default)]
    pub executable: String,
}

/// Native operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Style,
    SetStyle,
    SetPosition,
    MoveResize,
    BorderRectangle,
    Title,
    Activate,
    Minimize,
    Maximize,
    ModuleFilename,
}

/// One mutating request made against the desktop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "kebab-case")]
pub enum NativeCall {
    SetStyle {
        handle: WindowHandle,
        style: WindowStyle,
    },
    SetPosition {
        handle: WindowHandle,
        z_order: Option<ZOrder>,
        rect: Rectangle,
        flags: PositionFlags,
    },
    MoveResize {
        handle: WindowHandle,
        rect: Rectangle,
    },
    Redraw {
        handle: WindowHandle,
    },
    Activate {
        handle: WindowHandle,
    },
    Minimize {
        handle: WindowHandle,
    },
    Maximize {
        handle: WindowHandle,
    },
    Restore {
        handle: WindowHandle,
    },
}

impl NativeCall {
    pub fn handle(&self) -> WindowHandle {
        match self {
            NativeCall::SetStyle { handle, .. }
            | NativeCall::SetPosition { handle, .. }
            | NativeCall::MoveResize { handle, .. }
            | NativeCall::Redraw { handle }
            | NativeCall::Activate { handle }
            | NativeCall::Minimize { handle }
            | NativeCall::Maximize { handle }
            | NativeCall::Restore { handle } => *handle,
        }
    }
}

#[derive(Debug, Default)]
struct DesktopState {
    windows: BTreeMap<WindowHandle, HeadlessWindow>,
    /// Creation order, used for enumeration.
    creation: Vec<WindowHandle>,
    topmost: HashSet<WindowHandle>,
    processes: HashMap<ProcessId, HeadlessProcess>,
    active: Option<WindowHandle>,
    faults: HashSet<(WindowHandle, Operation)>,
    journal: Vec<NativeCall>,
}

impl DesktopState {
    fn window(&self, handle: WindowHandle) -> NativeResult<&HeadlessWindow> {
        self.windows.get(&handle).ok_or(NativeError::NotFound(handle))
    }

    fn window_mut(&mut self, handle: WindowHandle) -> NativeResult<&mut HeadlessWindow> {
        self.windows
            .get_mut(&handle)
            .ok_or(NativeError::NotFound(handle))
    }

    /// Fails with an OS error if a fault was injected for this call. Faults
    /// fire once.
    fn check_fault(
        &mut self,
        handle: WindowHandle,
        operation: Operation,
        name: &'static str,
    ) -> NativeResult<()> {
        if self.faults.remove(&(handle, operation)) {
            return Err(NativeError::Os {
                operation: name,
                code: 5,
            });
        }
        Ok(())
    }

    fn responsive_window_mut(&mut self, handle: WindowHandle) -> NativeResult<&mut HeadlessWindow> {
        let window = self.window_mut(handle)?;
        if !window.responsive {
            return Err(NativeError::Unresponsive(handle));
        }
        Ok(window)
    }
}

/// In-memory desktop implementing [`NativeSurface`].
#[derive(Debug)]
pub struct HeadlessDesktop {
    current_pid: ProcessId,
    identity: UserIdentity,
    screen: Rectangle,
    state: Mutex<DesktopState>,
}

impl HeadlessDesktop {
    /// Creates an empty desktop. The manager's own process is registered
    /// automatically.
    pub fn new(current_pid: u32, identity: UserIdentity) -> Self {
        let mut state = DesktopState::default();
        let pid = ProcessId(current_pid);
        state.processes.insert(
            pid,
            HeadlessProcess {
                pid,
                owner: Some(identity.clone()),
                executable: String::from("winmap"),
            },
        );
        Self {
            current_pid: pid,
            identity,
            screen: Rectangle::new(0, 0, 1920, 1080),
            state: Mutex::new(state),
        }
    }

    pub fn with_screen(mut self, screen: Rectangle) -> Self {
        self.screen = screen;
        self
    }

    pub fn add_process(&self, pid: u32, owner: Option<UserIdentity>, executable: &str) {
        let pid = ProcessId(pid);
        self.state.lock().processes.insert(
            pid,
            HeadlessProcess {
                pid,
                owner,
                executable: executable.to_string(),
            },
        );
    }

    pub fn insert_process(&self, process: HeadlessProcess) {
        self.state.lock().processes.insert(process.pid, process);
    }

    pub fn add_window(&self, window: HeadlessWindow) -> WindowHandle {
        let handle = window.handle;
        let mut state = self.state.lock();
        if state.windows.insert(handle, window).is_none() {
            state.creation.push(handle);
        }
        handle
    }

    /// Removes a window without telling anyone, like a crashed process.
    pub fn remove_window(&self, handle: WindowHandle) -> Option<HeadlessWindow> {
        let mut state = self.state.lock();
        state.creation.retain(|h| *h != handle);
        state.topmost.remove(&handle);
        if state.active == Some(handle) {
            state.active = None;
        }
        state.windows.remove(&handle)
    }

    pub fn window(&self, handle: WindowHandle) -> Option<HeadlessWindow> {
        self.state.lock().windows.get(&handle).cloned()
    }

    pub fn set_active(&self, handle: Option<WindowHandle>) {
        self.state.lock().active = handle;
    }

    pub fn set_responsive(&self, handle: WindowHandle, responsive: bool) {
        if let Some(window) = self.state.lock().windows.get_mut(&handle) {
            window.responsive = responsive;
        }
    }

    pub fn set_visible(&self, handle: WindowHandle, visible: bool) {
        if let Some(window) = self.state.lock().windows.get_mut(&handle) {
            window.visible = visible;
        }
    }

    /// Makes the next `operation` on `handle` fail with an OS error.
    pub fn inject_fault(&self, handle: WindowHandle, operation: Operation) {
        self.state.lock().faults.insert((handle, operation));
    }

    pub fn is_topmost(&self, handle: WindowHandle) -> bool {
        self.state.lock().topmost.contains(&handle)
    }

    pub fn journal(&self) -> Vec<NativeCall> {
        self.state.lock().journal.clone()
    }

    /// Journal entries addressed to one window.
    pub fn calls_for(&self, handle: WindowHandle) -> Vec<NativeCall> {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|call| call.handle() == handle)
            .cloned()
            .collect()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }
}

impl NativeSurface for HeadlessDesktop {
    fn enumerate_windows(&self) -> NativeResult<Vec<WindowHandle>> {
        Ok(self.state.lock().creation.clone())
    }

    fn style(&self, handle: WindowHandle) -> NativeResult<WindowStyle> {
        let mut state = self.state.lock();
        state.check_fault(handle, Operation::Style, "style")?;
        Ok(state.window(handle)?.style)
    }

    fn set_style(&self, handle: WindowHandle, style: WindowStyle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.journal.push(NativeCall::SetStyle { handle, style });
        state.check_fault(handle, Operation::SetStyle, "set_style")?;
        state.window_mut(handle)?.style = style;
        trace!("headless: style of {} set to {:?}", handle, style);
        Ok(())
    }

    fn set_position(
        &self,
        handle: WindowHandle,
        z_order: Option<ZOrder>,
        rect: Rectangle,
        flags: PositionFlags,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.journal.push(NativeCall::SetPosition {
            handle,
            z_order,
            rect,
            flags,
        });
        state.check_fault(handle, Operation::SetPosition, "set_position")?;
        let window = state.responsive_window_mut(handle)?;
        window.rect.x = rect.x;
        window.rect.y = rect.y;
        if !flags.contains(PositionFlags::NO_SIZE) {
            let (width, height) = window.constrain(rect.width, rect.height);
            window.rect.width = width;
            window.rect.height = height;
        }
        if !flags.contains(PositionFlags::NO_ZORDER) && z_order == Some(ZOrder::Topmost) {
            state.topmost.insert(handle);
        }
        Ok(())
    }

    fn move_resize(&self, handle: WindowHandle, rect: Rectangle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.journal.push(NativeCall::MoveResize { handle, rect });
        state.check_fault(handle, Operation::MoveResize, "move_resize")?;
        let window = state.responsive_window_mut(handle)?;
        let (width, height) = window.constrain(rect.width, rect.height);
        window.rect = Rectangle::new(rect.x, rect.y, width, height);
        Ok(())
    }

    fn border_rectangle(&self, handle: WindowHandle) -> NativeResult<Rectangle> {
        let mut state = self.state.lock();
        state.check_fault(handle, Operation::BorderRectangle, "border_rectangle")?;
        Ok(state.window(handle)?.rect)
    }

    fn redraw(&self, handle: WindowHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.journal.push(NativeCall::Redraw { handle });
        state.window(handle).map(|_| ())
    }

    fn title(&self, handle: WindowHandle) -> NativeResult<String> {
        let mut state = self.state.lock();
        state.check_fault(handle, Operation::Title, "title")?;
        Ok(state.window(handle)?.title.clone())
    }

    fn class_name(&self, handle: WindowHandle) -> NativeResult<Option<String>> {
        Ok(self.state.lock().window(handle)?.class_name.clone())
    }

    fn is_visible(&self, handle: WindowHandle) -> NativeResult<bool> {
        Ok(self.state.lock().window(handle)?.visible)
    }

    fn visibility_states(&self, handle: WindowHandle) -> NativeResult<VisibilityStates> {
        let state = self.state.lock();
        let window = state.window(handle)?;
        let mut states = VisibilityStates::empty();
        if window.visible {
            states |= VisibilityStates::VISIBLE;
        }
        if window.minimized {
            states |= VisibilityStates::MINIMIZED;
        } else if window.maximized {
            states |= VisibilityStates::MAXIMIZED;
        } else {
            states |= VisibilityStates::RESTORED;
        }
        if state.active == Some(handle) {
            states |= VisibilityStates::FOCUSED;
        }
        Ok(states)
    }

    fn activate(&self, handle: WindowHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.journal.push(NativeCall::Activate { handle });
        state.check_fault(handle, Operation::Activate, "activate")?;
        state.responsive_window_mut(handle)?;
        state.active = Some(handle);
        Ok(())
    }

    fn minimize(&self, handle: WindowHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.journal.push(NativeCall::Minimize { handle });
        state.check_fault(handle, Operation::Minimize, "minimize")?;
        let window = state.responsive_window_mut(handle)?;
        window.minimized = true;
        window.maximized = false;
        if state.active == Some(handle) {
            state.active = None;
        }
        Ok(())
    }

    fn maximize(&self, handle: WindowHandle) -> NativeResult<()> {
        let screen = self.screen;
        let mut state = self.state.lock();
        state.journal.push(NativeCall::Maximize { handle });
        state.check_fault(handle, Operation::Maximize, "maximize")?;
        let window = state.responsive_window_mut(handle)?;
        window.minimized = false;
        window.maximized = true;
        window.rect = screen;
        Ok(())
    }

    fn restore(&self, handle: WindowHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.journal.push(NativeCall::Restore { handle });
        let window = state.responsive_window_mut(handle)?;
        window.minimized = false;
        window.maximized = false;
        Ok(())
    }

    fn process_id(&self, handle: WindowHandle) -> NativeResult<ProcessId> {
        Ok(self.state.lock().window(handle)?.pid)
    }

    fn process_owner(&self, pid: ProcessId) -> NativeResult<UserIdentity> {
        let state = self.state.lock();
        let process = state
            .processes
            .get(&pid)
            .ok_or(NativeError::ProcessNotFound(pid))?;
        process.owner.clone().ok_or(NativeError::AccessDenied {
            operation: "process_owner",
        })
    }

    fn module_filename(&self, handle: WindowHandle) -> NativeResult<String> {
        let mut state = self.state.lock();
        state.check_fault(handle, Operation::ModuleFilename, "module_filename")?;
        Ok(state.window(handle)?.module_filename.clone())
    }

    fn executable_filename(&self, pid: ProcessId) -> NativeResult<String> {
        self.state
            .lock()
            .processes
            .get(&pid)
            .map(|process| process.executable.clone())
            .ok_or(NativeError::ProcessNotFound(pid))
    }

    fn active_window(&self) -> NativeResult<Option<WindowHandle>> {
        Ok(self.state.lock().active)
    }

    fn current_process_id(&self) -> ProcessId {
        self.current_pid
    }

    fn current_identity(&self) -> NativeResult<UserIdentity> {
        Ok(self.identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop() -> HeadlessDesktop {
        let desktop = HeadlessDesktop::new(1, UserIdentity::new("me", "HOST"));
        desktop.add_process(10, Some(UserIdentity::new("me", "HOST")), "C:\\apps\\edit.exe");
        desktop
    }

    #[test]
    fn test_min_size_is_enforced() -> anyhow::Result<()> {
        let desktop = desktop();
        let handle = desktop.add_window(HeadlessWindow::new(0x100, 10, "Edit").with_min_size(400, 300));

        desktop.set_position(
            handle,
            None,
            Rectangle::new(5, 5, 100, 100),
            PositionFlags::FRAME_CHANGED,
        )?;
        assert_eq!(desktop.border_rectangle(handle)?, Rectangle::new(5, 5, 400, 300));
        Ok(())
    }

    #[test]
    fn test_no_size_keeps_dimensions() -> anyhow::Result<()> {
        let desktop = desktop();
        let handle = desktop.add_window(HeadlessWindow::new(0x100, 10, "Edit"));

        desktop.set_position(
            handle,
            Some(ZOrder::Topmost),
            Rectangle::new(50, 60, 0, 0),
            PositionFlags::NO_SIZE,
        )?;
        assert_eq!(desktop.border_rectangle(handle)?, Rectangle::new(50, 60, 800, 600));
        assert!(desktop.is_topmost(handle));
        Ok(())
    }

    #[test]
    fn test_topmost_only_when_zorder_applies() -> anyhow::Result<()> {
        let desktop = desktop();
        let plain = desktop.add_window(HeadlessWindow::new(0x100, 10, "Edit"));
        let pinned = desktop.add_window(HeadlessWindow::new(0x101, 10, "Edit"));

        desktop.set_position(plain, None, Rectangle::new(0, 0, 0, 0), PositionFlags::NO_SIZE)?;
        desktop.set_position(
            pinned,
            Some(ZOrder::Topmost),
            Rectangle::new(0, 0, 0, 0),
            PositionFlags::NO_SIZE | PositionFlags::NO_ZORDER,
        )?;
        desktop.activate(plain)?;

        assert!(!desktop.is_topmost(plain));
        assert!(!desktop.is_topmost(pinned));
        Ok(())
    }

    #[test]
    fn test_unresponsive_window_fails_control_calls() {
        let desktop = desktop();
        let handle = desktop.add_window(HeadlessWindow::new(0x100, 10, "Edit").unresponsive());

        assert_eq!(desktop.activate(handle), Err(NativeError::Unresponsive(handle)));
        assert_eq!(desktop.minimize(handle), Err(NativeError::Unresponsive(handle)));
        // Reads still work on a hung window.
        assert!(desktop.title(handle).is_ok());
    }

    #[test]
    fn test_injected_fault_fires_once() {
        let desktop = desktop();
        let handle = desktop.add_window(HeadlessWindow::new(0x100, 10, "Edit"));
        desktop.inject_fault(handle, Operation::SetStyle);

        assert!(desktop.set_style(handle, WindowStyle::empty()).is_err());
        assert!(desktop.set_style(handle, WindowStyle::empty()).is_ok());
        assert_eq!(desktop.calls_for(handle).len(), 2);
    }

    #[test]
    fn test_removed_window_is_gone() {
        let desktop = desktop();
        let handle = desktop.add_window(HeadlessWindow::new(0x100, 10, "Edit"));
        desktop.set_active(Some(handle));
        desktop.remove_window(handle);

        assert_eq!(desktop.title(handle), Err(NativeError::NotFound(handle)));
        assert_eq!(desktop.active_window(), Ok(None));
        assert!(desktop.enumerate_windows().map(|h| h.is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_hidden_owner_is_access_denied() {
        let desktop = desktop();
        desktop.add_process(20, None, "C:\\Windows\\system32\\svc.exe");
        assert!(matches!(
            desktop.process_owner(ProcessId(20)),
            Err(NativeError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_visibility_states() -> anyhow::Result<()> {
        let desktop = desktop();
        let handle = desktop.add_window(HeadlessWindow::new(0x100, 10, "Edit"));
        assert!(desktop.visibility_states(handle)?.contains(VisibilityStates::RESTORED));

        desktop.minimize(handle)?;
        let states = desktop.visibility_states(handle)?;
        assert!(states.contains(VisibilityStates::MINIMIZED));
        assert!(!states.contains(VisibilityStates::RESTORED));

        desktop.restore(handle)?;
        desktop.activate(handle)?;
        let states = desktop.visibility_states(handle)?;
        assert!(states.contains(VisibilityStates::RESTORED | VisibilityStates::FOCUSED));
        Ok(())
    }
}
