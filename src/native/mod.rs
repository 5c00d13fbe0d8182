//! Native window capability surface
//!
//! Everything the mapper needs from the operating system goes through the
//! [`NativeSurface`] trait: handle enumeration, style and position control,
//! visibility changes and process/owner lookups. Each call may fail with a
//! [`NativeError`]; callers must never assume success.
//!
//! The mutation happens on the OS side, so every method takes `&self`. A
//! surface is shared between the mapper and the restoration ledger, which is
//! why implementations must be `Send + Sync`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod headless;

pub use headless::HeadlessDesktop;

/// Opaque OS reference to a top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// OS process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User and domain that own a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user: String,
    pub domain: String,
}

impl UserIdentity {
    pub fn new(user: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            domain: domain.into(),
        }
    }

    /// Placeholder identity recorded when the owner could not be read.
    /// It never equals a real identity.
    pub fn aborted() -> Self {
        Self::new("[aborted]", "[aborted]")
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.domain)
    }
}

/// Rectangle for window positioning and sizing, in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Right edge, clamped to the `i32` range.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }
}

bitflags! {
    /// Window style bits the mapper reads and rewrites.
    ///
    /// Bit values follow the Win32 `WS_*` constants. Bits the mapper does not
    /// name are carried through unchanged so a snapshot restores exactly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct WindowStyle: u32 {
        /// Thin-line border (`WS_BORDER`).
        const BORDER = 0x0080_0000;
        /// Dialog frame; together with `BORDER` forms the title bar (`WS_DLGFRAME`).
        const DIALOG_FRAME = 0x0040_0000;
        /// Sizing border (`WS_THICKFRAME`).
        const SIZE_BORDER = 0x0004_0000;

        const _ = !0;
    }
}

impl WindowStyle {
    /// The bits that make up an OS-drawn title bar.
    pub const TITLE: WindowStyle = WindowStyle::BORDER.union(WindowStyle::DIALOG_FRAME);
}

bitflags! {
    /// Flags accepted by [`NativeSurface::set_position`] (`SWP_*` values).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PositionFlags: u32 {
        const NO_SIZE = 0x0001;
        const NO_ZORDER = 0x0004;
        const FRAME_CHANGED = 0x0020;
        const DRAW_FRAME = 0x0020;
        const ASYNC_WINDOW_POS = 0x4000;
    }
}

bitflags! {
    /// Visibility state set of a window.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct VisibilityStates: u32 {
        const VISIBLE = 0x01;
        const MINIMIZED = 0x02;
        const MAXIMIZED = 0x04;
        const RESTORED = 0x08;
        const FOCUSED = 0x10;
    }
}

/// Z-order placement requested alongside a position change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZOrder {
    Topmost,
}

/// Failure reported by a native window operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    #[error("window {0} does not exist")]
    NotFound(WindowHandle),

    #[error("process {0} does not exist")]
    ProcessNotFound(ProcessId),

    #[error("access denied during {operation}")]
    AccessDenied { operation: &'static str },

    #[error("window {0} is not responding")]
    Unresponsive(WindowHandle),

    #[error("{operation} failed with OS error {code}")]
    Os { operation: &'static str, code: i32 },
}

impl NativeError {
    /// True when the failure means the window or process vanished.
    pub fn is_gone(&self) -> bool {
        matches!(self, NativeError::NotFound(_) | NativeError::ProcessNotFound(_))
    }
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// The OS operations the mapper is built on.
pub trait NativeSurface: Send + Sync {
    /// All top-level window handles, in OS enumeration order.
    fn enumerate_windows(&self) -> NativeResult<Vec<WindowHandle>>;

    fn style(&self, handle: WindowHandle) -> NativeResult<WindowStyle>;

    fn set_style(&self, handle: WindowHandle, style: WindowStyle) -> NativeResult<()>;

    /// Moves and resizes the window. With [`PositionFlags::NO_SIZE`] the
    /// width and height of `rect` are ignored.
    fn set_position(
        &self,
        handle: WindowHandle,
        z_order: Option<ZOrder>,
        rect: Rectangle,
        flags: PositionFlags,
    ) -> NativeResult<()>;

    /// Plain move/resize without z-order or frame handling.
    fn move_resize(&self, handle: WindowHandle, rect: Rectangle) -> NativeResult<()>;

    /// Outer rectangle of the window, including any border.
    fn border_rectangle(&self, handle: WindowHandle) -> NativeResult<Rectangle>;

    fn redraw(&self, handle: WindowHandle) -> NativeResult<()>;

    fn title(&self, handle: WindowHandle) -> NativeResult<String>;

    /// Window class name; `None` when the OS reports no class.
    fn class_name(&self, handle: WindowHandle) -> NativeResult<Option<String>>;

    fn is_visible(&self, handle: WindowHandle) -> NativeResult<bool>;

    fn visibility_states(&self, handle: WindowHandle) -> NativeResult<VisibilityStates>;

    fn activate(&self, handle: WindowHandle) -> NativeResult<()>;

    fn minimize(&self, handle: WindowHandle) -> NativeResult<()>;

    fn maximize(&self, handle: WindowHandle) -> NativeResult<()>;

    fn restore(&self, handle: WindowHandle) -> NativeResult<()>;

    fn process_id(&self, handle: WindowHandle) -> NativeResult<ProcessId>;

    fn process_owner(&self, pid: ProcessId) -> NativeResult<UserIdentity>;

    /// Path of the module that created the window.
    fn module_filename(&self, handle: WindowHandle) -> NativeResult<String>;

    fn executable_filename(&self, pid: ProcessId) -> NativeResult<String>;

    /// The window that currently has native focus, if any.
    fn active_window(&self) -> NativeResult<Option<WindowHandle>>;

    fn current_process_id(&self) -> ProcessId;

    fn current_identity(&self) -> NativeResult<UserIdentity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_style_bits_survive() {
        let raw = 0x1000_0000 | WindowStyle::BORDER.bits();
        let style = WindowStyle::from_bits_retain(raw);
        let stripped = style.difference(WindowStyle::BORDER);
        assert_eq!(stripped.bits(), 0x1000_0000);
        assert_eq!(stripped.union(WindowStyle::BORDER).bits(), raw);
    }

    #[test]
    fn test_title_is_border_and_dialog_frame() {
        assert!(WindowStyle::TITLE.contains(WindowStyle::BORDER));
        assert!(WindowStyle::TITLE.contains(WindowStyle::DIALOG_FRAME));
        assert!(!WindowStyle::TITLE.contains(WindowStyle::SIZE_BORDER));
    }

    #[test]
    fn test_rectangle_edges() {
        let rect = Rectangle::new(10, 20, 300, 200);
        assert_eq!(rect.right(), 310);
        assert_eq!(rect.bottom(), 220);
        assert_eq!(rect.size(), (300, 200));

        let far = Rectangle::new(i32::MAX - 1, i32::MIN, 10, -10);
        assert_eq!(far.right(), i32::MAX);
        assert_eq!(far.bottom(), i32::MIN);
    }

    #[test]
    fn test_aborted_identity_never_matches() {
        let me = UserIdentity::new("alice", "WORKGROUP");
        assert_ne!(UserIdentity::aborted(), me);
        assert_eq!(me.to_string(), "alice@WORKGROUP");
    }

    #[test]
    fn test_gone_errors() {
        assert!(NativeError::NotFound(WindowHandle(1)).is_gone());
        assert!(!NativeError::Unresponsive(WindowHandle(1)).is_gone());
        assert!(!NativeError::AccessDenied { operation: "owner" }.is_gone());
    }
}
