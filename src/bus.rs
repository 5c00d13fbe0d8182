//! Event bus boundary
//!
//! The mapper subscribes to OS notifications ([`OsEvent`]) and to commands
//! from the layout, focus and z-order subsystems ([`Command`]). What it learns
//! is published as [`PublishedEvent`]s through an [`EventSink`].
//!
//! Message shapes are tagged JSON/TOML objects so they can be logged, replayed
//! from scenario files and forwarded over channels unchanged.

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::ids::CorrelationId;
use crate::native::WindowHandle;
use crate::window::{HorizontalSnap, VerticalSnap, WindowInfo};

/// Addressee of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    /// Broadcast wildcard
    Any,
    /// A specific tracked window
    Window(CorrelationId),
    /// The portal that collects windows outside tile management
    UnownedPortal,
    /// The mapper itself
    WindowMapper,
}

impl Target {
    pub fn cid(&self) -> Option<CorrelationId> {
        match self {
            Target::Window(cid) => Some(*cid),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Any => write!(f, "any"),
            Target::Window(cid) => write!(f, "{}", cid),
            Target::UnownedPortal => write!(f, "unowned-portal"),
            Target::WindowMapper => write!(f, "window-mapper"),
        }
    }
}

/// Notifications originating from the operating system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum OsEvent {
    WindowCreated {
        target_hwnd: WindowHandle,
    },
    WindowDestroyed {
        target_hwnd: WindowHandle,
    },
    /// Depending on the hook that produced it, the focused window arrives as
    /// either the target or the source handle.
    WindowFocused {
        #[serde(default)]
        target_hwnd: Option<WindowHandle>,
        #[serde(default)]
        source_hwnd: Option<WindowHandle>,
    },
    WindowMinimized {
        target_hwnd: WindowHandle,
    },
    WindowRedraw {
        target_hwnd: WindowHandle,
    },
    WindowForcedEnd {
        target_hwnd: WindowHandle,
    },
    /// A hung window is about to be replaced by a ghost window.
    WindowReplacing {
        target_hwnd: WindowHandle,
    },
    /// A window came back from being hung under a different handle.
    WindowReplaced {
        target_hwnd: WindowHandle,
        #[serde(default)]
        replacement_hwnd: Option<WindowHandle>,
    },
    WindowFlash {
        target_hwnd: WindowHandle,
    },
}

/// Requests from upstream subsystems. The target cid travels next to the
/// command in [`Inbound::Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    /// Place the window. Without all four coordinates only `make_focused`
    /// is honoured.
    SetRectangle {
        #[serde(default)]
        x: Option<i32>,
        #[serde(default)]
        y: Option<i32>,
        #[serde(default)]
        width: Option<i32>,
        #[serde(default)]
        height: Option<i32>,
        #[serde(default)]
        make_focused: bool,
        #[serde(default)]
        h_snap: HorizontalSnap,
        #[serde(default)]
        v_snap: VerticalSnap,
    },
    FocusWindow,
    SetWindowOnTop,
    MinimizeWindow,
    MaximizeWindow,
    /// Grow or shrink the window by a delta.
    ResizeWindow {
        #[serde(default)]
        adjust_x: i32,
        #[serde(default)]
        adjust_y: i32,
    },
    MakeOwnedPortalActive,
    ResendCreatedEvents,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetRectangle { .. } => "set-rectangle",
            Command::FocusWindow => "focus-window",
            Command::SetWindowOnTop => "set-window-on-top",
            Command::MinimizeWindow => "minimize-window",
            Command::MaximizeWindow => "maximize-window",
            Command::ResizeWindow { .. } => "resize-window",
            Command::MakeOwnedPortalActive => "make-owned-portal-active",
            Command::ResendCreatedEvents => "resend-created-events",
        }
    }
}

/// Anything delivered to the mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Inbound {
    Os { event: OsEvent },
    Command { target: Target, command: Command },
}

impl Inbound {
    pub fn os(event: OsEvent) -> Self {
        Inbound::Os { event }
    }

    pub fn command(target: Target, command: Command) -> Self {
        Inbound::Command { target, command }
    }

    /// Command addressed to one window.
    pub fn to_window(cid: CorrelationId, command: Command) -> Self {
        Inbound::Command {
            target: Target::Window(cid),
            command,
        }
    }
}

/// Kinds of event the mapper publishes downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowEventKind {
    #[serde(rename = "window-created")]
    Created,
    #[serde(rename = "window-closed")]
    Closed,
    #[serde(rename = "window-focused")]
    Focused,
    #[serde(rename = "window-redraw")]
    Redraw,
    #[serde(rename = "window-flashing")]
    Flashing,
    #[serde(rename = "window-put-outside-management")]
    PutOutsideManagement,
}

/// An event published to downstream consumers, always carrying a fresh
/// window snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub kind: WindowEventKind,
    pub target: Target,
    pub cid: CorrelationId,
    pub info: WindowInfo,
}

impl PublishedEvent {
    /// Event addressed to the window it describes.
    pub fn for_window(kind: WindowEventKind, info: WindowInfo) -> Self {
        Self {
            kind,
            target: Target::Window(info.cid),
            cid: info.cid,
            info,
        }
    }
}

/// Destination of published events.
pub trait EventSink: Send {
    fn publish(&mut self, event: PublishedEvent);
}

/// Sink that keeps every event in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<PublishedEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<WindowEventKind> {
        self.events.lock().iter().map(|event| event.kind).collect()
    }

    /// Events of one kind, in publish order.
    pub fn of_kind(&self, kind: WindowEventKind) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind == kind)
            .cloned()
            .collect()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<PublishedEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&mut self, event: PublishedEvent) {
        self.events.lock().push(event);
    }
}

impl EventSink for mpsc::UnboundedSender<PublishedEvent> {
    fn publish(&mut self, event: PublishedEvent) {
        if let Err(e) = self.send(event) {
            debug!("Dropping {:?} event, receiver closed", e.0.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_event_from_json() -> anyhow::Result<()> {
        let event: OsEvent = serde_json::from_str(r#"{"event":"window-focused","source_hwnd":32}"#)?;
        assert_eq!(
            event,
            OsEvent::WindowFocused {
                target_hwnd: None,
                source_hwnd: Some(WindowHandle(32)),
            }
        );
        Ok(())
    }

    #[test]
    fn test_set_rectangle_defaults() -> anyhow::Result<()> {
        let command: Command = serde_json::from_str(
            r#"{"command":"set-rectangle","x":1,"y":2,"width":3,"height":4,"v_snap":" Bottom "}"#,
        )?;
        match command {
            Command::SetRectangle {
                make_focused,
                h_snap,
                v_snap,
                ..
            } => {
                assert!(!make_focused);
                assert_eq!(h_snap, HorizontalSnap::Left);
                assert_eq!(v_snap, VerticalSnap::Bottom);
            }
            other => panic!("unexpected command {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_set_rectangle_null_snaps() -> anyhow::Result<()> {
        let command: Command = serde_json::from_str(
            r#"{"command":"set-rectangle","x":1,"y":2,"width":3,"height":4,"h_snap":null,"v_snap":null}"#,
        )?;
        match command {
            Command::SetRectangle { h_snap, v_snap, .. } => {
                assert_eq!(h_snap, HorizontalSnap::Left);
                assert_eq!(v_snap, VerticalSnap::Top);
            }
            other => panic!("unexpected command {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_inbound_command_from_toml()-> anyhow::Result<()> {
        let inbound: Inbound = toml::from_str(
            r#"
            kind = "command"
            target = { window = 4 }
            command = { command = "resize-window", adjust_x = -20 }
            "#,
        )?;
        assert_eq!(
            inbound,
            Inbound::to_window(
                CorrelationId(4),
                Command::ResizeWindow {
                    adjust_x: -20,
                    adjust_y: 0
                }
            )
        );
        Ok(())
    }

    #[test]
    fn test_published_kind_names() -> anyhow::Result<()> {
        assert_eq!(
            serde_json::to_string(&WindowEventKind::PutOutsideManagement)?,
            r#""window-put-outside-management""#
        );
        assert_eq!(serde_json::to_string(&WindowEventKind::Created)?, r#""window-created""#);
        Ok(())
    }

    #[test]
    fn test_recording_sink_clones_share_buffer() {
        use crate::native::{ProcessId, Rectangle, VisibilityStates};

        let sink = RecordingSink::new();
        let mut publisher = sink.clone();
        let info = WindowInfo {
            cid: CorrelationId(1),
            handle: WindowHandle(0x10),
            title: String::new(),
            border: Rectangle::default(),
            visibility: VisibilityStates::empty(),
            class_name: "Edit".to_string(),
            module_filename: String::new(),
            exec_filename: String::new(),
            pid: ProcessId(2),
            visible: true,
        };
        publisher.publish(PublishedEvent::for_window(WindowEventKind::Redraw, info));

        assert_eq!(sink.kinds(), vec![WindowEventKind::Redraw]);
        assert_eq!(sink.events()[0].target, Target::Window(CorrelationId(1)));
        assert_eq!(sink.take().len(), 1);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        use crate::native::{ProcessId, Rectangle, VisibilityStates};

        let (mut tx, mut rx) = mpsc::unbounded_channel::<PublishedEvent>();
        let info = WindowInfo {
            cid: CorrelationId(2),
            handle: WindowHandle(0x20),
            title: "t".to_string(),
            border: Rectangle::default(),
            visibility: VisibilityStates::VISIBLE,
            class_name: "Edit".to_string(),
            module_filename: String::new(),
            exec_filename: String::new(),
            pid: ProcessId(2),
            visible: true,
        };
        tx.publish(PublishedEvent::for_window(WindowEventKind::Closed, info));

        let received = rx.recv().await.map(|event| event.kind);
        assert_eq!(received, Some(WindowEventKind::Closed));
    }
}
