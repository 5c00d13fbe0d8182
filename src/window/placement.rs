//! Window placement
//!
//! Moves and resizes windows to the rectangles the layout engine asks for,
//! then checks what the OS actually did. A window that refuses the exact
//! size (minimum-size constraints, fixed-size dialogs) is snapped inside the
//! requested rectangle according to its horizontal and vertical anchors.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::native::{NativeResult, NativeSurface, PositionFlags, Rectangle, WindowHandle, ZOrder};

/// Horizontal anchor inside the requested rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", rename_all = "lowercase")]
pub enum HorizontalSnap {
    #[default]
    Left,
    Center,
    Right,
}

/// Vertical anchor inside the requested rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", rename_all = "lowercase")]
pub enum VerticalSnap {
    #[default]
    Top,
    Center,
    Bottom,
}

impl From<&str> for HorizontalSnap {
    /// Lenient parse: surrounding whitespace and case are ignored and
    /// anything unrecognised means `left`.
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "right" => HorizontalSnap::Right,
            "center" => HorizontalSnap::Center,
            _ => HorizontalSnap::Left,
        }
    }
}

impl From<Option<String>> for HorizontalSnap {
    /// A missing or null anchor means `left`.
    fn from(value: Option<String>) -> Self {
        value.as_deref().map(HorizontalSnap::from).unwrap_or_default()
    }
}

impl From<&str> for VerticalSnap {
    /// Lenient parse: surrounding whitespace and case are ignored and
    /// anything unrecognised means `top`.
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "bottom" => VerticalSnap::Bottom,
            "center" => VerticalSnap::Center,
            _ => VerticalSnap::Top,
        }
    }
}

impl From<Option<String>> for VerticalSnap {
    /// A missing or null anchor means `top`.
    fn from(value: Option<String>) -> Self {
        value.as_deref().map(VerticalSnap::from).unwrap_or_default()
    }
}

/// A resolved move/resize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementRequest {
    pub rect: Rectangle,
    pub make_focused: bool,
    pub h_snap: HorizontalSnap,
    pub v_snap: VerticalSnap,
}

/// How the window ended up placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// The OS applied the requested rectangle as-is.
    Exact,
    /// The window kept its own size and was anchored at this position.
    Snapped { x: i32, y: i32 },
}

/// Position of a window of size `actual` anchored inside `envelope`.
pub fn snap_position(
    envelope: Rectangle,
    actual: (i32, i32),
    h_snap: HorizontalSnap,
    v_snap: VerticalSnap,
) -> (i32, i32) {
    let (actual_width, actual_height) = actual;
    // Coordinates come straight from commands; clamp instead of overflowing.
    let x = match h_snap {
        HorizontalSnap::Left => envelope.x,
        HorizontalSnap::Center => envelope
            .x
            .saturating_add(envelope.width.div_euclid(2))
            .saturating_sub(actual_width.div_euclid(2)),
        HorizontalSnap::Right => envelope.right().saturating_sub(actual_width),
    };
    let y = match v_snap {
        VerticalSnap::Top => envelope.y,
        VerticalSnap::Center => envelope
            .y
            .saturating_add(envelope.height.div_euclid(2))
            .saturating_sub(actual_height.div_euclid(2)),
        VerticalSnap::Bottom => envelope.bottom().saturating_sub(actual_height),
    };
    (x, y)
}

/// Places a window, falling back to snapping when it will not take the
/// requested size or must not be resized at all.
///
/// Any error means the window did not respond to the placement.
pub fn move_resize_window(
    surface: &dyn NativeSurface,
    handle: WindowHandle,
    request: &PlacementRequest,
    do_resize: bool,
) -> NativeResult<PlacementOutcome> {
    // The final size is read back right away, so the resize is synchronous.
    let mut flags = PositionFlags::FRAME_CHANGED | PositionFlags::DRAW_FRAME;
    if !do_resize {
        flags |= PositionFlags::NO_SIZE | PositionFlags::ASYNC_WINDOW_POS;
    }
    let z_order = request.make_focused.then_some(ZOrder::Topmost);

    if do_resize {
        surface.set_position(handle, z_order, request.rect, flags)?;
    }

    let final_rect = surface.border_rectangle(handle)?;
    if do_resize && final_rect.size() == request.rect.size() {
        return Ok(PlacementOutcome::Exact);
    }

    debug!(
        "Window {} requested {}x{}, found {}x{}; snapping {:?}/{:?}",
        handle,
        request.rect.width,
        request.rect.height,
        final_rect.width,
        final_rect.height,
        request.h_snap,
        request.v_snap
    );
    let (x, y) = snap_position(request.rect, final_rect.size(), request.h_snap, request.v_snap);
    flags |= PositionFlags::NO_SIZE | PositionFlags::ASYNC_WINDOW_POS;
    surface.set_position(handle, z_order, Rectangle::new(x, y, 0, 0), flags)?;
    Ok(PlacementOutcome::Snapped { x, y })
}
