//! Chrome (OS border and title bar) stripping
//!
//! Windows the policy wants "clean" for tiling lose their title bar and/or
//! sizing border. The original appearance is captured first and handed to
//! the restoration ledger before any style bit changes.

use log::debug;
use std::sync::Arc;

use super::restore::{RestorationLedger, RestoreGuard, RestoreSnapshot};
use super::WindowInfo;
use crate::native::{NativeResult, NativeSurface, WindowHandle, WindowStyle};
use crate::policy::WindowPolicy;

/// What to strip from a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChromeDecision {
    pub should_modify: bool,
    pub remove_border: bool,
    pub remove_title: bool,
}

impl ChromeDecision {
    /// Leave the window exactly as the OS drew it.
    pub const UNTOUCHED: ChromeDecision = ChromeDecision {
        should_modify: false,
        remove_border: false,
        remove_title: false,
    };

    /// Style bits that must be cleared.
    pub fn cleared_bits(&self) -> WindowStyle {
        let mut bits = WindowStyle::empty();
        if self.remove_title {
            bits |= WindowStyle::TITLE;
        }
        if self.remove_border {
            bits |= WindowStyle::SIZE_BORDER;
        }
        bits
    }
}

/// Decides how a window's chrome is treated. Invisible and shell windows
/// are never touched; everything else is modified unless the policy wants
/// both the title and the border.
pub fn chrome_policy(info: &WindowInfo, policy: &dyn WindowPolicy) -> ChromeDecision {
    if !info.visible || policy.matches_shell_window(info) {
        return ChromeDecision::UNTOUCHED;
    }
    let has_title = policy.has_title(info);
    let has_border = policy.has_border(info);
    ChromeDecision {
        should_modify: !(has_title && has_border),
        remove_border: !has_border,
        remove_title: !has_title,
    }
}

/// Snapshots the window, arms its restoration, then strips the chrome.
///
/// Reading the snapshot can fail if the window is already gone; that error
/// is returned and nothing is modified. A failed style write only leaves the
/// window with more chrome than wanted.
pub fn strip_chrome(
    surface: &dyn NativeSurface,
    ledger: &Arc<RestorationLedger>,
    handle: WindowHandle,
    decision: ChromeDecision,
) -> NativeResult<RestoreGuard> {
    let snapshot = RestoreSnapshot {
        rect: surface.border_rectangle(handle)?,
        style: surface.style(handle)?,
    };
    let guard = ledger.arm(handle, snapshot);

    let cleared = decision.cleared_bits();
    if !cleared.is_empty() {
        if let Err(e) = surface.set_style(handle, snapshot.style.difference(cleared)) {
            debug!("Problem setting style for window {}: {}", handle, e);
        }
        if let Err(e) = surface.redraw(handle) {
            debug!("Problem redrawing window {}: {}", handle, e);
        }
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::CorrelationId;
    use crate::native::headless::{HeadlessWindow, NativeCall, Operation, DECORATED_STYLE};
    use crate::native::{HeadlessDesktop, ProcessId, Rectangle, UserIdentity, VisibilityStates};
    use crate::policy::MockWindowPolicy;

    fn info(visible: bool) -> WindowInfo {
        WindowInfo {
            cid: CorrelationId(3),
            handle: WindowHandle(0x30),
            title: "doc".to_string(),
            border: Rectangle::new(0, 0, 800, 600),
            visibility: VisibilityStates::VISIBLE,
            class_name: "Edit".to_string(),
            module_filename: String::new(),
            exec_filename: "C:\\apps\\edit.exe".to_string(),
            pid: ProcessId(9),
            visible,
        }
    }

    fn policy(shell: bool, title: bool, border: bool) -> MockWindowPolicy {
        let mut policy = MockWindowPolicy::new();
        policy.expect_matches_shell_window().return_const(shell);
        policy.expect_has_title().return_const(title);
        policy.expect_has_border().return_const(border);
        policy
    }

    #[test]
    fn test_invisible_window_untouched() {
        let mut policy = MockWindowPolicy::new();
        policy.expect_matches_shell_window().never();
        policy.expect_has_title().never();
        assert_eq!(chrome_policy(&info(false), &policy), ChromeDecision::UNTOUCHED);
    }

    #[test]
    fn test_shell_window_untouched() {
        let mut policy = MockWindowPolicy::new();
        policy.expect_matches_shell_window().return_const(true);
        policy.expect_has_title().never();
        policy.expect_has_border().never();
        assert_eq!(chrome_policy(&info(true), &policy), ChromeDecision::UNTOUCHED);
    }

    #[test]
    fn test_title_and_border_wanted_means_no_modification() {
        let decision = chrome_policy(&info(true), &policy(false, true, true));
        assert!(!decision.should_modify);
        assert!(decision.cleared_bits().is_empty());
    }

    #[test]
    fn test_decision_table() {
        let decision = chrome_policy(&info(true), &policy(false, false, true));
        assert_eq!(
            decision,
            ChromeDecision {
                should_modify: true,
                remove_border: false,
                remove_title: true
            }
        );
        assert_eq!(decision.cleared_bits(), WindowStyle::TITLE);

        let decision = chrome_policy(&info(true), &policy(false, true, false));
        assert!(decision.should_modify);
        assert_eq!(decision.cleared_bits(), WindowStyle::SIZE_BORDER);

        let decision = chrome_policy(&info(true), &policy(false, false, false));
        assert_eq!(decision.cleared_bits(), WindowStyle::TITLE | WindowStyle::SIZE_BORDER);
    }

    fn desktop() -> Arc<HeadlessDesktop> {
        let desktop = Arc::new(HeadlessDesktop::new(1, UserIdentity::new("me", "HOST")));
        desktop.add_window(HeadlessWindow::new(0x30, 9, "Edit").with_rect(Rectangle::new(4, 4, 640, 480)));
        desktop
    }

    #[test]
    fn test_strip_arms_before_modifying() -> anyhow::Result<()> {
        let desktop = desktop();
        let ledger = RestorationLedger::new(desktop.clone());
        let handle = WindowHandle(0x30);
        let decision = ChromeDecision {
            should_modify: true,
            remove_border: true,
            remove_title: true,
        };

        let guard = strip_chrome(desktop.as_ref(), &ledger, handle, decision)?;

        assert!(ledger.is_pending(handle));
        assert_eq!(guard.snapshot().style, DECORATED_STYLE);
        assert_eq!(guard.snapshot().rect, Rectangle::new(4, 4, 640, 480));
        let window = desktop.window(handle).expect("window exists");
        assert!(!window.style.intersects(DECORATED_STYLE));
        assert!(matches!(desktop.journal().last(), Some(NativeCall::Redraw { .. })));

        drop(guard);
        assert_eq!(desktop.window(handle).map(|w| w.style), Some(DECORATED_STYLE));
        Ok(())
    }

    #[test]
    fn test_style_failure_still_arms_restoration() -> anyhow::Result<()> {
        let desktop = desktop();
        let ledger = RestorationLedger::new(desktop.clone());
        let handle = WindowHandle(0x30);
        desktop.inject_fault(handle, Operation::SetStyle);

        let guard = strip_chrome(
            desktop.as_ref(),
            &ledger,
            handle,
            ChromeDecision {
                should_modify: true,
                remove_border: false,
                remove_title: true,
            },
        )?;

        assert!(ledger.is_pending(guard.handle()));
        assert_eq!(desktop.window(handle).map(|w| w.style), Some(DECORATED_STYLE));
        Ok(())
    }

    #[test]
    fn test_vanished_window_is_not_armed() {
        let desktop = desktop();
        let ledger = RestorationLedger::new(desktop.clone());
        desktop.remove_window(WindowHandle(0x30));

        let result = strip_chrome(
            desktop.as_ref(),
            &ledger,
            WindowHandle(0x30),
            ChromeDecision {
                should_modify: true,
                remove_border: true,
                remove_title: true,
            },
        );

        assert!(result.is_err());
        assert_eq!(ledger.pending_count(), 0);
    }
}
