//! Window policy
//!
//! The mapper never decides on its own whether a window tiles or keeps its
//! chrome; it asks a [`WindowPolicy`]. [`RulePolicy`] answers from the
//! `[shell]` and `[applications]` configuration sections.

use crate::config::{ApplicationRule, ApplicationsConfig, ShellConfig, WinmapConfig};
use crate::window::WindowInfo;

/// Side-effect-free predicates over a window snapshot.
#[cfg_attr(test, mockall::automock)]
pub trait WindowPolicy: Send {
    /// The window is handed to the layout engine.
    fn is_tiled(&self, info: &WindowInfo) -> bool;

    /// The window keeps its OS title bar.
    fn has_title(&self, info: &WindowInfo) -> bool;

    /// The window keeps its OS sizing border.
    fn has_border(&self, info: &WindowInfo) -> bool;

    /// The window may be given a new size, not just a new position.
    fn is_resizable(&self, info: &WindowInfo) -> bool;

    /// The window belongs to the desktop shell and is left alone.
    fn matches_shell_window(&self, info: &WindowInfo) -> bool;
}

/// Policy driven by configuration rules.
#[derive(Debug, Clone, Default)]
pub struct RulePolicy {
    shell: ShellConfig,
    applications: ApplicationsConfig,
}

impl RulePolicy {
    pub fn new(shell: ShellConfig, applications: ApplicationsConfig) -> Self {
        Self {
            shell,
            applications,
        }
    }

    pub fn from_config(config: &WinmapConfig) -> Self {
        Self::new(config.shell.clone(), config.applications.clone())
    }

    /// First matching rule that sets the value wins, then the default.
    fn resolve(
        &self,
        info: &WindowInfo,
        pick: impl Fn(&ApplicationRule) -> Option<bool>,
        default: bool,
    ) -> bool {
        self.applications
            .rules
            .iter()
            .filter(|rule| rule_matches(rule, info))
            .find_map(pick)
            .unwrap_or(default)
    }
}

fn ends_with_ignore_case(value: &str, suffix: &str) -> bool {
    value.to_lowercase().ends_with(&suffix.to_lowercase())
}

fn rule_matches(rule: &ApplicationRule, info: &WindowInfo) -> bool {
    if !rule.has_matcher() {
        return false;
    }
    if let Some(class) = &rule.class {
        if *class != info.class_name {
            return false;
        }
    }
    if let Some(suffix) = &rule.executable_suffix {
        if !ends_with_ignore_case(&info.exec_filename, suffix) {
            return false;
        }
    }
    if let Some(fragment) = &rule.title_contains {
        if !info.title.contains(fragment.as_str()) {
            return false;
        }
    }
    true
}

impl WindowPolicy for RulePolicy {
    fn is_tiled(&self, info: &WindowInfo) -> bool {
        self.resolve(info, |rule| rule.tiled, self.applications.defaults.tiled)
    }

    fn has_title(&self, info: &WindowInfo) -> bool {
        self.resolve(info, |rule| rule.title, self.applications.defaults.title)
    }

    fn has_border(&self, info: &WindowInfo) -> bool {
        self.resolve(info, |rule| rule.border, self.applications.defaults.border)
    }

    fn is_resizable(&self, info: &WindowInfo) -> bool {
        self.resolve(info, |rule| rule.resizable, self.applications.defaults.resizable)
    }

    fn matches_shell_window(&self, info: &WindowInfo) -> bool {
        !self.shell.executable_suffix.is_empty()
            && ends_with_ignore_case(&info.exec_filename, &self.shell.executable_suffix)
            && !self
                .shell
                .file_browser_classes
                .iter()
                .any(|class| *class == info.class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::CorrelationId;
    use crate::native::{ProcessId, Rectangle, VisibilityStates, WindowHandle};

    fn info(class: &str, exec: &str, title: &str) -> WindowInfo {
        WindowInfo {
            cid: CorrelationId(1),
            handle: WindowHandle(0x1),
            title: title.to_string(),
            border: Rectangle::default(),
            visibility: VisibilityStates::VISIBLE,
            class_name: class.to_string(),
            module_filename: String::new(),
            exec_filename: exec.to_string(),
            pid: ProcessId(100),
            visible: true,
        }
    }

    #[test]
    fn test_defaults_apply_without_rules() {
        let policy = RulePolicy::from_config(&WinmapConfig::default());
        let window = info("Notepad", "C:\\Windows\\notepad.exe", "untitled");

        assert!(policy.is_tiled(&window));
        assert!(!policy.has_title(&window));
        assert!(!policy.has_border(&window));
        assert!(policy.is_resizable(&window));
    }

    #[test]
    fn test_shell_windows_are_detected() {
        let policy = RulePolicy::from_config(&WinmapConfig::default());

        assert!(policy.matches_shell_window(&info("Shell_TrayWnd", "C:\\Windows\\EXPLORER.EXE", "")));
        assert!(!policy.matches_shell_window(&info("CabinetWClass", "C:\\Windows\\explorer.exe", "Downloads")));
        assert!(!policy.matches_shell_window(&info("Notepad", "C:\\Windows\\notepad.exe", "")));
    }

    #[test]
    fn test_first_matching_rule_wins_per_value() {
        let mut config = WinmapConfig::default();
        config.applications.rules = vec![
            ApplicationRule {
                class: Some("ConsoleWindowClass".to_string()),
                resizable: Some(false),
                ..ApplicationRule::default()
            },
            ApplicationRule {
                executable_suffix: Some("\\CMD.exe".to_string()),
                resizable: Some(true),
                title: Some(true),
                ..ApplicationRule::default()
            },
        ];
        let policy = RulePolicy::from_config(&config);
        let console = info("ConsoleWindowClass", "C:\\Windows\\system32\\cmd.exe", "cmd");

        // First rule sets resizable, second supplies title.
        assert!(!policy.is_resizable(&console));
        assert!(policy.has_title(&console));
        assert!(!policy.has_border(&console));
    }

    #[test]
    fn test_title_rule() {
        let mut config = WinmapConfig::default();
        config.applications.rules.push(ApplicationRule {
            title_contains: Some("Picture-in-picture".to_string()),
            tiled: Some(false),
            ..ApplicationRule::default()
        });
        let policy = RulePolicy::from_config(&config);

        assert!(!policy.is_tiled(&info("Chrome_WidgetWin_1", "C:\\chrome.exe", "Picture-in-picture")));
        assert!(policy.is_tiled(&info("Chrome_WidgetWin_1", "C:\\chrome.exe", "Inbox")));
    }
}
