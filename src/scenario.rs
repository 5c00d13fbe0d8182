//! Replay scenarios
//!
//! A scenario is a TOML file describing a headless desktop (the identity the
//! manager runs as, processes, windows) and a script of inbound events. The
//! `winmap replay` command seeds a [`HeadlessDesktop`] from it, builds a
//! mapper on top and feeds it the script.
//!
//! ```toml
//! [identity]
//! user = "alice"
//! domain = "WORKGROUP"
//!
//! [[windows]]
//! handle = 0x10
//! pid = 100
//! class_name = "Notepad"
//! title = "notes.txt - Notepad"
//!
//! [[events]]
//! kind = "command"
//! target = { window = 1 }
//! command = { command = "focus-window" }
//! ```

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::bus::{EventSink, Inbound};
use crate::config::WinmapConfig;
use crate::ids::SequentialIdAllocator;
use crate::mapper::WindowMapper;
use crate::native::headless::{HeadlessProcess, HeadlessWindow};
use crate::native::{HeadlessDesktop, ProcessId, Rectangle, UserIdentity};
use crate::policy::RulePolicy;

/// The identity and process the manager runs as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioIdentity {
    pub pid: u32,
    pub user: String,
    pub domain: String,
}

impl Default for ScenarioIdentity {
    fn default() -> Self {
        Self {
            pid: 1,
            user: "user".to_string(),
            domain: "LOCALHOST".to_string(),
        }
    }
}

impl ScenarioIdentity {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity::new(self.user.clone(), self.domain.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub identity: ScenarioIdentity,

    /// Screen area used for maximized windows
    #[serde(default)]
    pub screen: Option<Rectangle>,

    /// Processes with a specific owner or executable. Windows whose process
    /// is not listed run as the scenario identity.
    #[serde(default)]
    pub processes: Vec<HeadlessProcess>,

    #[serde(default)]
    pub windows: Vec<HeadlessWindow>,

    #[serde(default)]
    pub events: Vec<Inbound>,
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse scenario file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(contents)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        let mut handles = HashSet::new();
        for window in &self.windows {
            if !handles.insert(window.handle) {
                anyhow::bail!("Duplicate window handle {} in scenario", window.handle);
            }
        }
        Ok(())
    }

    /// Seeds a desktop with the scenario's processes and windows.
    pub fn build_desktop(&self) -> HeadlessDesktop {
        let identity = self.identity.identity();
        let mut desktop = HeadlessDesktop::new(self.identity.pid, identity.clone());
        if let Some(screen) = self.screen {
            desktop = desktop.with_screen(screen);
        }

        let listed: HashSet<ProcessId> = self.processes.iter().map(|p| p.pid).collect();
        for process in &self.processes {
            desktop.insert_process(process.clone());
        }
        for window in &self.windows {
            if window.pid.0 != self.identity.pid && !listed.contains(&window.pid) {
                desktop.add_process(window.pid.0, Some(identity.clone()), "");
            }
            desktop.add_window(window.clone());
        }
        debug!(
            "Seeded headless desktop with {} process(es) and {} window(s)",
            self.processes.len(),
            self.windows.len()
        );
        desktop
    }

    /// Builds the desktop and a mapper over it. The mapper's startup pass
    /// has already run when this returns.
    pub fn session(&self, config: &WinmapConfig, sink: Box<dyn EventSink>) -> Result<ReplaySession> {
        let desktop = Arc::new(self.build_desktop());
        let mapper = WindowMapper::new(
            desktop.clone(),
            Box::new(RulePolicy::from_config(config)),
            Box::new(SequentialIdAllocator::new()),
            sink,
            config.mapper.clone(),
        )
        .context("Failed to start the window mapper")?;
        Ok(ReplaySession { desktop, mapper })
    }
}

/// A mapper running over a scenario's desktop.
pub struct ReplaySession {
    desktop: Arc<HeadlessDesktop>,
    mapper: WindowMapper,
}

/// What a finished replay left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Windows tracked when the script ended
    pub tracked: usize,
    /// Windows whose chrome was restored at shutdown
    pub restored: usize,
    /// Mutating calls the desktop received
    pub native_calls: usize,
}

impl ReplaySession {
    pub fn desktop(&self) -> &Arc<HeadlessDesktop> {
        &self.desktop
    }

    pub fn mapper(&self) -> &WindowMapper {
        &self.mapper
    }

    pub fn play(&mut self, events: &[Inbound]) {
        for event in events {
            self.mapper.dispatch(event.clone());
        }
    }

    /// Shuts the mapper down, restoring chrome.
    pub fn finish(mut self) -> ReplayReport {
        let tracked = self.mapper.registry().len();
        let restored = self.mapper.shutdown();
        let report = ReplayReport {
            tracked,
            restored,
            native_calls: self.desktop.journal().len(),
        };
        info!(
            "Replay finished: {} window(s) tracked, {} restored",
            report.tracked, report.restored
        );
        report
    }
}
