//! Run state machine and per-tick aggregation
//!
//! [`Aggregator`] is the deterministic part of the supervisor: it is fed a
//! snapshot of the item table on every tick and returns the display updates
//! to emit plus, exactly once, the final [`RunSummary`]. It never touches a
//! clock or a reporter itself, which keeps every scenario testable tick by
//! tick.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::item::{ItemId, ItemStatus, TestItem};
use crate::types::{ColorCategory, DisplayBinding, STATUS_BINDING};

/// Maximum characters per error summary line sent to the log server
pub const ERROR_LINE_MAX: usize = 50;

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Waiting,
    Running,
    Finished,
    Stopped,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Finished | RunStatus::Stopped)
    }

    /// Text shown on the status widget
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Waiting => "WAIT",
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISH",
            RunStatus::Stopped => "STOP",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Process-wide aggregate, owned by the supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub remaining_timeout_ticks: u32,
    pub emergency_stop: bool,
    /// Aggregation ticks processed while running
    pub ticks: u64,
}

/// One call the supervisor must forward to the reporter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReporterEvent {
    Text {
        binding: DisplayBinding,
        text: String,
    },
    Color {
        binding: DisplayBinding,
        color: ColorCategory,
    },
}

/// Final verdict of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub emergency_stop: bool,
    /// Items without a passing terminal result, in id order
    pub failed: Vec<ItemId>,
    /// Resolved hardware identifier (MAC), if the identity item passed
    pub identifier: Option<String>,
    /// Table as observed when the run became terminal
    pub items: Vec<TestItem>,
}

impl RunSummary {
    pub fn error_tags(&self) -> Vec<&'static str> {
        self.failed.iter().map(|id| id.error_tag()).collect()
    }

    /// Failing tags as `TAG,` entries packed into lines of at most `max_chars`
    pub fn error_lines(&self, max_chars: usize) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();
        let mut current = String::new();
        for tag in self.error_tags() {
            if !current.is_empty() && current.len() + tag.len() + 1 > max_chars {
                lines.push(std::mem::take(&mut current));
            }
            current.push_str(tag);
            current.push(',');
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }

    pub fn passed(&self) -> bool {
        self.status == RunStatus::Finished && self.failed.is_empty()
    }
}

/// Output of one aggregation tick
#[derive(Debug, Default)]
pub struct TickReport {
    pub events: Vec<ReporterEvent>,
    /// Present only on the tick that made the run terminal
    pub summary: Option<RunSummary>,
    /// Items that went terminal after the run already was (audit only)
    pub late: Vec<ItemId>,
}

/// Tick-driven run state machine
pub struct Aggregator {
    state: RunState,
    countdown_divisor: u32,
    last_seen: HashMap<ItemId, ItemStatus>,
    late_transitions: Vec<ItemId>,
}

impl Aggregator {
    /// `timeout_ticks` countdown steps, one step every `countdown_divisor` ticks
    pub fn new(timeout_ticks: u32, countdown_divisor: u32) -> Self {
        Self {
            state: RunState {
                status: RunStatus::Waiting,
                remaining_timeout_ticks: timeout_ticks,
                emergency_stop: false,
                ticks: 0,
            },
            countdown_divisor: countdown_divisor.max(1),
            last_seen: HashMap::new(),
            late_transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Post-terminal transitions recorded so far
    pub fn late_transitions(&self) -> &[ItemId] {
        &self.late_transitions
    }

    /// Initial display state while bootstrap is in progress
    pub fn waiting_events(&self) -> Vec<ReporterEvent> {
        vec![
            ReporterEvent::Text {
                binding: STATUS_BINDING,
                text: RunStatus::Waiting.label().to_string(),
            },
            ReporterEvent::Color {
                binding: STATUS_BINDING,
                color: ColorCategory::Gray,
            },
        ]
    }

    /// Waiting → Running; probes have been launched and the countdown starts
    pub fn begin(&mut self) {
        if self.state.status == RunStatus::Waiting {
            self.state.status = RunStatus::Running;
        }
    }

    /// Process one tick over `snapshot`
    pub fn tick(&mut self, snapshot: &[TestItem], emergency_stop: bool) -> TickReport {
        if self.state.status.is_terminal() {
            return self.audit_late(snapshot);
        }

        let mut report = TickReport::default();

        if self.state.status == RunStatus::Waiting {
            if emergency_stop {
                self.state.emergency_stop = true;
                self.conclude(RunStatus::Stopped, snapshot, &mut report);
            }
            return report;
        }

        self.state.ticks += 1;
        self.collect_item_updates(snapshot, &mut report.events);

        if emergency_stop {
            self.state.emergency_stop = true;
            self.conclude(RunStatus::Stopped, snapshot, &mut report);
            return report;
        }

        let done = snapshot.iter().filter(|item| item.is_terminal()).count();
        if done == snapshot.len() {
            self.conclude(RunStatus::Finished, snapshot, &mut report);
            return report;
        }

        if self.state.ticks % u64::from(self.countdown_divisor) == 0 {
            self.state.remaining_timeout_ticks = self.state.remaining_timeout_ticks.saturating_sub(1);
        }
        if self.state.remaining_timeout_ticks == 0 {
            self.conclude(RunStatus::Stopped, snapshot, &mut report);
            return report;
        }

        let blink = if self.state.ticks % 2 == 1 {
            ColorCategory::RunBoxOn
        } else {
            ColorCategory::RunBoxOff
        };
        report.events.push(ReporterEvent::Text {
            binding: STATUS_BINDING,
            text: format!("RUNNING - {}", self.state.remaining_timeout_ticks),
        });
        report.events.push(ReporterEvent::Color {
            binding: STATUS_BINDING,
            color: blink,
        });
        report
    }

    fn collect_item_updates(&mut self, snapshot: &[TestItem], events: &mut Vec<ReporterEvent>) {
        for item in snapshot {
            let previous = self
                .last_seen
                .insert(item.id, item.status)
                .unwrap_or(ItemStatus::Waiting);
            if previous == item.status {
                continue;
            }
            match item.status {
                ItemStatus::Waiting => {}
                ItemStatus::Running => events.push(ReporterEvent::Color {
                    binding: item.display_binding,
                    color: ColorCategory::Yellow,
                }),
                ItemStatus::Finished | ItemStatus::Stopped => {
                    events.push(ReporterEvent::Color {
                        binding: item.display_binding,
                        color: ColorCategory::verdict(item.result),
                    });
                    if !item.response_text.is_empty() {
                        events.push(ReporterEvent::Text {
                            binding: item.display_binding,
                            text: item.response_text.clone(),
                        });
                    }
                }
            }
        }
    }

    fn conclude(&mut self, status: RunStatus, snapshot: &[TestItem], report: &mut TickReport) {
        self.state.status = status;

        let failed: Vec<ItemId> = snapshot
            .iter()
            .filter(|item| item.verdict() != Some(true))
            .map(|item| item.id)
            .collect();

        let identifier = snapshot
            .iter()
            .find(|item| item.id == ItemId::EfuseUuid && item.verdict() == Some(true))
            .map(|item| item.response_text.clone());

        let color = match status {
            RunStatus::Finished => ColorCategory::verdict(failed.is_empty()),
            _ => ColorCategory::Red,
        };
        report.events.push(ReporterEvent::Text {
            binding: STATUS_BINDING,
            text: status.label().to_string(),
        });
        report.events.push(ReporterEvent::Color {
            binding: STATUS_BINDING,
            color,
        });

        for item in snapshot {
            self.last_seen.insert(item.id, item.status);
        }

        report.summary = Some(RunSummary {
            status,
            emergency_stop: self.state.emergency_stop,
            failed,
            identifier,
            items: snapshot.to_vec(),
        });
    }

    fn audit_late(&mut self, snapshot: &[TestItem]) -> TickReport {
        let mut report = TickReport::default();
        for item in snapshot {
            let previous = self.last_seen.insert(item.id, item.status);
            if item.is_terminal() && previous != Some(item.status) {
                self.late_transitions.push(item.id);
                report.late.push(item.id);
            }
        }
        report
    }
}
