//! Reporters: where display updates go
//!
//! The supervisor speaks only the three reporter calls. [`StatusBoard`] keeps
//! the last painted state of every widget (served by the status API),
//! [`ConsoleReporter`] renders that state as a table on stdout, and
//! [`MultiReporter`] fans one stream of calls out to several reporters.

use colored::*;
use linecheck_core::api::WidgetView;
use linecheck_core::{
    ColorCategory, DisplayBinding, ItemId, ReporterEvent, BOARD_ADDRESS_BINDING,
    COMPANION_BINDING, STATUS_BINDING,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tabled::{settings::Style, Table, Tabled};

/// Display collaborator
pub trait Reporter: Send + Sync {
    fn set_item_text(&self, binding: DisplayBinding, text: &str);
    fn set_item_color(&self, binding: DisplayBinding, color: ColorCategory);
    fn refresh(&self);
}

/// Forward supervisor events in order (no refresh)
pub fn apply(reporter: &dyn Reporter, events: &[ReporterEvent]) {
    for event in events {
        match event {
            ReporterEvent::Text { binding, text } => reporter.set_item_text(*binding, text),
            ReporterEvent::Color { binding, color } => reporter.set_item_color(*binding, *color),
        }
    }
}

/// Human-readable name for a widget
pub fn binding_label(binding: DisplayBinding) -> String {
    match binding {
        STATUS_BINDING => "STATUS".to_string(),
        BOARD_ADDRESS_BINDING => "BOARD".to_string(),
        COMPANION_BINDING => "SERVER".to_string(),
        _ => ItemId::ALL
            .iter()
            .find(|id| id.display_binding() == binding)
            .map(|id| id.error_tag().to_string())
            .unwrap_or_else(|| binding.to_string()),
    }
}

#[derive(Debug, Clone, Default)]
struct Widget {
    text: String,
    color: Option<ColorCategory>,
}

/// Last painted state of every widget
#[derive(Default)]
pub struct StatusBoard {
    widgets: Mutex<BTreeMap<DisplayBinding, Widget>>,
    refreshes: AtomicU64,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn widget(&self, binding: DisplayBinding) -> Option<WidgetView> {
        self.lock()
            .get(&binding)
            .map(|widget| Self::view(binding, widget))
    }

    /// All painted widgets in binding order
    pub fn widgets(&self) -> Vec<WidgetView> {
        self.lock()
            .iter()
            .map(|(binding, widget)| Self::view(*binding, widget))
            .collect()
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    fn view(binding: DisplayBinding, widget: &Widget) -> WidgetView {
        WidgetView {
            binding: binding.0,
            label: binding_label(binding),
            text: widget.text.clone(),
            color: widget.color,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<DisplayBinding, Widget>> {
        self.widgets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Reporter for StatusBoard {
    fn set_item_text(&self, binding: DisplayBinding, text: &str) {
        self.lock().entry(binding).or_default().text = text.to_string();
    }

    fn set_item_color(&self, binding: DisplayBinding, color: ColorCategory) {
        self.lock().entry(binding).or_default().color = Some(color);
    }

    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Renders the board as a table on stdout whenever it changed since the last
/// refresh
pub struct ConsoleReporter {
    board: StatusBoard,
    dirty: AtomicBool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            board: StatusBoard::new(),
            dirty: AtomicBool::new(false),
        }
    }

    /// Current board as a table
    pub fn render(&self) -> String {
        #[derive(Tabled)]
        struct WidgetRow {
            #[tabled(rename = "Item")]
            label: String,
            #[tabled(rename = "State")]
            state: String,
            #[tabled(rename = "Text")]
            text: String,
        }

        let rows: Vec<WidgetRow> = self
            .board
            .widgets()
            .into_iter()
            .map(|widget| WidgetRow {
                label: widget.label,
                state: paint_state(widget.color),
                text: widget.text,
            })
            .collect();

        Table::new(rows).with(Style::rounded()).to_string()
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn paint_state(color: Option<ColorCategory>) -> String {
    match color {
        None => "-".dimmed().to_string(),
        Some(ColorCategory::Gray) => "WAIT".normal().to_string(),
        Some(ColorCategory::DimGray) => "----".dimmed().to_string(),
        Some(ColorCategory::Yellow) => "BUSY".yellow().to_string(),
        Some(ColorCategory::Green) => "PASS".green().bold().to_string(),
        Some(ColorCategory::Red) => "FAIL".red().bold().to_string(),
        Some(ColorCategory::RunBoxOn) => "RUN".cyan().bold().to_string(),
        Some(ColorCategory::RunBoxOff) => "RUN".cyan().to_string(),
    }
}

impl Reporter for ConsoleReporter {
    fn set_item_text(&self, binding: DisplayBinding, text: &str) {
        self.board.set_item_text(binding, text);
        self.dirty.store(true, Ordering::Relaxed);
    }

    fn set_item_color(&self, binding: DisplayBinding, color: ColorCategory) {
        self.board.set_item_color(binding, color);
        self.dirty.store(true, Ordering::Relaxed);
    }

    fn refresh(&self) {
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return;
        }
        let mut out = std::io::stdout().lock();
        // a closed stdout must not take the run down
        let _ = writeln!(out, "{}", self.render());
        let _ = out.flush();
    }
}

/// Sends every call to each inner reporter
#[derive(Clone, Default)]
pub struct MultiReporter {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl Reporter for MultiReporter {
    fn set_item_text(&self, binding: DisplayBinding, text: &str) {
        for reporter in &self.reporters {
            reporter.set_item_text(binding, text);
        }
    }

    fn set_item_color(&self, binding: DisplayBinding, color: ColorCategory) {
        for reporter in &self.reporters {
            reporter.set_item_color(binding, color);
        }
    }

    fn refresh(&self) {
        for reporter in &self.reporters {
            reporter.refresh();
        }
    }
}
