//! Terminal rendering of run progress and of the final summary.

use std::time::Duration;

use index_clone::error::CloneError;
use index_clone::observer::RunObserver;
use index_clone::types::{
    CollectionName, CollectionSummary, IndexDescriptor, ReconciliationSummary, SkipReason,
};
use indicatif::{ProgressBar, ProgressStyle};

const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";
const TICK_INTERVAL: Duration = Duration::from_millis(100);

const COLLECTION_HEADER: &str = "Collection";
const INDEX_COUNT_HEADER: &str = "Index Count";
const INDEX_NAMES_HEADER: &str = "Index Names";

/// Progress reporter drawing a spinner on stderr.
///
/// Each finished index operation is printed above the spinner, so the log of what was
/// done stays on screen once the spinner is cleared.
pub struct TerminalReporter {
    spinner: ProgressBar,
    dry_run: bool,
}

impl TerminalReporter {
    pub fn new(dry_run: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(TICK_INTERVAL);

        Self { spinner, dry_run }
    }

    /// Creates a reporter that draws nothing, used with `--json`.
    pub fn hidden(dry_run: bool) -> Self {
        Self {
            spinner: ProgressBar::hidden(),
            dry_run,
        }
    }

    /// Shows `message` next to the spinner.
    pub fn status(&self, message: impl Into<String>) {
        self.spinner.set_message(message.into());
    }

    /// Clears the spinner, if still drawn.
    pub fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }

    fn line(&self, line: String) {
        if self.dry_run {
            self.spinner.println(format!("(dry-run) {line}"));
        } else {
            self.spinner.println(line);
        }
    }
}

impl RunObserver for TerminalReporter {
    fn on_collections_listed(
        &self,
        source_count: usize,
        destination_count: usize,
        shared: &[CollectionName],
    ) {
        self.line(format!(
            "{} shared collections ({source_count} on source, {destination_count} on destination)",
            shared.len()
        ));
    }

    fn on_collection_start(&self, collection: &str, index_count: usize) {
        self.status(format!("{collection}: {index_count} indexes"));
    }

    fn on_index_created(&self, collection: &str, index: &IndexDescriptor) {
        self.line(format!("✔ created {collection}.{} {}", index.name, index.keys));
    }

    fn on_index_skipped(&self, collection: &str, index: &IndexDescriptor, reason: SkipReason) {
        self.line(format!("- skipped {collection}.{}: {reason}", index.name));
    }

    fn on_index_replaced(&self, collection: &str, index: &IndexDescriptor) {
        self.line(format!("✔ replaced {collection}.{} {}", index.name, index.keys));
    }

    fn on_index_failed(&self, collection: &str, index: &IndexDescriptor, error: &CloneError) {
        self.line(format!("✖ failed {collection}.{}: {error}", index.name));
    }

    fn on_collection_complete(&self, summary: &CollectionSummary) {
        self.status(format!("{} done", summary.collection));
    }

    fn on_run_complete(&self, _summary: &ReconciliationSummary) {
        self.finish();
    }
}

impl Drop for TerminalReporter {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Renders the summary as a boxed table, one row per processed collection.
///
/// Index names are listed one per line inside the row, in source order.
pub fn render_summary_table(summary: &ReconciliationSummary) -> String {
    let rows: Vec<(&str, String, &[String])> = summary
        .collections
        .iter()
        .map(|collection| {
            (
                collection.collection.as_str(),
                collection.index_count().to_string(),
                collection.index_names.as_slice(),
            )
        })
        .collect();

    let widths = [
        column_width(COLLECTION_HEADER, rows.iter().map(|row| row.0)),
        column_width(INDEX_COUNT_HEADER, rows.iter().map(|row| row.1.as_str())),
        column_width(
            INDEX_NAMES_HEADER,
            rows.iter().flat_map(|row| row.2.iter().map(String::as_str)),
        ),
    ];

    let mut out = String::new();
    push_border(&mut out, &widths);
    push_line(
        &mut out,
        &widths,
        [COLLECTION_HEADER, INDEX_COUNT_HEADER, INDEX_NAMES_HEADER],
    );
    push_border(&mut out, &widths);

    for (collection, count, names) in &rows {
        let height = names.len().max(1);
        for line in 0..height {
            let (collection, count) = if line == 0 {
                (*collection, count.as_str())
            } else {
                ("", "")
            };
            let name = names.get(line).map(String::as_str).unwrap_or("");
            push_line(&mut out, &widths, [collection, count, name]);
        }
        push_border(&mut out, &widths);
    }

    out
}

/// Renders the closing lines printed under the table.
pub fn render_totals(summary: &ReconciliationSummary) -> String {
    if summary.is_empty() {
        return "No collections shared between source and destination.\n".to_string();
    }

    let skipped: usize = summary
        .collections
        .iter()
        .map(|collection| collection.skipped.len())
        .sum();
    let verb = if summary.dry_run {
        "would be created"
    } else {
        "created"
    };

    let mut out = format!(
        "{} collections, {} indexes {verb}, {skipped} skipped",
        summary.collections.len(),
        summary.created_count()
    );
    if summary.has_failures() {
        out.push_str(&format!(", {} failed", summary.failures.len()));
    }
    out.push('\n');

    for failure in &summary.failures {
        out.push_str(&format!(
            "failed {}.{}: {}\n",
            failure.collection, failure.index_name, failure.message
        ));
    }

    out
}

fn column_width<'a>(header: &str, cells: impl Iterator<Item = &'a str>) -> usize {
    cells
        .map(|cell| cell.chars().count())
        .chain(std::iter::once(header.chars().count()))
        .max()
        .unwrap_or(0)
}

fn push_border(out: &mut String, widths: &[usize; 3]) {
    out.push('+');
    for width in widths {
        out.push_str(&"-".repeat(width + 2));
        out.push('+');
    }
    out.push('\n');
}

fn push_line(out: &mut String, widths: &[usize; 3], cells: [&str; 3]) {
    out.push('|');
    for (cell, width) in cells.iter().zip(widths) {
        let padding = width - cell.chars().count();
        out.push(' ');
        out.push_str(cell);
        out.push_str(&" ".repeat(padding + 1));
        out.push('|');
    }
    out.push('\n');
}
