//! Text table rendering of the sample history

use std::fmt;

use crate::format::format_bytes;
use crate::history::HistoryBuffer;
use crate::types::Sample;

/// ANSI sequence clearing the screen and homing the cursor
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

const MIN_APPLICATION_WIDTH: usize = 20;
const MIN_LOCAL_WIDTH: usize = 25;
const MIN_REMOTE_WIDTH: usize = 25;
const PROTOCOL_WIDTH: usize = 6;
const DATA_WIDTH: usize = 12;
/// Four " | " separators plus one spare column
const SEPARATOR_WIDTH: usize = 13;
const EMPTY_RULE_WIDTH: usize = 120;

/// Column widths shared by every sample on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnWidths {
    pub application: usize,
    pub local: usize,
    pub remote: usize,
}

impl Default for ColumnWidths {
    fn default() -> Self {
        Self {
            application: MIN_APPLICATION_WIDTH,
            local: MIN_LOCAL_WIDTH,
            remote: MIN_REMOTE_WIDTH,
        }
    }
}

impl ColumnWidths {
    /// Widen to fit every row of every sample
    pub fn fit<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Self {
        let mut widths = Self::default();
        for row in samples.into_iter().flat_map(|sample| &sample.rows) {
            widths.application = widths.application.max(row.key.application.chars().count());
            widths.local = widths.local.max(row.key.local.chars().count());
            widths.remote = widths.remote.max(row.key.remote.chars().count());
        }
        widths
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.application + self.local + self.remote + PROTOCOL_WIDTH + DATA_WIDTH + SEPARATOR_WIDTH
    }
}

/// Renders a [`HistoryBuffer`] as a full screen of text.
#[derive(Debug, Clone, Default)]
pub struct TableRenderer;

impl TableRenderer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn render(&self, history: &HistoryBuffer) -> String {
        Screen { history }.to_string()
    }
}

/// One full redraw of the history
#[derive(Debug, Clone, Copy)]
pub struct Screen<'a> {
    pub history: &'a HistoryBuffer,
}

impl fmt::Display for Screen<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Network Monitor - History of the Last {} Updates",
            self.history.capacity()
        )?;
        writeln!(f, "Press Ctrl+C to exit")?;

        if self.history.is_empty() {
            writeln!(f, "{}", "=".repeat(EMPTY_RULE_WIDTH))?;
            return writeln!(f, "Waiting for first update...");
        }

        let widths = ColumnWidths::fit(self.history.snapshot());
        let rule = "=".repeat(widths.total());
        writeln!(f, "{rule}")?;

        for (idx, sample) in self.history.snapshot().enumerate() {
            writeln!(
                f,
                "\n[Update #{} - {}]",
                idx + 1,
                sample.timestamp.format("%H:%M:%S")
            )?;
            write_sample(f, sample, &widths)?;
        }

        writeln!(f, "\n{rule}")
    }
}

fn write_row(
    f: &mut fmt::Formatter<'_>,
    widths: &ColumnWidths,
    cells: [&str; 5],
) -> fmt::Result {
    let [application, local, remote, protocol, data] = cells;
    writeln!(
        f,
        "{:<aw$} | {:<lw$} | {:<rw$} | {:<pw$} | {:<dw$}",
        application,
        local,
        remote,
        protocol,
        data,
        aw = widths.application,
        lw = widths.local,
        rw = widths.remote,
        pw = PROTOCOL_WIDTH,
        dw = DATA_WIDTH,
    )
}

fn write_sample(f: &mut fmt::Formatter<'_>, sample: &Sample, widths: &ColumnWidths) -> fmt::Result {
    write_row(
        f,
        widths,
        ["APPLICATION", "LOCAL SOCKET", "REMOTE SERVER", "PROTO", "DATA"],
    )?;
    writeln!(f, "{}", "-".repeat(widths.total()))?;

    if sample.is_empty() {
        return writeln!(f, "No network activity detected in this period");
    }

    for row in &sample.rows {
        let data = format_bytes(row.bytes);
        write_row(
            f,
            widths,
            [
                &row.key.application,
                &row.key.local,
                &row.key.remote,
                &row.key.protocol,
                &data,
            ],
        )?;
    }
    Ok(())
}

/// Single-line countdown, redrawn in place with a carriage return
#[must_use]
pub fn countdown_line(seconds: u64) -> String {
    format!("\rNext update in {seconds} seconds...  ")
}
