//! Plain-text and JSON rendering of analysis results

use crossterm::style::{Color, Stylize};
use jiff::tz::TimeZone;
use oatlab_core::analysis::{Cell, ColorScale, RunOutcome, ValueMatrix, ValueMode, cell_color};
use oatlab_core::SessionSnapshot;
use serde::Serialize;

use crate::format::{format_duration, format_percent_change, format_value};

/// Standard color for headers
pub const HEADER_COLOR: Color = Color::Cyan;

/// Standard color for failed runs
pub const FAILED_COLOR: Color = Color::Red;

/// Standard color for cells without data
pub const MUTED_COLOR: Color = Color::DarkGrey;

/// Text on top of a colored background
const CELL_TEXT_COLOR: Color = Color::Black;

const COLUMN_GAP: &str = "  ";

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Background scale for relative matrices
    pub scale: ColorScale,
    /// Emit ANSI styling
    pub styled: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            scale: ColorScale::default(),
            styled: false,
        }
    }
}

/// Display text for one cell
pub fn cell_text(cell: &Cell, mode: ValueMode) -> String {
    match (cell, mode) {
        (Cell::Value(v), ValueMode::Absolute) => format_value(*v),
        (Cell::Value(v), ValueMode::Relative) => format_percent_change(*v),
        (Cell::Failed, _) => "failed".to_string(),
        (Cell::NotRun, _) => "-".to_string(),
        (Cell::NotComputable, _) => "n/a".to_string(),
    }
}

fn style_cell(padded: String, cell: &Cell, mode: ValueMode, options: &ReportOptions) -> String {
    if !options.styled {
        return padded;
    }
    match cell {
        Cell::Value(_) if mode == ValueMode::Relative => match cell_color(cell, options.scale) {
            Some(rgb) => padded
                .with(CELL_TEXT_COLOR)
                .on(Color::Rgb {
                    r: rgb.r,
                    g: rgb.g,
                    b: rgb.b,
                })
                .to_string(),
            None => padded,
        },
        Cell::Value(_) => padded,
        Cell::Failed => padded.with(FAILED_COLOR).to_string(),
        Cell::NotRun | Cell::NotComputable => padded.with(MUTED_COLOR).to_string(),
    }
}

fn title(matrix: &ValueMatrix) -> String {
    match matrix.mode {
        ValueMode::Absolute => format!("{} by run", matrix.statistic),
        ValueMode::Relative => format!("{} by run, % change vs baseline", matrix.statistic),
    }
}

/// Render a value matrix as an aligned table, outcomes down, runs across
pub fn render_matrix(matrix: &ValueMatrix, options: &ReportOptions) -> String {
    let labels: Vec<String> = matrix
        .outcomes
        .iter()
        .map(ToString::to_string)
        .collect();
    let texts: Vec<Vec<String>> = matrix
        .rows()
        .iter()
        .map(|row| row.iter().map(|c| cell_text(c, matrix.mode)).collect())
        .collect();

    let label_width = labels
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .max("Outcome".len());
    let widths: Vec<usize> = matrix
        .columns
        .iter()
        .enumerate()
        .map(|(col, column)| {
            texts
                .iter()
                .map(|row| row[col].chars().count())
                .chain(std::iter::once(column.label.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let heading = title(matrix);
    if options.styled {
        out.push_str(&heading.as_str().with(HEADER_COLOR).bold().to_string());
    } else {
        out.push_str(&heading);
    }
    out.push('\n');

    let mut header = format!("{:<label_width$}", "Outcome");
    for (column, width) in matrix.columns.iter().zip(&widths) {
        header.push_str(COLUMN_GAP);
        header.push_str(&format!("{:>width$}", column.label));
    }
    if options.styled {
        out.push_str(&header.as_str().with(HEADER_COLOR).to_string());
    } else {
        out.push_str(&header);
    }
    out.push('\n');

    for ((label, row), cells) in labels.iter().zip(&texts).zip(matrix.rows()) {
        out.push_str(&format!("{label:<label_width$}"));
        for ((text, cell), width) in row.iter().zip(cells).zip(&widths) {
            out.push_str(COLUMN_GAP);
            let padded = format!("{text:>width$}");
            out.push_str(&style_cell(padded, cell, matrix.mode, options));
        }
        out.push('\n');
    }
    out
}

/// One line per recorded run, with failure reasons
pub fn render_runs(snapshot: &SessionSnapshot) -> String {
    let tz = TimeZone::system();
    let mut out = String::new();
    for run in &snapshot.runs {
        let at = run.recorded_at.to_zoned(tz.clone()).strftime("%H:%M:%S");
        out.push_str(&format!(
            "#{:<3} {:<28} {:>8}  {at}",
            run.index,
            run.kind.label(),
            format_duration(run.solve_time)
        ));
        if let RunOutcome::Failed(failure) = &run.outcome {
            out.push_str(&format!("  failed: {failure}"));
        }
        out.push('\n');
    }
    out.push_str(&snapshot.progress);
    if snapshot.stale {
        out.push_str("  (inputs changed since these runs; results may be stale)");
    }
    out.push('\n');
    out
}

/// Machine-readable result of a whole analysis
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub session: &'a SessionSnapshot,
    pub matrix: &'a ValueMatrix,
}

impl JsonReport<'_> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
