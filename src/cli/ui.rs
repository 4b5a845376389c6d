use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use std::time::Duration;

/// Text roles used in command output.
pub enum Tone {
    Heading,
    Count,
    Problem,
    Muted,
}

pub fn paint(text: &str, tone: Tone) -> String {
    let styled = match tone {
        Tone::Heading => style(text).bold().underlined(),
        Tone::Count => style(text).green().bold(),
        Tone::Problem => style(text).red(),
        Tone::Muted => style(text).dim(),
    };
    styled.to_string()
}

/// A rounded table whose header row is built from `columns`.
pub fn profile_table(columns: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(columns.iter().map(|c| {
            Cell::new(c)
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold)
        }));
    table
}

/// Right-aligned base-currency amount. A missing amount shows as `N/A`,
/// in red when it is missing because no exchange rate was available.
pub fn money_cell(value: Option<Decimal>, unresolved: bool) -> Cell {
    match value {
        Some(v) => Cell::new(format!("{v:.2}")).set_alignment(CellAlignment::Right),
        None => Cell::new("N/A")
            .fg(if unresolved { Color::Red } else { Color::DarkGrey })
            .set_alignment(CellAlignment::Right),
    }
}

/// "Label: N" footer line.
pub fn total_line(label: &str, count: usize) -> String {
    format!(
        "{}: {}",
        style(label).bold(),
        paint(&count.to_string(), Tone::Count)
    )
}

/// Ticking spinner for the aggregation run, whose length is unknown.
pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
