//! Output written to the `gridsym-output` logger.

use std::fmt;

use log;

const GRIDSYM_BANNER_LENGTH: usize = 79;

/// Logs a main output line to the `gridsym-output` logger.
macro_rules! gridsym_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "gridsym-output", $fmt, $($($arg)*)?) }
}

pub(crate) use gridsym_output;

/// Logs `title` centred between two rules spanning the banner width.
pub(crate) fn log_title(title: &str) {
    let width = title.chars().count().max(GRIDSYM_BANNER_LENGTH);
    let rule = "=".repeat(width);
    gridsym_output!("{rule}");
    gridsym_output!("{title:^width$}");
    gridsym_output!("{rule}");
}

/// Writes `heading` underlined to its own width.
pub(crate) fn write_heading(f: &mut fmt::Formatter<'_>, heading: &str) -> fmt::Result {
    writeln!(f, "{heading}")?;
    writeln!(f, "{}", "-".repeat(heading.chars().count()))
}

/// Writes a table of right-aligned columns, each as wide as its widest cell, with a rule under
/// the header row.
pub(crate) fn write_table(
    f: &mut fmt::Formatter<'_>,
    header: &[&str],
    rows: &[Vec<String>],
) -> fmt::Result {
    let widths = header
        .iter()
        .enumerate()
        .map(|(column, title)| {
            rows.iter()
                .filter_map(|row| row.get(column))
                .map(|cell| cell.chars().count())
                .fold(title.chars().count(), usize::max)
        })
        .collect::<Vec<_>>();
    write_row(f, header.iter().copied(), &widths)?;
    let total = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
    writeln!(f, "{}", "-".repeat(total))?;
    for row in rows {
        write_row(f, row.iter().map(String::as_str), &widths)?;
    }
    Ok(())
}

fn write_row<'a>(
    f: &mut fmt::Formatter<'_>,
    cells: impl Iterator<Item = &'a str>,
    widths: &[usize],
) -> fmt::Result {
    let line = cells
        .zip(widths.iter())
        .map(|(cell, &width)| format!("{cell:>width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    writeln!(f, "{line}")
}

/// A trait for logging the [`fmt::Display`] output of a structure line by line to the
/// `gridsym-output` logger.
pub(crate) trait GridSymOutput: fmt::Display {
    fn log_output_display(&self) {
        self.to_string()
            .lines()
            .for_each(|line| gridsym_output!("{line}"));
    }
}

impl<T> GridSymOutput for T where T: fmt::Display {}
