use std::io::Write;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

/// Print a Cargo-style status line: `   Installing requests v2.31.0`
///
/// The `label` is right-aligned to 12 columns and printed in bold green,
/// followed by the `message` in the default terminal colour.
pub fn status(label: &str, message: &str) {
    line(Style::new().green().bold(), label, message);
}

/// Like [`status`] but bold cyan, for lines that report rather than act.
pub fn status_info(label: &str, message: &str) {
    line(Style::new().cyan().bold(), label, message);
}

pub fn status_warn(label: &str, message: &str) {
    line(Style::new().yellow().bold(), label, message);
}

pub fn status_error(label: &str, message: &str) {
    line(Style::new().red().bold(), label, message);
}

fn line(style: Style, label: &str, message: &str) {
    let style = style.for_stderr();
    let _ = writeln!(std::io::stderr(), "{:>12} {message}", style.apply_to(label));
}

/// Create an animated spinner with the given message for indeterminate progress.
///
/// The spinner ticks automatically and should be finished with
/// [`ProgressBar::finish_with_message`] or [`ProgressBar::finish_and_clear`].
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// A Cargo-style bar: `  Installing [=====>    ] 3/8: requests v2.31.0`.
///
/// The `prefix` is the label; per-item text goes in the message. Print
/// status lines through [`ProgressBar::suspend`] while the bar is live.
pub fn progress_bar(len: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{prefix:>12.cyan.bold} [{bar:25}] {pos}/{len}: {wide_msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_prefix(prefix.to_string());
    pb
}
