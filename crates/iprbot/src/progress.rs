//! Progress bars for the file scan and the edit passes

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn style(template: &str, fallback: ProgressStyle) -> ProgressStyle {
    match ProgressStyle::with_template(template) {
        Ok(style) => style,
        Err(_) => fallback,
    }
}

/// Bar over a known number of items
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        style(
            "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
            ProgressStyle::default_bar(),
        )
        .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Spinner with a running count, for streams of unknown length
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(style(
        "{spinner:.green} [{elapsed_precise}] {msg} {human_pos}",
        ProgressStyle::default_spinner(),
    ));
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_progress_bar() {
        let pb = create_progress_bar(100, "Reconciling proteins");
        assert_eq!(pb.length(), Some(100));
    }

    #[test]
    fn test_create_spinner() {
        let pb = create_spinner("Rows scanned");
        assert!(!pb.is_finished());
        pb.finish();
    }
}
