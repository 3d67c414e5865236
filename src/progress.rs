use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for a long loop, or a hidden one when progress output is off
pub fn progress_bar(len: u64, message: &str, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:>14} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .progress_chars("=> "),
    );
    pb.set_message(message.to_string());
    pb
}
