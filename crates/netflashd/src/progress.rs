//! Terminal progress bar

use indicatif::{ProgressBar, ProgressStyle};
use netflash_proto::{ProgressObserver, TransferProgress};

/// One bar per file transfer, drawn on stderr
#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template("Flashing {msg} - [{bar:50}] {percent}% ({bytes}/{total_bytes})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(">> ")
    }
}

impl ProgressObserver for BarProgress {
    fn on_start(&mut self, name: &str, total: u64) {
        let bar = ProgressBar::new(total);
        bar.set_style(Self::style());
        bar.set_message(name.to_string());
        self.bar = Some(bar);
    }

    fn on_progress(&mut self, progress: &TransferProgress<'_>) {
        if let Some(bar) = &self.bar {
            bar.set_position(progress.sent);
        }
    }

    fn on_finish(&mut self, _name: &str) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}
