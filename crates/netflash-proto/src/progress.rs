//! Progress rendering

use tracing::info;

use crate::transfer::{ProgressObserver, TransferProgress};

/// Whole-number percentage; an empty file counts as complete
pub fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (sent.min(total) as u128 * 100 / total as u128) as u8
}

/// `Flashing <name> - [>>>>>     ] 50%`
pub fn render_bar(sent: u64, total: u64, name: &str, width: usize) -> String {
    let pct = percent(sent, total);
    let done = width * pct as usize / 100;
    format!(
        "Flashing {} - [{}{}] {}%",
        name,
        ">".repeat(done),
        " ".repeat(width - done),
        pct
    )
}

/// Logs a progress line every `step` percent
#[derive(Debug)]
pub struct LogProgress {
    step: u8,
    width: usize,
    next: u8,
}

impl LogProgress {
    pub fn new(step: u8) -> Self {
        Self {
            step: step.clamp(1, 100),
            width: 50,
            next: 0,
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ProgressObserver for LogProgress {
    fn on_start(&mut self, _name: &str, _total: u64) {
        self.next = 0;
    }

    fn on_progress(&mut self, progress: &TransferProgress<'_>) {
        let pct = percent(progress.sent, progress.total);
        if pct < self.next {
            return;
        }
        info!(
            "{}",
            render_bar(progress.sent, progress.total, progress.name, self.width)
        );
        self.next = (pct / self.step + 1).saturating_mul(self.step);
    }
}
