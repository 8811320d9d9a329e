//! Console progress bars for transfers.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;
use tubegrab_core::fetcher::progress::{ProgressHandle, ProgressReporter, ProgressSample};

const BAR_TEMPLATE: &str = "{prefix:.bold} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}";
const SPINNER_TEMPLATE: &str = "{spinner} {prefix:.bold} {bytes} {msg}";

/// Draws one bar per transfer inside a shared [`MultiProgress`].
#[derive(Debug, Clone)]
pub struct BarReporter {
    multi: MultiProgress,
}

impl BarReporter {
    /// Creates a reporter drawing into `multi`, which the log bridge should also know about.
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

impl ProgressReporter for BarReporter {
    fn start(&self, label: &str, total: Option<u64>) -> Box<dyn ProgressHandle> {
        let bar = match total {
            Some(total) => ProgressBar::new(total).with_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            ),
            None => {
                let bar = ProgressBar::new_spinner().with_style(
                    ProgressStyle::with_template(SPINNER_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            }
        };

        let bar = self.multi.add(bar.with_prefix(label.to_string()));
        Box::new(BarHandle { bar })
    }
}

struct BarHandle {
    bar: ProgressBar,
}

impl ProgressHandle for BarHandle {
    fn update(&mut self, sample: &ProgressSample) {
        self.bar.set_position(sample.transferred);
        self.bar.set_message(describe(sample));
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// The rate and ETA part of a bar, e.g. 'Speed: 512.00 KB/s, ETA: 0:01:05'.
pub fn describe(sample: &ProgressSample) -> String {
    let speed = match sample.rate {
        Some(rate) => format!("{:.2} KB/s", rate / 1024.0),
        None => "unknown".to_string(),
    };
    let eta = match sample.eta {
        Some(eta) => format_eta(eta),
        None => "unknown".to_string(),
    };

    format!("Speed: {}, ETA: {}", speed, eta)
}

fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
