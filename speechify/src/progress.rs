//! Progress bar for non-verbose runs.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use speechify_core::{NoopProgress, ProgressSink};

/// Terminal progress bar fed by the worker pool.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:.cyan} │{bar:40.green}│ {pos}/{len} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("██░"),
        );
        bar.set_message("Processing files");
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn inc(&self) {
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

/// Verbose runs get no bar so it does not tear through the log lines.
pub fn for_run(total: usize, verbose: bool) -> Arc<dyn ProgressSink> {
    if verbose {
        Arc::new(NoopProgress)
    } else {
        Arc::new(BarProgress::new(total as u64))
    }
}
