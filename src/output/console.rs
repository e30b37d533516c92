use std::io::{self, Write};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::models::Progress;

const BAR_TEMPLATE: &str =
    "   {bar:40.cyan/blue} {percent:>3}% ({bytes}/{total_bytes}, {bytes_per_sec}, eta {eta})";
const SPINNER_TEMPLATE: &str = "   {spinner:.green} {bytes} downloaded ({bytes_per_sec})";

/// User-facing console output. Diagnostics go through `tracing` instead.
pub struct Console {
    out: Box<dyn Write>,
    draw_progress: bool,
    bar: Option<ProgressBar>,
}

impl Console {
    pub fn stdout() -> Self {
        Self {
            draw_progress: true,
            ..Self::to_writer(Box::new(io::stdout()))
        }
    }

    /// Console over an arbitrary writer; progress bars are tracked but not drawn.
    pub fn to_writer(out: Box<dyn Write>) -> Self {
        Self {
            out,
            draw_progress: false,
            bar: None,
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        match &self.bar {
            Some(bar) if self.draw_progress => bar.suspend(|| {
                let _ = writeln!(self.out, "{text}");
            }),
            _ => {
                let _ = writeln!(self.out, "{text}");
            }
        }
    }

    pub fn blank(&mut self) {
        self.line("");
    }

    pub fn heading(&mut self, title: &str) {
        self.line(title);
        self.line("=".repeat(title.chars().count()));
    }

    /// Byte bar when the total is known, spinner with a byte count otherwise.
    pub fn progress(&mut self, progress: Progress) {
        let draw = self.draw_progress;
        let bar = self
            .bar
            .get_or_insert_with(|| new_bar(progress.total, draw));
        bar.set_position(progress.downloaded);
    }

    pub fn finish_progress(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

fn new_bar(total: Option<u64>, draw: bool) -> ProgressBar {
    let bar = match total.filter(|total| *total > 0) {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        }
    };
    if !draw {
        bar.set_draw_target(ProgressDrawTarget::hidden());
    }
    bar
}
