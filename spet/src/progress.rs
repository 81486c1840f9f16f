// Copyright (c) Facebook, Inc. and its affiliates.
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::time::Duration;

pub struct BenchProgress {
    bar: Option<ProgressBar>,
    prefix: String,
    term_width: usize,
    intv_cnt: u32,
}

impl BenchProgress {
    const LOG_INTV: u32 = 5;

    pub fn new(prefix: &str) -> Self {
        let bar = if console::user_attended_stderr() {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            Some(bar)
        } else {
            None
        };
        Self {
            bar,
            prefix: prefix.into(),
            term_width: term_size::dimensions_stderr().unwrap_or((80, 0)).0,
            intv_cnt: 0,
        }
    }

    pub fn set_status(&mut self, status: &str) {
        let msg = format!("{}: {}", &self.prefix, status);
        match self.bar.as_ref() {
            Some(bar) => {
                let width = self.term_width.saturating_sub(20);
                bar.set_message(msg.chars().take(width).collect::<String>());
            }
            None => {
                if self.intv_cnt % Self::LOG_INTV == 0 {
                    info!("{}", &msg);
                }
                self.intv_cnt += 1;
            }
        }
    }
}

impl Drop for BenchProgress {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
