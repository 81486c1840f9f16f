// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::Result;
use log::{debug, info};
use serde_json::json;
use std::fmt::Write;
use std::sync::Arc;

use super::bench::{find_bench, Bench, BenchDesc};
use super::report::{boundary, row, separator, WIDTH};
use super::run::RunCtx;
use spet_intf::{JobResult, JobSpec};
use spet_util::*;

pub trait Job {
    /// Download, extract and build. Every job is set up before any job
    /// runs.
    fn setup(&mut self, rctx: &mut RunCtx) -> Result<()>;

    fn run(&mut self, rctx: &mut RunCtx) -> Result<serde_json::Value>;

    /// Write the result rows. `full` lists the individual runs too.
    fn format<'a>(
        &self,
        out: &mut Box<dyn Write + 'a>,
        result: &serde_json::Value,
        full: bool,
    ) -> Result<()>;

    fn header(&self, desc: &BenchDesc, _result: &serde_json::Value) -> String {
        desc.header.clone()
    }

    /// Extra lines shown between the header and the rows.
    fn notes(&self, _result: &serde_json::Value) -> Vec<String> {
        vec![]
    }
}

pub struct JobCtx {
    pub bench: Arc<Box<dyn Bench>>,
    pub job: Box<dyn Job>,
    pub data: JobResult,
    setup_err: Option<String>,
}

impl std::fmt::Debug for JobCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobCtx {{ {}, result: {} }}", &self.data.spec, &self.data.result)
    }
}

impl JobCtx {
    pub fn new(spec: &JobSpec) -> Result<Self> {
        let bench = find_bench(&spec.kind)?;
        let job = bench.parse(spec)?;
        let desc = bench.desc();
        Ok(Self {
            bench,
            job,
            data: JobResult {
                kind: desc.kind,
                title: desc.title,
                spec: spec.clone(),
                started_at: 0,
                ended_at: 0,
                result: serde_json::Value::Null,
                commands: vec![],
            },
            setup_err: None,
        })
    }

    /// Rebuild a job from a saved result so that it can be formatted again.
    pub fn from_result(data: JobResult) -> Result<Self> {
        let mut jctx = Self::new(&data.spec)?;
        jctx.data = data;
        Ok(jctx)
    }

    pub fn skip(&mut self) {
        info!("{}: Skipping", &self.data.kind);
        self.data.result = json!({"skipped": true});
    }

    pub fn is_skipped(&self) -> bool {
        self.data.skipped()
    }

    /// How long the run took, e.g. "4.5 min".
    pub fn elapsed(&self) -> String {
        let secs = self.data.ended_at.saturating_sub(self.data.started_at);
        pretty_time_elapsed(secs as f64, "s")
    }

    /// Set up the job. A failure is remembered and becomes the job's
    /// result when it's run.
    pub fn setup(&mut self, rctx: &mut RunCtx) {
        if self.is_skipped() {
            return;
        }
        info!("{}: Setting up", &self.data.kind);
        rctx.start_progress(&self.data.title);
        let res = self.job.setup(rctx);
        rctx.stop_progress();
        self.data.commands.append(&mut rctx.take_commands());

        if let Err(e) = res {
            let msg = format!("{:#}", &e);
            error_message(&format!("{} failed to set up. ({})", &self.data.title, &msg));
            self.setup_err = Some(msg);
        }
    }

    pub fn run(&mut self, rctx: &mut RunCtx) {
        if self.is_skipped() {
            return;
        }
        self.data.started_at = unix_now();
        if let Some(msg) = self.setup_err.as_ref() {
            self.data.result = json!({ "error": msg });
        } else {
            info!("{}: Running", &self.data.kind);
            rctx.start_progress(&self.data.title);
            let res = self.job.run(rctx);
            rctx.stop_progress();
            self.data.result = match res {
                Ok(result) => result,
                Err(e) => {
                    let msg = format!("{:#}", &e);
                    error_message(&format!("{} failed. ({})", &self.data.title, &msg));
                    json!({ "error": msg })
                }
            };
        }
        self.data.commands.append(&mut rctx.take_commands());
        self.data.ended_at = unix_now();
        info!("{}: Finished in {}", &self.data.kind, &self.elapsed());
        debug!("{}: result={}", &self.data.kind, &self.data.result);
    }

    /// Render the job's section of the results table.
    pub fn format_section(&self, full: bool) -> String {
        let desc = self.bench.desc();
        let result = &self.data.result;

        let mut buf = String::new();
        buf += &separator();
        buf += &fill(&self.job.header(&desc, result), WIDTH, "");
        buf += "\n";
        let notes = self.job.notes(result);
        if !notes.is_empty() {
            buf += &separator();
            for note in notes.iter() {
                buf += note;
                buf += "\n";
            }
        }
        buf += &boundary();

        let placeholder = if self.data.error().is_some() {
            Some("INVALID")
        } else if self.is_skipped() || result.is_null() {
            Some("SKIPPED")
        } else {
            None
        };

        match placeholder {
            Some(value) => {
                for title in desc.placeholders.iter() {
                    buf += &row(title, value);
                }
            }
            None => {
                let mut rows = String::new();
                let res = {
                    let mut out: Box<dyn Write + '_> = Box::new(&mut rows);
                    self.job.format(&mut out, result, full)
                };
                match res {
                    Ok(()) => buf += &rows,
                    Err(e) => {
                        debug!("{}: Failed to format result ({:#})", &self.data.kind, &e);
                        for title in desc.placeholders.iter() {
                            buf += &row(title, "INVALID");
                        }
                    }
                }
            }
        }

        buf += &separator();
        buf += "\n";
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::init_test_benchs;

    #[test]
    fn test_placeholder_sections() {
        init_test_benchs();

        let mut jctx = JobCtx::new(&JobSpec::dfl("zlib")).unwrap();
        jctx.skip();
        let section = jctx.format_section(true);
        let lines: Vec<&str> = section.lines().collect();
        assert_eq!(lines[0], "-".repeat(79));
        assert!(lines[1].starts_with("Compression and decompression performance"));
        assert_eq!(lines[3], "=".repeat(79));
        assert!(lines[4].starts_with("Compression") && lines[4].ends_with("SKIPPED"));
        assert!(lines[5].starts_with("Decompression") && lines[5].ends_with("SKIPPED"));
        assert_eq!(lines[6], "-".repeat(79));
        assert_eq!(lines[7], "");
        assert!(lines.iter().all(|l| l.chars().count() <= 79));

        jctx.data.result = json!({"error": "boom"});
        let section = jctx.format_section(false);
        assert_eq!(section.matches("INVALID").count(), 2);
    }

    #[test]
    fn test_from_result() {
        init_test_benchs();

        let data = JobResult {
            kind: "compilation".into(),
            title: "Timed Kernel Compilation".into(),
            spec: JobSpec::dfl("compilation"),
            started_at: 10,
            ended_at: 20,
            result: json!({"unit": "s", "run1": 61.5, "median": 61.5}),
            commands: vec!["Run: make -s -j 8".into()],
        };
        let mut jctx = JobCtx::from_result(data).unwrap();
        assert_eq!(jctx.data.started_at, 10);
        assert_eq!(jctx.elapsed(), "10 s");
        let section = jctx.format_section(false);
        assert!(section.contains("Linux Kernel Compilation"));
        assert!(section.contains("61.50 s\n"));

        jctx.data.ended_at = 10 + 270;
        assert_eq!(jctx.elapsed(), "4.5 min");
    }
}
