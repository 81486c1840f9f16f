// Copyright (c) Facebook, Inc. and its affiliates.

// Text report. Every table is WIDTH columns wide with titles on the left
// and values right aligned against the edge.
use anyhow::Result;
use chrono::{DateTime, Datelike, Local};
use log::debug;
use serde_json::json;
use std::time::{Duration, UNIX_EPOCH};

use super::job::JobCtx;
use spet_intf::{JobSpec, ResultFile};
use spet_util::*;

mod commands;
mod packages;
mod system;

pub use commands::commands_table;
pub use packages::packages_table;
pub use system::system_table;

pub const WIDTH: usize = 79;

/// Order of the sections in the results and commands tables.
pub const REPORT_ORDER: [&str; 10] = [
    "compilation",
    "zlib",
    "lmbench",
    "mlc",
    "openssl",
    "stream",
    "linpack",
    "sql",
    "nosql",
    "docker",
];

pub fn separator() -> String {
    format!("{}\n", "-".repeat(WIDTH))
}

pub fn boundary() -> String {
    format!("{}\n", "=".repeat(WIDTH))
}

/// `title` followed by `value` right aligned to the table edge. A pair
/// too wide for that falls back to fixed columns.
pub fn row(title: &str, value: &str) -> String {
    let (tlen, vlen) = (title.chars().count(), value.chars().count());
    if tlen + vlen >= WIDTH - 1 {
        format!("{:30} {:>48}\n", title, value)
    } else {
        format!("{} {:>width$}\n", title, value, width = WIDTH - 1 - tlen)
    }
}

pub fn row_f(title: &str, val: f64, unit: &str) -> String {
    match unit {
        "" => row(title, &format!("{:.2}", val)),
        unit => row(title, &format!("{:.2} {}", val, unit)),
    }
}

/// Centered title underlined with `=`.
fn title_block(title: &str) -> String {
    format!(
        "{}\n{}\n",
        center(title, WIDTH),
        center(&"=".repeat(title.chars().count()), WIDTH)
    )
}

fn local_time(at: u64) -> DateTime<Local> {
    DateTime::<Local>::from(UNIX_EPOCH + Duration::from_secs(at))
}

pub fn header(version: &str, at: u64) -> String {
    let mut buf = String::new();
    buf += &center("Server Performance Evaluation Tool Summary", WIDTH);
    buf += "\n";
    buf += &center(version, WIDTH);
    buf += "\n";
    buf += &center(&format_unix_time(at), WIDTH);
    buf += "\n\n";
    buf
}

pub fn footer(at: u64) -> String {
    format!(
        "\n\nFor questions about this result, please contact the tester.\n\
         Copyright {} Ryan Spoone\n",
        local_time(at).year()
    )
}

pub fn results_title() -> String {
    format!("\n{}", title_block("System Performance Results"))
}

/// Sections of every benchmark in report order. Benchmarks without a job
/// are shown as skipped.
pub fn results_table(jobs: &[JobCtx], full: bool) -> String {
    let mut buf = results_title();
    for kind in REPORT_ORDER.iter() {
        match jobs.iter().find(|jctx| jctx.data.kind == *kind) {
            Some(jctx) => buf += &jctx.format_section(full),
            None => match JobCtx::new(&JobSpec::dfl(kind)) {
                Ok(mut jctx) => {
                    jctx.data.result = json!({"skipped": true});
                    buf += &jctx.format_section(full);
                }
                Err(e) => debug!("report: No section for {:?} ({:#})", kind, &e),
            },
        }
    }
    buf
}

/// The whole text report of a finished run.
pub fn text_report(rf: &ResultFile) -> Result<String> {
    let jobs = rf
        .jobs
        .iter()
        .cloned()
        .map(JobCtx::from_result)
        .collect::<Result<Vec<_>>>()?;

    let mut buf = header(&rf.version, rf.started_at);
    buf += &results_table(&jobs, true);
    buf += "\n";
    buf += &system_table(&rf.sysinfo, rf.avx512);
    buf += &commands_table(&jobs);
    buf += &packages_table(&rf.versions, &rf.sysinfo);
    buf += &footer(rf.started_at);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::init_test_benchs;
    use spet_intf::{JobResult, PackageVersions, SysInfo};

    #[test]
    fn test_row() {
        let line = row("Processor Name:", "Intel(R) Xeon(R) Platinum 8180 CPU @ 2.50GHz");
        assert_eq!(line.len(), WIDTH + 1);
        assert!(line.starts_with("Processor Name: "));
        assert!(line.ends_with(" 2.50GHz\n"));

        let title = "t".repeat(40);
        let value = "v".repeat(40);
        assert_eq!(row(&title, &value), format!("{} {:>48}\n", &title, &value));

        assert_eq!(
            row_f("Median", 61.456, "s"),
            format!("Median{}61.46 s\n", " ".repeat(66))
        );
        assert!(row_f("Score", 3.0, "").ends_with(" 3.00\n"));
    }

    #[test]
    fn test_header_footer() {
        let head = header("1.0.0", 0);
        let lines: Vec<&str> = head.lines().collect();
        assert_eq!(lines[0].trim(), "Server Performance Evaluation Tool Summary");
        assert_eq!(lines[1].trim(), "1.0.0");
        assert_eq!(lines[2].trim(), format_unix_time(0));
        assert!(head.ends_with("\n\n"));

        let year = local_time(1_514_764_800 + 86400 * 180).year();
        assert_eq!(
            footer(1_514_764_800 + 86400 * 180),
            format!(
                "\n\nFor questions about this result, please contact the tester.\n\
                 Copyright {} Ryan Spoone\n",
                year
            )
        );
    }

    #[test]
    fn test_results_table() {
        init_test_benchs();

        let mut jctx = JobCtx::new(&JobSpec::dfl("stream")).unwrap();
        jctx.data.result = json!({"unit": "MB/s", "run1": 102400.0, "median": 102400.0});
        let table = results_table(&[jctx], true);

        assert!(table.starts_with("\n"));
        assert!(table.contains("System Performance Results"));
        let stream = table.find("Triad Bandwidth: Median").unwrap();
        let compilation = table.find("Software development and compute").unwrap();
        let docker = table.find("Compilation performance with up to").unwrap();
        assert!(compilation < stream && stream < docker);
        assert!(table.contains(" 100 GB/s\n"));
        // every other benchmark shows up as skipped
        assert!(table.matches("SKIPPED").count() >= 9);
        assert!(table.lines().all(|l| l.chars().count() <= WIDTH));
    }

    #[test]
    fn test_text_report() {
        init_test_benchs();

        let mut rf = ResultFile {
            version: "1.0.0".into(),
            run_name: "SPET.001.test".into(),
            started_at: 1_514_764_800,
            ended_at: 1_514_768_400,
            sysinfo: SysInfo {
                processor_name: Some("AMD EPYC 7601 32-Core Processor".into()),
                sockets: Some(2),
                ..Default::default()
            },
            avx512: false,
            mathlib: "blis".into(),
            versions: PackageVersions::default(),
            jobs: vec![],
        };
        rf.record(JobResult {
            kind: "compilation".into(),
            title: "Timed Kernel Compilation".into(),
            spec: JobSpec::dfl("compilation"),
            started_at: 1_514_764_900,
            ended_at: 1_514_765_000,
            result: json!({"unit": "s", "run1": 61.5, "median": 61.5}),
            commands: vec!["Run: make -s -j 64".into()],
        });

        let report = text_report(&rf).unwrap();
        let results = report.find("System Performance Results").unwrap();
        let system = report.find("System Information").unwrap();
        let commands = report.find("Primary Commands Used").unwrap();
        let packages = report.find("Primary Packages Used").unwrap();
        let footer = report.find("For questions about this result").unwrap();
        assert!(results < system && system < commands);
        assert!(commands < packages && packages < footer);
        assert!(report.contains("Run: make -s -j 64\n"));
        assert!(report.contains("AMD BLIS*:"));
    }
}
