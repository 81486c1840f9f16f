// Copyright (c) Facebook, Inc. and its affiliates.

// The individual bench implementations under bench/ inherits all uses from
// this file. Make common stuff available.
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use serde_json::json;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::job::Job;
use super::prereq::{MathLib, Source, BLIS_COPYRIGHTS, GLIBC_PREFIX, MKL_INSTALL_DIR};
use super::report::{row, row_f, separator};
use super::run::{env_append, env_prepend, env_set, RunCtx};
use super::stats::*;
use spet_intf::{ver_prefix, JobSpec};

use spet_util::*;

lazy_static::lazy_static! {
    static ref BENCHS: Mutex<Vec<Arc<Box<dyn Bench>>>> = Mutex::new(vec![]);
}

pub fn find_bench(kind: &str) -> Result<Arc<Box<dyn Bench>>> {
    for bench in BENCHS.lock().unwrap().iter() {
        if bench.desc().kind == kind {
            return Ok(bench.clone());
        }
    }
    bail!("unknown bench kind {:?}", kind);
}

/// All registered benches in the order they're set up and run.
pub fn all_benchs() -> Vec<Arc<Box<dyn Bench>>> {
    BENCHS.lock().unwrap().clone()
}

/// Failures which make a benchmark result invalid. The message ends up in
/// the `error` field of the result.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("\"{}\" could not be found", .0.display())]
    MissingFile(PathBuf),
    #[error("{0:?} failed")]
    CommandFailed(String),
    #[error("No {0} found in the output")]
    NoResult(String),
    #[error("YCSB failed to update and/or read database.")]
    DatabaseFailed,
    #[error("{0} failed to start.")]
    ServiceStart(String),
}

pub struct BenchDesc {
    pub kind: String,
    pub title: String,
    pub header: String,
    pub commands_title: String,
    pub placeholders: Vec<String>,
    pub heavy_boundary: bool,
}

impl BenchDesc {
    pub fn new(kind: &str, title: &str) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            header: String::new(),
            commands_title: title.into(),
            placeholders: vec![title.into()],
            heavy_boundary: false,
        }
    }

    pub fn header(mut self, header: &str) -> Self {
        self.header = header.into();
        self
    }

    pub fn commands_title(mut self, title: &str) -> Self {
        self.commands_title = title.into();
        self
    }

    pub fn placeholders(mut self, titles: &[&str]) -> Self {
        self.placeholders = titles.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn heavy_boundary(mut self) -> Self {
        self.heavy_boundary = true;
        self
    }
}

pub trait Bench: Send + Sync {
    fn desc(&self) -> BenchDesc;
    fn parse(&self, spec: &JobSpec) -> Result<Box<dyn Job>>;
}

fn register_bench(bench: Box<dyn Bench>) -> () {
    BENCHS.lock().unwrap().push(Arc::new(bench));
}

/// Parse the `runs` property shared by the repeated benchmarks.
fn parse_runs(v: &str) -> Result<u32> {
    match v.parse::<u32>()? {
        0 => bail!("runs must be positive"),
        v => Ok(v),
    }
}

/// `runN` keys in numerical order.
fn run_keys(result: &serde_json::Value) -> Vec<String> {
    let mut keys: Vec<(u32, String)> = match result.as_object() {
        Some(map) => map
            .keys()
            .filter_map(|k| {
                k.strip_prefix("run")
                    .and_then(|n| n.parse::<u32>().ok())
                    .map(|n| (n, k.clone()))
            })
            .collect(),
        None => vec![],
    };
    keys.sort();
    keys.into_iter().map(|(_, k)| k).collect()
}

fn unit_of(result: &serde_json::Value) -> &str {
    result["unit"].as_str().unwrap_or("")
}

/// Rows shared by the benchmarks which report a single series of runs
/// followed by the median.
fn format_runs<'a>(
    out: &mut Box<dyn Write + 'a>,
    result: &serde_json::Value,
    title: &str,
    full: bool,
    pretty: &dyn Fn(f64, &str) -> String,
) -> Result<()> {
    let unit = unit_of(result);
    if full {
        for key in run_keys(result).iter() {
            if let Some(val) = result[key].as_f64() {
                let title = format!("{}: Run {}", title, key.trim_start_matches("run"));
                write!(out, "{}", row(&title, &pretty(val, unit)))?;
            }
        }
        write!(out, "{}", separator())?;
    }
    if let Some(median) = result["median"].as_f64() {
        let title = match full {
            true => format!("{}: Median", title),
            false => title.to_string(),
        };
        write!(out, "{}", row(&title, &pretty(median, unit)))?;
    }
    Ok(())
}

/// `{:.2} unit` as used by the plain numeric rows.
fn plain(val: f64, unit: &str) -> String {
    match unit {
        "" => format!("{:.2}", val),
        unit => format!("{:.2} {}", val, unit),
    }
}

const DAEMON_REAP_TIMEOUT: Duration = Duration::from_secs(30);

/// A service started in the background for the duration of a job. It's
/// stopped through its pid file and its launcher reaped when dropped.
struct Daemon {
    name: &'static str,
    pidfile: PathBuf,
    child: Child,
}

impl Daemon {
    fn start(
        name: &'static str,
        cmd: &str,
        pidfile: &str,
        cwd: &Path,
        env: &[(String, String)],
        settle: Duration,
    ) -> Result<Self> {
        let pidfile = PathBuf::from(pidfile);
        if let Err(e) = fs::remove_file(&pidfile) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("daemon: Failed to remove stale {:?} ({})", &pidfile, &e);
            }
        }

        info!("daemon: Starting {}", name);
        let child = shell_spawn(cmd, Some(cwd), env)?;
        let daemon = Self {
            name,
            pidfile,
            child,
        };
        sleep_unless_exiting(settle)?;
        Ok(daemon)
    }

    fn pid(&self) -> Option<u32> {
        read_one_line(&self.pidfile)
            .ok()
            .and_then(|line| line.trim().parse::<u32>().ok())
    }

    /// Fail unless the pid file names a live process.
    fn verify(self) -> Result<Self> {
        match self.pid() {
            Some(pid) if Path::new(&format!("/proc/{}", pid)).exists() => {
                debug!("daemon: {} is running as {}", self.name, pid);
                Ok(self)
            }
            _ => bail!(BenchError::ServiceStart(self.name.into())),
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        info!("daemon: Stopping {}", self.name);
        if let Err(e) = kill_pidfile(&self.pidfile) {
            warn!("daemon: Failed to stop {} ({:#})", self.name, &e);
        }
        if let Err(e) = reap_child(&mut self.child, DAEMON_REAP_TIMEOUT) {
            warn!("daemon: Failed to reap {} ({:#})", self.name, &e);
        }
    }
}

mod compilation;
mod docker;
mod linpack;
mod lmbench;
mod mlc;
mod openssl;
mod stream;
mod ycsb;
mod zlib;

pub fn init_benchs() -> () {
    register_bench(Box::new(lmbench::LmbenchBench {}));
    register_bench(Box::new(mlc::MlcBench {}));
    register_bench(Box::new(openssl::OpenSslBench {}));
    register_bench(Box::new(compilation::CompilationBench {}));
    register_bench(Box::new(zlib::ZlibBench {}));
    register_bench(Box::new(linpack::LinpackBench {}));
    register_bench(Box::new(stream::StreamBench {}));
    register_bench(Box::new(ycsb::YcsbBench::nosql()));
    register_bench(Box::new(ycsb::YcsbBench::sql()));
    register_bench(Box::new(docker::DockerBench {}));
}

#[cfg(test)]
pub fn init_test_benchs() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(init_benchs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        init_test_benchs();
        let kinds: Vec<String> = all_benchs().iter().map(|b| b.desc().kind).collect();
        for kind in &[
            "lmbench",
            "mlc",
            "openssl",
            "compilation",
            "zlib",
            "linpack",
            "stream",
            "nosql",
            "sql",
            "docker",
        ] {
            assert!(kinds.contains(&kind.to_string()), "{} missing", kind);
        }
        assert_eq!(find_bench("nosql").unwrap().desc().title, "YCSB NoSQL");
        assert!(find_bench("fio").is_err());
    }

    #[test]
    fn test_run_keys() {
        let result = json!({"run10": 1.0, "run2": 2.0, "run1": 3.0, "runs": 3, "median": 2.0});
        assert_eq!(run_keys(&result), vec!["run1", "run2", "run10"]);
        assert!(parse_runs("0").is_err());
        assert_eq!(parse_runs("5").unwrap(), 5);
    }

    #[test]
    fn test_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("sleeper.pid");
        let cmd = format!("echo $$ > {}; exec sleep 30", pidfile.display());

        let daemon = Daemon::start(
            "sleeper",
            &cmd,
            &pidfile.to_string_lossy(),
            dir.path(),
            &[],
            Duration::from_millis(500),
        )
        .unwrap()
        .verify()
        .unwrap();
        let pid = daemon.pid().unwrap();
        assert_eq!(pid, daemon.child.id());
        drop(daemon);
        assert!(!Path::new(&format!("/proc/{}", pid)).exists());

        let failed = Daemon::start(
            "nopid",
            "exit 0",
            &dir.path().join("nopid.pid").to_string_lossy(),
            dir.path(),
            &[],
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(failed.verify().is_err());
    }

    #[test]
    fn test_bench_error() {
        for pair in &[
            (
                BenchError::MissingFile(PathBuf::from("/src/stream/stream")),
                "\"/src/stream/stream\" could not be found",
            ),
            (
                BenchError::ServiceStart("Cassandra".into()),
                "Cassandra failed to start.",
            ),
            (
                BenchError::NoResult("Triad bandwidth".into()),
                "No Triad bandwidth found in the output",
            ),
        ] {
            assert_eq!(pair.0.to_string(), pair.1);
        }
    }
}
