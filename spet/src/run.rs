// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::progress::BenchProgress;
use super::tune;
use spet_intf::{with_opt_level, Args, PackageVersions, SysInfo};

pub const AVX512_FLAGS: &str = " -mavx512f -mavx512cd -mavx512bw -mavx512dq -mavx512vl \
                                -mavx512ifma -mavx512vbmi ";

/// Everything a job needs to know about the run it's part of.
pub struct RunCtx {
    pub root: PathBuf,
    pub src_dir: PathBuf,
    pub run_dir: PathBuf,
    pub sysinfo: SysInfo,
    pub versions: PackageVersions,
    pub avx512: bool,
    pub prerun_settle: Duration,
    commands: Vec<String>,
    progress: Option<BenchProgress>,
}

impl RunCtx {
    pub fn new(args: &Args, run_dir: &Path, sysinfo: SysInfo) -> Self {
        Self {
            root: PathBuf::from(&args.root),
            src_dir: PathBuf::from(args.src_dir()),
            run_dir: run_dir.into(),
            sysinfo,
            versions: Default::default(),
            avx512: args.avx512,
            prerun_settle: Duration::from_secs_f64(args.prerun_settle.max(0.0)),
            commands: vec![],
            progress: None,
        }
    }

    /// `name` under the source directory.
    pub fn src<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.src_dir.join(name)
    }

    /// Per-bench output directory under the run directory, created on
    /// demand.
    pub fn job_dir(&self, kind: &str) -> Result<PathBuf> {
        let dir = self.run_dir.join(kind);
        fs::create_dir_all(&dir).with_context(|| format!("Creating {:?}", &dir))?;
        Ok(dir)
    }

    pub fn nr_threads(&self) -> u32 {
        self.sysinfo.nr_threads()
    }

    pub fn nr_cores(&self) -> u32 {
        self.sysinfo.nr_cores()
    }

    /// Compiler flags with an optimization level.
    pub fn cflags(&self) -> String {
        with_opt_level(self.sysinfo.cflags())
    }

    pub fn avx_flags(&self) -> &'static str {
        if self.avx512 {
            AVX512_FLAGS
        } else {
            ""
        }
    }

    pub fn mpi_dir(&self) -> PathBuf {
        self.src("openmpi/build")
    }

    pub fn mpi_bin(&self, name: &str) -> PathBuf {
        self.mpi_dir().join("bin").join(name)
    }

    /// Environment which makes the OpenMPI build usable.
    pub fn mpi_env(&self) -> Vec<(String, String)> {
        let mpi = self.mpi_dir();
        vec![
            env_append("PATH", &mpi.join("bin").to_string_lossy()),
            env_append("LD_LIBRARY_PATH", &mpi.join("lib").to_string_lossy()),
        ]
    }

    /// Remember a command for the commands table. `cmd` should carry its
    /// stage prefix, e.g. "Run: ".
    pub fn record_cmd(&mut self, cmd: &str) {
        debug!("command: {}", cmd);
        self.commands.push(cmd.to_string());
    }

    pub fn take_commands(&mut self) -> Vec<String> {
        std::mem::take(&mut self.commands)
    }

    pub fn start_progress(&mut self, title: &str) {
        self.progress = Some(BenchProgress::new(title));
    }

    pub fn stop_progress(&mut self) {
        self.progress = None;
    }

    pub fn set_status(&mut self, status: &str) {
        match self.progress.as_mut() {
            Some(progress) => progress.set_status(status),
            None => debug!("status: {}", status),
        }
    }

    /// Flush and drop caches, then settle before a measurement.
    pub fn prerun(&mut self) -> Result<()> {
        self.set_status("Dropping caches");
        tune::prerun(self.prerun_settle)
    }
}

fn env_join(var: &str, val: &str, prepend: bool) -> (String, String) {
    let joined = match std::env::var(var) {
        Ok(cur) if cur.len() > 0 => {
            if prepend {
                format!("{}:{}", val, cur)
            } else {
                format!("{}:{}", cur, val)
            }
        }
        _ => val.to_string(),
    };
    (var.to_string(), joined)
}

/// `var=val:$var`
pub fn env_prepend(var: &str, val: &str) -> (String, String) {
    env_join(var, val, true)
}

/// `var=$var:val`
pub fn env_append(var: &str, val: &str) -> (String, String) {
    env_join(var, val, false)
}

pub fn env_set(var: &str, val: &str) -> (String, String) {
    (var.to_string(), val.to_string())
}

#[cfg(test)]
pub fn test_rctx(root: &Path) -> RunCtx {
    let args = Args {
        root: root.to_string_lossy().to_string(),
        results_dir: root.join("results").to_string_lossy().to_string(),
        prerun_settle: 0.0,
        ..Default::default()
    };
    let mut sysinfo = SysInfo::default();
    sysinfo.processor_name = Some("Intel(R) Xeon(R) Gold 6148 CPU @ 2.40GHz".into());
    sysinfo.sockets = Some(2);
    sysinfo.cores = Some(40);
    sysinfo.threads = Some(80);
    sysinfo.l3_cache = Some(28160 << 10);
    sysinfo.memory = Some(192);
    RunCtx::new(&args, &root.join("results/SPET.001.test"), sysinfo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_join() {
        let (k, v) = env_prepend("SPET_TEST_UNSET_VAR", "/a/bin");
        assert_eq!((k.as_str(), v.as_str()), ("SPET_TEST_UNSET_VAR", "/a/bin"));

        std::env::set_var("SPET_TEST_PATH_VAR", "/usr/bin");
        assert_eq!(env_prepend("SPET_TEST_PATH_VAR", "/a").1, "/a:/usr/bin");
        assert_eq!(env_append("SPET_TEST_PATH_VAR", "/a").1, "/usr/bin:/a");
    }

    #[test]
    fn test_commands_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut rctx = test_rctx(dir.path());
        assert_eq!(rctx.src("stream"), dir.path().join("src/stream"));
        assert_eq!(rctx.mpi_bin("mpicc"), dir.path().join("src/openmpi/build/bin/mpicc"));
        assert!(rctx.job_dir("stream").unwrap().is_dir());
        assert_eq!(rctx.avx_flags(), "");
        assert_eq!(rctx.cflags(), "-march=native -mtune=native -O3 ");

        rctx.record_cmd("Build: make");
        rctx.record_cmd("Run: ./stream");
        assert_eq!(rctx.take_commands(), vec!["Build: make", "Run: ./stream"]);
        assert!(rctx.take_commands().is_empty());

        rctx.avx512 = true;
        assert!(rctx.avx_flags().contains("-mavx512f"));
    }
}
