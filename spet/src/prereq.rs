// Copyright (c) Facebook, Inc. and its affiliates.

// Third-party packages the benchmarks depend on. They're all fetched into
// and built under <root>/src and every step is skipped if its output is
// already there, so reruns are cheap.
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use super::bench::BenchError;
use super::run::{env_set, RunCtx};
use spet_intf::{ver_prefix, with_opt_level};
use spet_util::*;

mod cassandra;
mod glibc;
mod mathlib;
mod maven;
mod mysql;
mod openmpi;
pub mod pkgmgr;

pub use glibc::GLIBC_PREFIX;
pub use mathlib::{MathLib, BLIS_COPYRIGHTS, MKL_INSTALL_DIR};

/// A tarball which gets downloaded into the source directory and unpacked
/// into `dir`.
#[derive(Clone, Debug)]
pub struct Source {
    pub name: String,
    pub url: Option<String>,
    pub archive: String,
    pub extracted: String,
    pub dir: String,
    pub manual_hint: Option<String>,
}

impl Source {
    pub fn new(name: &str, url: &str, archive: &str, extracted: &str, dir: &str) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            archive: archive.into(),
            extracted: extracted.into(),
            dir: dir.into(),
            manual_hint: None,
        }
    }

    /// A package which can't be downloaded automatically. `hint` tells the
    /// user where to get it.
    pub fn manual(name: &str, archive: &str, extracted: &str, dir: &str, hint: &str) -> Self {
        Self {
            name: name.into(),
            url: None,
            archive: archive.into(),
            extracted: extracted.into(),
            dir: dir.into(),
            manual_hint: Some(hint.into()),
        }
    }

    pub fn archive_path(&self, rctx: &RunCtx) -> PathBuf {
        rctx.src(&self.archive)
    }

    pub fn dir_path(&self, rctx: &RunCtx) -> PathBuf {
        rctx.src(&self.dir)
    }

    pub fn fetch(&self, rctx: &mut RunCtx) -> Result<PathBuf> {
        let archive = self.archive_path(rctx);
        if archive.exists() || self.dir_path(rctx).exists() {
            debug!("prereq: {:?} already present", &self.archive);
            return Ok(archive);
        }
        let url = match self.url.as_ref() {
            Some(url) => url,
            None => bail!(
                "{}",
                self.manual_hint
                    .clone()
                    .unwrap_or_else(|| format!("No URL for {}", &self.name))
            ),
        };
        info!("prereq: Downloading {}", &self.name);
        rctx.set_status(&format!("Downloading {}", &self.name));
        download(url, &archive)?;
        Ok(archive)
    }

    pub fn extract(&self, rctx: &mut RunCtx) -> Result<PathBuf> {
        let dir = self.dir_path(rctx);
        if dir.exists() {
            return Ok(dir);
        }
        let archive = self.archive_path(rctx);
        if !archive.exists() {
            return Err(BenchError::MissingFile(archive))
                .with_context(|| format!("Cannot extract {}", &self.name));
        }
        info!("prereq: Extracting {}", &self.name);
        rctx.set_status(&format!("Extracting {}", &self.name));
        extract_tar(&archive, &rctx.src_dir)?;
        if self.extracted != self.dir {
            let extracted = rctx.src(&self.extracted);
            fs::rename(&extracted, &dir)
                .with_context(|| format!("Renaming {:?} to {:?}", &extracted, &dir))?;
        }
        if !dir.exists() {
            bail!(BenchError::MissingFile(dir));
        }
        Ok(dir)
    }

    /// Fetch and extract.
    pub fn prepare(&self, rctx: &mut RunCtx) -> Result<PathBuf> {
        self.fetch(rctx)?;
        self.extract(rctx)
    }
}

/// Fail with `MissingFile` unless `path` exists.
pub fn check_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!(BenchError::MissingFile(path.into()));
    }
    Ok(())
}

pub trait Prereq {
    fn source(&self, rctx: &RunCtx) -> Source;

    fn build(&self, _rctx: &mut RunCtx) -> Result<()> {
        Ok(())
    }

    fn install(&self, _rctx: &mut RunCtx) -> Result<()> {
        Ok(())
    }
}

fn install_steps(
    prereq: &dyn Prereq,
    src: &Source,
    rctx: &mut RunCtx,
) -> std::result::Result<(), (&'static str, anyhow::Error)> {
    src.fetch(rctx).map_err(|e| ("download", e))?;
    src.extract(rctx).map_err(|e| ("extract", e))?;
    prereq.build(rctx).map_err(|e| ("compile", e))?;
    prereq.install(rctx).map_err(|e| ("install", e))?;
    Ok(())
}

fn install_prereq(prereq: &dyn Prereq, rctx: &mut RunCtx) {
    let src = prereq.source(rctx);
    rctx.start_progress(&src.name);
    if let Err((step, e)) = install_steps(prereq, &src, rctx) {
        error_message(&format!("{} failed to {}. ({:#})", &src.name, step, &e));
    }
    rctx.stop_progress();
}

/// Fetch, build and install every prerequisite. Failures are reported and
/// the benchmarks which need the package fail later on their own.
pub fn install_prerequisites(rctx: &mut RunCtx) {
    let mathlib = MathLib::for_processor(rctx.sysinfo.processor_name());
    info!("prereq: Using {} as the math library", mathlib.name());

    let mut prereqs: Vec<Box<dyn Prereq>> = vec![Box::new(openmpi::OpenMpi {})];
    prereqs.push(mathlib.prereq());
    prereqs.push(Box::new(glibc::Glibc {}));
    prereqs.push(Box::new(maven::Maven {}));
    prereqs.push(Box::new(mysql::MySql {}));
    prereqs.push(Box::new(cassandra::Cassandra {}));

    for prereq in prereqs.iter() {
        if prog_exiting() {
            warn!("prereq: Exiting, skipping the rest");
            return;
        }
        install_prereq(prereq.as_ref(), rctx);
    }
}
