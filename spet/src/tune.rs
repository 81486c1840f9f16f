// Copyright (c) Facebook, Inc. and its affiliates.
//
// System tuning applied before benchmarking. Everything here is best
// effort: failures are logged as warnings and the run carries on.
use anyhow::Result;
use log::{info, warn};
use std::path::Path;
use std::time::Duration;

use spet_util::*;

const NOFILE_LIMIT: u64 = 1048576;
const LIMITS_CONF: &str = "/etc/security/limits.conf";
const SYSCTL_CONF: &str = "/etc/sysctl.conf";
const LIMITS_LINE: &str = "* - nofile 1048576";
const SYSCTL_LINE: &str = "fs.file-max = 1048576";

pub fn performance_governor() {
    let pattern = "/sys/devices/system/cpu/cpu[0-9]*/cpufreq/scaling_governor";
    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(e) => {
            warn!("tune: Invalid glob pattern {:?} ({})", pattern, &e);
            return;
        }
    };
    let mut nr_set = 0;
    for path in paths.filter_map(|p| p.ok()) {
        match write_one_line(&path, "performance") {
            Ok(()) => nr_set += 1,
            Err(e) => warn!("tune: Failed to set governor on {:?} ({:#})", &path, &e),
        }
    }
    info!("tune: Performance governor set on {} CPUs", nr_set);
}

pub fn disable_hugepages() {
    let path = "/sys/kernel/mm/transparent_hugepage/enabled";
    if let Err(e) = write_one_line(path, "never") {
        warn!("tune: Failed to disable transparent hugepages ({:#})", &e);
    }
}

pub fn disable_swap() {
    if let Err(e) = shell_output("sudo swapoff -a", None, &[]) {
        warn!("tune: Failed to disable swap ({:#})", &e);
    }
}

fn set_rlimit(resource: libc::__rlimit_resource_t, name: &str, limit: libc::rlim_t) {
    let rlim = libc::rlimit {
        rlim_cur: limit,
        rlim_max: limit,
    };
    if unsafe { libc::setrlimit(resource, &rlim) } < 0 {
        warn!(
            "tune: Failed to set {} limit ({})",
            name,
            std::io::Error::last_os_error()
        );
    }
}

/// Raise the limits of this process. Children inherit them.
pub fn raise_ulimits() {
    set_rlimit(libc::RLIMIT_STACK, "stack", libc::RLIM_INFINITY);
    set_rlimit(libc::RLIMIT_NOFILE, "nofile", NOFILE_LIMIT as libc::rlim_t);
    set_rlimit(libc::RLIMIT_NPROC, "nproc", libc::RLIM_INFINITY);
}

/// Append `line` to `path` unless it's already there. Returns whether the
/// file was modified.
fn ensure_line<P: AsRef<Path>>(path: P, line: &str) -> Result<bool> {
    let path = path.as_ref();
    let content = if path.exists() {
        read_file(path)?
    } else {
        String::new()
    };
    if content.lines().any(|l| l.trim() == line) {
        return Ok(false);
    }
    let mut text = String::new();
    if content.len() > 0 && !content.ends_with('\n') {
        text += "\n";
    }
    text += line;
    text += "\n";
    write_file(path, &text, true)?;
    Ok(true)
}

/// Raise the system-wide open file limits persistently.
pub fn raise_nofiles() {
    for (path, line) in &[(LIMITS_CONF, LIMITS_LINE), (SYSCTL_CONF, SYSCTL_LINE)] {
        match ensure_line(path, line) {
            Ok(true) => info!("tune: Added {:?} to {}", line, path),
            Ok(false) => {}
            Err(e) => warn!("tune: Failed to update {} ({:#})", path, &e),
        }
    }
    if let Err(e) = shell_output("sudo sysctl -p", None, &[]) {
        warn!("tune: Failed to reload sysctl settings ({:#})", &e);
    }
}

pub fn tune_system() {
    performance_governor();
    disable_hugepages();
    disable_swap();
    raise_ulimits();
    raise_nofiles();
}

/// Called before every measurement. Fails only when the program is being
/// torn down while settling.
pub fn prerun(settle: Duration) -> Result<()> {
    if let Err(e) = shell_output("sudo sync", None, &[]) {
        warn!("tune: Failed to sync ({:#})", &e);
    }
    if let Err(e) = write_one_line("/proc/sys/vm/drop_caches", "3") {
        warn!("tune: Failed to drop caches ({:#})", &e);
    }
    sleep_unless_exiting(settle)
}
