// Copyright (c) Facebook, Inc. and its affiliates.
use log::{debug, info, warn};
use std::path::PathBuf;

use spet_util::*;

const ZYPPER_PKGS: &[&str] = &[
    "gawk",
    "coreutils",
    "-t pattern devel_basis",
    "gcc",
    "gcc-fortran",
    "util-linux",
    "R-base",
    "bc",
    "lshw",
    "numactl",
    "java",
    "libaio",
    "python",
];

const YUM_PKGS: &[&str] = &[
    "epel-release",
    "gawk",
    "coreutils",
    "gcc",
    "gcc-gfortran",
    "util-linux",
    "R",
    "R-littler",
    "bc",
    "lshw",
    "numactl",
    "java-sdk",
    "libaio",
    "python",
];

const APT_PKGS: &[&str] = &[
    "coreutils",
    "build-essential",
    "gcc",
    "gfortran",
    "util-linux",
    "r-base",
    "littler",
    "bc",
    "lshw",
    "numactl",
    "default-jdk",
    "libaio1",
    "python",
];

const MANUAL_PKGS: &[&str] = &[
    "coreutils",
    "\"make\" and other development tools for building packages",
    "gcc",
    "gfortran",
    "util-linux",
    "\"littler\" package for R",
    "bc",
    "lshw",
    "numactl",
    "java-jdk",
    "libaio",
    "python2",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkgMgr {
    Zypper,
    Yum,
    AptGet,
    Aptitude,
    Apt,
    Unknown,
}

impl PkgMgr {
    const DETECT_ORDER: [PkgMgr; 5] = [
        PkgMgr::Zypper,
        PkgMgr::Yum,
        PkgMgr::AptGet,
        PkgMgr::Aptitude,
        PkgMgr::Apt,
    ];

    /// The first supported package manager found by `exists`.
    fn detect_with<F: Fn(&str) -> bool>(exists: F) -> Self {
        for mgr in Self::DETECT_ORDER.iter() {
            if exists(mgr.bin()) {
                return *mgr;
            }
        }
        Self::Unknown
    }

    pub fn detect() -> Self {
        Self::detect_with(|bin| find_bin::<_, PathBuf>(bin, None).is_some())
    }

    fn bin(&self) -> &'static str {
        match self {
            Self::Zypper => "zypper",
            Self::Yum => "yum",
            Self::AptGet => "apt-get",
            Self::Aptitude => "aptitude",
            Self::Apt => "apt",
            Self::Unknown => "",
        }
    }

    pub fn packages(&self) -> &'static [&'static str] {
        match self {
            Self::Zypper => ZYPPER_PKGS,
            Self::Yum => YUM_PKGS,
            Self::AptGet | Self::Aptitude | Self::Apt => APT_PKGS,
            Self::Unknown => MANUAL_PKGS,
        }
    }

    /// Commands to run in order, one package per command so that a single
    /// missing package doesn't hold up the rest.
    pub fn commands(&self) -> Vec<String> {
        let prefix = match self {
            Self::Zypper => "sudo -E zypper install -l -y --force-resolution".to_string(),
            Self::Yum => "sudo -E yum install -y --skip-broken".to_string(),
            Self::AptGet | Self::Aptitude | Self::Apt => {
                format!("sudo -E {} install -y --ignore-missing", self.bin())
            }
            Self::Unknown => return vec![],
        };
        let mut cmds = vec![];
        if *self == Self::Yum {
            cmds.push("sudo -E yum groupinstall -y --skip-broken \"Development Tools\"".into());
        }
        for pkg in self.packages().iter() {
            cmds.push(format!("{} {}", &prefix, pkg));
        }
        cmds
    }
}

/// Install the system packages the benchmarks need. Individual failures
/// are warnings.
pub fn install_packages() {
    let mgr = PkgMgr::detect();
    if mgr == PkgMgr::Unknown {
        warn!("pkgmgr: Unknown package manager");
        error_message("The appropriate package manager for your system could not be found");
        println!("Please try manually installing the following and rerun this program:");
        for pkg in mgr.packages().iter() {
            println!("{}", pkg);
        }
        return;
    }

    info!("pkgmgr: Installing prerequisites using {:?}", mgr.bin());
    for cmd in mgr.commands().iter() {
        if prog_exiting() {
            return;
        }
        match shell_output(cmd, None, &[]) {
            Ok(output) => debug!("pkgmgr: {:?} output: {}", cmd, output.trim_end()),
            Err(e) => warn!("pkgmgr: {:#}", &e),
        }
    }
}
