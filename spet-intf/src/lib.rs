// Copyright (c) Facebook, Inc. and its affiliates.
use spet_util::*;

pub mod args;
pub mod jobspec;
pub mod overrides;
pub mod result;
pub mod sysinfo;
pub mod versions;

pub use args::{set_after_help, Args, Mode};
pub use jobspec::{format_job_props, JobProps, JobSpec};
pub use overrides::Overrides;
pub use result::{JobResult, ResultFile};
pub use sysinfo::{with_opt_level, SysInfo, DFL_CFLAGS};
pub use versions::{ver_prefix, PackageVersions};

lazy_static::lazy_static! {
    pub static ref VERSION: &'static str = env!("CARGO_PKG_VERSION");
    pub static ref FULL_VERSION: String = full_version(*VERSION);
}
