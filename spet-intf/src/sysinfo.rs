// Copyright (c) Facebook, Inc. and its affiliates.
use serde::{Deserialize, Serialize};
use spet_util::*;

use super::Overrides;

pub const DFL_CFLAGS: &str = "-march=native -mtune=native";

/// Detected hardware and software configuration. Anything which couldn't
/// be detected is left as `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysInfo {
    pub processor_name: Option<String>,
    pub processor_frequency: Option<u64>,
    pub l1i_cache: Option<u64>,
    pub l1d_cache: Option<u64>,
    pub l2_cache: Option<u64>,
    pub l3_cache: Option<u64>,
    pub sockets: Option<u32>,
    pub cores: Option<u32>,
    pub threads: Option<u32>,
    pub numa_nodes: Option<u32>,
    pub os_name: Option<String>,
    pub os_ver: Option<String>,
    pub arch_bits: Option<u32>,
    pub arch_type: Option<String>,
    pub memory: Option<u64>,
    pub memory_frequency: Option<u64>,
    pub gcc_ver: Option<String>,
    pub cflags: Option<String>,
    pub java_ver: Option<String>,
    pub stream_array_size: Option<u64>,
}

impl SysInfo {
    pub fn apply_overrides(&mut self, ovr: &Overrides) {
        macro_rules! apply {
            ($($field:ident),*) => {
                $(
                    if ovr.$field.is_some() {
                        self.$field = ovr.$field.clone();
                    }
                )*
            };
        }
        apply!(
            processor_name,
            processor_frequency,
            l1i_cache,
            l1d_cache,
            l2_cache,
            l3_cache,
            sockets,
            cores,
            threads,
            numa_nodes,
            os_name,
            os_ver,
            arch_bits,
            arch_type,
            memory,
            memory_frequency,
            gcc_ver,
            cflags,
            stream_array_size
        );
    }

    pub fn largest_cache(&self) -> Option<u64> {
        self.l3_cache.or(self.l2_cache).or(self.l1d_cache)
    }

    pub fn nr_threads(&self) -> u32 {
        self.threads.unwrap_or(*NR_SYSTEM_CPUS as u32).max(1)
    }

    pub fn nr_cores(&self) -> u32 {
        self.cores.unwrap_or_else(|| self.nr_threads()).max(1)
    }

    pub fn nr_sockets(&self) -> u32 {
        self.sockets.unwrap_or(1).max(1)
    }

    pub fn cflags(&self) -> &str {
        self.cflags.as_deref().unwrap_or(DFL_CFLAGS)
    }

    pub fn processor_name(&self) -> &str {
        self.processor_name.as_deref().unwrap_or("Unknown Processor")
    }
}

/// `cflags` with `-O3` appended unless an optimization level is already set.
pub fn with_opt_level(cflags: &str) -> String {
    if cflags.contains("-O") {
        cflags.to_string()
    } else {
        format!("{} -O3 ", cflags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_overrides() {
        let mut si = SysInfo::default();
        si.cores = Some(4);
        si.threads = Some(8);
        si.l2_cache = Some(1 << 20);

        let mut ovr = Overrides::default();
        ovr.cores = Some(2);
        ovr.l3_cache = Some(8 << 20);
        si.apply_overrides(&ovr);

        assert_eq!(si.cores, Some(2));
        assert_eq!(si.threads, Some(8));
        assert_eq!(si.largest_cache(), Some(8 << 20));
    }

    #[test]
    fn test_largest_cache() {
        let mut si = SysInfo::default();
        assert_eq!(si.largest_cache(), None);
        si.l1d_cache = Some(32 << 10);
        assert_eq!(si.largest_cache(), Some(32 << 10));
        si.l2_cache = Some(256 << 10);
        assert_eq!(si.largest_cache(), Some(256 << 10));
    }

    #[test]
    fn test_defaults() {
        let si = SysInfo::default();
        assert_eq!(si.cflags(), DFL_CFLAGS);
        assert!(si.nr_threads() >= 1);
        assert_eq!(si.nr_sockets(), 1);
        assert_eq!(with_opt_level("-march=native"), "-march=native -O3 ");
        assert_eq!(with_opt_level("-O2 -march=native"), "-O2 -march=native");
    }
}
