// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use spet_util::*;

const OVERRIDES_DOC: &str = "\
//
// spet system information overrides
//
// Every field is optional. A set field replaces the detected value.
//
//  processor_name: Processor name, e.g. \"Intel Core(TM) i7-7700 CPU\"
//  os_name: Distribution name, e.g. \"openSUSE Leap\"
//  os_ver: Distribution version, e.g. \"42.2\"
//  gcc_ver: GNU Compiler version, e.g. \"5.2.0\"
//  arch_bits: 32 or 64
//  arch_type: Architecture type, e.g. \"x86_64\"
//  sockets: Total number of sockets
//  cores: Total number of cores
//  threads: Total number of threads
//  memory: Total RAM in GB
//  cflags: Full C flags, e.g. \"-Ofast -march=broadwell -mtune=generic\"
//  l1i_cache: L1 instruction cache size in bytes
//  l1d_cache: L1 data cache size in bytes
//  l2_cache: L2 cache size in bytes
//  l3_cache: L3 cache size in bytes
//  processor_frequency: Processor frequency in MHz
//  memory_frequency: Memory frequency in MHz
//  stream_array_size: STREAM array size
//  numa_nodes: Number of NUMA nodes
//
";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overrides {
    pub processor_name: Option<String>,
    pub os_name: Option<String>,
    pub os_ver: Option<String>,
    pub gcc_ver: Option<String>,
    pub arch_bits: Option<u32>,
    pub arch_type: Option<String>,
    pub sockets: Option<u32>,
    pub cores: Option<u32>,
    pub threads: Option<u32>,
    pub memory: Option<u64>,
    pub cflags: Option<String>,
    pub l1i_cache: Option<u64>,
    pub l1d_cache: Option<u64>,
    pub l2_cache: Option<u64>,
    pub l3_cache: Option<u64>,
    pub processor_frequency: Option<u64>,
    pub memory_frequency: Option<u64>,
    pub stream_array_size: Option<u64>,
    pub numa_nodes: Option<u32>,
}

impl Overrides {
    /// Apply a single `key=val` override. Cache sizes accept unit suffixes.
    pub fn parse(&mut self, k: &str, v: &str) -> Result<bool> {
        let mut consumed = true;
        match k {
            "processor_name" => self.processor_name = Some(v.into()),
            "os_name" => self.os_name = Some(v.into()),
            "os_ver" => self.os_ver = Some(v.into()),
            "gcc_ver" => self.gcc_ver = Some(v.into()),
            "arch_bits" => self.arch_bits = Some(v.parse::<u32>()?),
            "arch_type" => self.arch_type = Some(v.into()),
            "sockets" => self.sockets = Some(v.parse::<u32>()?),
            "cores" => self.cores = Some(v.parse::<u32>()?),
            "threads" => self.threads = Some(v.parse::<u32>()?),
            "memory" => self.memory = Some(v.parse::<u64>()?),
            "cflags" => self.cflags = Some(v.into()),
            "l1i_cache" => self.l1i_cache = Some(parse_size(v)?),
            "l1d_cache" => self.l1d_cache = Some(parse_size(v)?),
            "l2_cache" => self.l2_cache = Some(parse_size(v)?),
            "l3_cache" => self.l3_cache = Some(parse_size(v)?),
            "processor_frequency" => self.processor_frequency = Some(v.parse::<u64>()?),
            "memory_frequency" => self.memory_frequency = Some(v.parse::<u64>()?),
            "stream_array_size" => self.stream_array_size = Some(v.parse::<u64>()?),
            "numa_nodes" => self.numa_nodes = Some(v.parse::<u32>()?),
            _ => consumed = false,
        }
        Ok(consumed)
    }

    /// Layer `other` on top. Fields set in `other` win.
    pub fn merge(&mut self, other: &Overrides) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(
                    if other.$field.is_some() {
                        self.$field = other.$field.clone();
                    }
                )*
            };
        }
        take!(
            processor_name,
            os_name,
            os_ver,
            gcc_ver,
            arch_bits,
            arch_type,
            sockets,
            cores,
            threads,
            memory,
            cflags,
            l1i_cache,
            l1d_cache,
            l2_cache,
            l3_cache,
            processor_frequency,
            memory_frequency,
            stream_array_size,
            numa_nodes
        );
    }
}

impl JsonLoad for Overrides {}

impl JsonSave for Overrides {
    fn preamble() -> Option<String> {
        Some(OVERRIDES_DOC.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let mut ovr = Overrides::default();
        for (k, v) in &[
            ("cores", "8"),
            ("l3_cache", "8M"),
            ("cflags", "-O2 -march=skylake"),
            ("memory", "64"),
        ] {
            assert!(ovr.parse(k, v).unwrap());
        }
        assert!(!ovr.parse("unknown", "1").unwrap());
        assert!(ovr.parse("threads", "many").is_err());

        assert_eq!(ovr.cores, Some(8));
        assert_eq!(ovr.l3_cache, Some(8 << 20));
        assert_eq!(ovr.cflags.as_deref(), Some("-O2 -march=skylake"));
        assert_eq!(ovr.memory, Some(64));
    }

    #[test]
    fn test_merge() {
        let mut base = Overrides::default();
        base.cores = Some(4);
        base.threads = Some(8);

        let mut top = Overrides::default();
        top.cores = Some(16);
        top.os_name = Some("openSUSE Leap".into());

        base.merge(&top);
        assert_eq!(base.cores, Some(16));
        assert_eq!(base.threads, Some(8));
        assert_eq!(base.os_name.as_deref(), Some("openSUSE Leap"));
    }

    #[test]
    fn test_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        let cfg = JsonConfigFile::<Overrides>::load_or_create(Some(&path)).unwrap();
        assert_eq!(cfg.data, Overrides::default());

        std::fs::write(&path, "// comment\n{ \"sockets\": 2 }\n").unwrap();
        let cfg = JsonConfigFile::<Overrides>::load(&path).unwrap();
        assert_eq!(cfg.data.sockets, Some(2));
        assert_eq!(cfg.data.cores, None);
    }
}
