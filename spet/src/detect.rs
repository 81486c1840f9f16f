// Copyright (c) Facebook, Inc. and its affiliates.

// Hardware and software detection. Every probe tries the tools in order of
// preference and gives up with None. Parsing is kept apart from running the
// tools so that it can be tested on captured output.
use log::{debug, info};
use regex::Regex;
use std::path::Path;
use sysinfo::System;

use spet_intf::{Overrides, SysInfo};
use spet_util::*;

const CPU_CACHE_DIR: &str = "/sys/devices/system/cpu/cpu0/cache";
const NODE_GLOB: &str = "/sys/devices/system/node/node[0-9]*";

/// Output of `cmd` if its program is installed and it succeeds.
fn tool_output(cmd: &str) -> Option<String> {
    let prog = cmd.split_whitespace().next()?;
    find_bin(prog, Option::<&str>::None)?;
    match shell_output(cmd, None, &[]) {
        Ok(output) => Some(output),
        Err(e) => {
            debug!("detect: {:?} failed ({:#})", cmd, &e);
            None
        }
    }
}

/// Value of the first `key` line in lscpu style "Key: value" output.
fn field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines()
        .map(|line| line.trim())
        .find(|line| line.starts_with(key))
        .map(|line| line[key.len()..].trim())
        .filter(|val| !val.is_empty())
}

fn parse_u32(val: Option<&str>) -> Option<u32> {
    val?.split_whitespace().next()?.parse().ok()
}

/// Integer MHz from "3400.0000" or "4000 MHz".
fn parse_mhz(val: &str) -> Option<u64> {
    let mhz = val.split_whitespace().next()?.parse::<f64>().ok()?;
    if mhz > 0.0 {
        Some(mhz as u64)
    } else {
        None
    }
}

fn parse_cpuinfo_model(cpuinfo: &str) -> Option<String> {
    let line = cpuinfo.lines().find(|l| l.starts_with("model name"))?;
    let name = line.splitn(2, ':').nth(1)?.split_whitespace();
    Some(name.collect::<Vec<_>>().join(" ")).filter(|n| !n.is_empty())
}

pub fn processor_name() -> Option<String> {
    if let Some(name) = read_file("/proc/cpuinfo")
        .ok()
        .and_then(|cpuinfo| parse_cpuinfo_model(&cpuinfo))
    {
        return Some(name);
    }
    let lscpu = tool_output("lscpu")?;
    field(&lscpu, "Model name:")
        .or_else(|| field(&lscpu, "CPU:"))
        .map(|v| v.to_string())
}

/// `(sockets, cores, threads)` from the per-socket and per-core counts.
fn scale_topology(sockets: u32, cores_per_socket: u32, threads_per_core: u32) -> (u32, u32, u32) {
    let cores = sockets * cores_per_socket;
    (sockets, cores, cores * threads_per_core)
}

fn parse_lscpu_topology(lscpu: &str) -> Option<(u32, u32, u32)> {
    let sockets = parse_u32(field(lscpu, "Socket(s):"))?;
    let cps = parse_u32(field(lscpu, "Core(s) per socket:"))?;
    let tpc = parse_u32(field(lscpu, "Thread(s) per core:"))?;
    Some(scale_topology(sockets, cps, tpc))
}

fn parse_dmidecode_topology(dmidecode: &str) -> Option<(u32, u32, u32)> {
    let sockets = dmidecode
        .lines()
        .filter(|l| l.trim().starts_with("Socket Designation"))
        .count() as u32;
    let cps = parse_u32(field(dmidecode, "Core Count:"))?;
    let threads = parse_u32(field(dmidecode, "Thread Count:"))?;
    if sockets == 0 || cps == 0 {
        return None;
    }
    Some(scale_topology(sockets, cps, (threads / cps).max(1)))
}

/// A sibling list naming more than one cpu means SMT.
fn siblings_tpc(siblings: &str) -> u32 {
    let siblings = siblings.trim();
    if siblings.contains(',') || siblings.contains('-') {
        2
    } else {
        1
    }
}

pub fn topology() -> Option<(u32, u32, u32)> {
    if let Some(topo) = tool_output("lscpu").and_then(|out| parse_lscpu_topology(&out)) {
        return Some(topo);
    }
    if let Some(topo) = tool_output("dmidecode -t 4").and_then(|out| parse_dmidecode_topology(&out))
    {
        return Some(topo);
    }
    let tpc = read_one_line("/sys/devices/system/cpu/cpu1/topology/thread_siblings_list")
        .map(|s| siblings_tpc(&s))
        .unwrap_or(1);
    let threads = *NR_SYSTEM_CPUS as u32;
    Some(scale_topology(1, (threads / tpc).max(1), tpc))
}

pub fn numa_nodes() -> Option<u32> {
    if let Some(out) = tool_output("numactl --hardware") {
        let nr = out.lines().filter(|l| l.contains("cpus")).count() as u32;
        if nr > 0 {
            return Some(nr);
        }
    }
    let nr = glob::glob(NODE_GLOB).ok()?.filter_map(|p| p.ok()).count() as u32;
    Some(nr).filter(|nr| *nr > 0)
}

/// Bytes of a single cache from lscpu or sysfs sizes, e.g. "32K", "32 KiB"
/// or "1.5 MiB (48 instances)". Newer lscpu prints the total over all
/// instances, which is divided back down.
fn parse_cache_size(size: &str) -> Option<u64> {
    lazy_static::lazy_static! {
        static ref INSTANCES_RE: Regex = Regex::new(r"\((\d+) instances?\)").unwrap();
    }
    let instances = INSTANCES_RE
        .captures(size)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .filter(|nr| *nr > 0)
        .unwrap_or(1);
    let size = size.trim();
    let split = size
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(size.len());
    let val = size[..split].parse::<f64>().ok()?;
    let mult = match size[split..].trim_start().chars().next() {
        Some('K') | Some('k') => 1u64 << 10,
        Some('M') => 1 << 20,
        Some('G') => 1 << 30,
        _ => 1,
    };
    Some((val * mult as f64 / instances as f64).round() as u64)
}

/// `[l1i, l1d, l2, l3]` in bytes.
fn parse_lscpu_caches(lscpu: &str) -> [Option<u64>; 4] {
    let mut caches = [None; 4];
    for (idx, key) in ["L1i cache:", "L1d cache:", "L2 cache:", "L3 cache:"]
        .iter()
        .enumerate()
    {
        caches[idx] = field(lscpu, key).and_then(parse_cache_size);
    }
    caches
}

pub fn caches() -> [Option<u64>; 4] {
    if let Some(caches) = tool_output("lscpu").map(|out| parse_lscpu_caches(&out)) {
        if caches[1].is_some() {
            return caches;
        }
    }
    // index0 is the data and index1 the instruction L1
    let read = |idx: u32| {
        read_one_line(Path::new(CPU_CACHE_DIR).join(format!("index{}/size", idx)))
            .ok()
            .and_then(|size| parse_cache_size(&size))
    };
    [read(1), read(0), read(2), read(3)]
}

pub fn processor_frequency() -> Option<u64> {
    if let Some(out) = tool_output("dmidecode -t processor") {
        if let Some(mhz) = field(&out, "Max Speed:").and_then(parse_mhz) {
            return Some(mhz);
        }
    }
    if let Some(out) = tool_output("lscpu") {
        if let Some(mhz) = field(&out, "CPU max MHz:").and_then(parse_mhz) {
            return Some(mhz);
        }
    }
    grep_file("/proc/cpuinfo", r"^cpu MHz")
        .ok()?
        .first()
        .and_then(|l| l.splitn(2, ':').nth(1))
        .and_then(parse_mhz)
}

/// GB from a DIMM size such as "16GiB" or "8192MiB".
fn parse_dimm_size(size: &str) -> Option<u64> {
    let split = size.find(|c: char| !c.is_ascii_digit())?;
    let val = size[..split].parse::<u64>().ok()?;
    match &size[split..] {
        "GiB" => Some(val),
        "MiB" => Some((val as f64 / 1024.0).round() as u64),
        "KiB" => Some((val as f64 / (1 << 20) as f64).round() as u64),
        _ => None,
    }
}

/// Total GB of the `*-bank` entries of `lshw -class memory`.
fn parse_lshw_memory(lshw: &str) -> Option<u64> {
    let mut in_bank = false;
    let mut total = 0;
    for line in lshw.lines().map(|l| l.trim()) {
        if line.starts_with("*-") {
            in_bank = line.starts_with("*-bank");
        } else if in_bank {
            if let Some(size) = line.strip_prefix("size:") {
                total += parse_dimm_size(size.trim()).unwrap_or(0);
            }
        }
    }
    Some(total).filter(|t| *t > 0)
}

fn parse_meminfo_total(meminfo: &str) -> Option<u64> {
    let kb = field(meminfo, "MemTotal:")?
        .split_whitespace()
        .next()?
        .parse::<u64>()
        .ok()?;
    Some((kb as f64 / (1 << 20) as f64).round() as u64)
}

pub fn memory_total() -> Option<u64> {
    if let Some(gb) = tool_output("lshw -class memory").and_then(|out| parse_lshw_memory(&out)) {
        return Some(gb);
    }
    if let Some(gb) = read_file("/proc/meminfo")
        .ok()
        .and_then(|meminfo| parse_meminfo_total(&meminfo))
    {
        return Some(gb);
    }
    Some(to_gb(*TOTAL_SYSTEM_MEMORY).round() as u64).filter(|gb| *gb > 0)
}

fn parse_dmidecode_memory_speed(dmidecode: &str) -> Option<u64> {
    dmidecode
        .lines()
        .map(|l| l.trim())
        .filter(|l| l.starts_with("Speed:") && !l.contains("Unknown"))
        .find_map(|l| parse_mhz(&l["Speed:".len()..]))
}

pub fn memory_frequency() -> Option<u64> {
    if let Some(out) = tool_output("dmidecode -t memory") {
        if let Some(mhz) = parse_dmidecode_memory_speed(&out) {
            return Some(mhz);
        }
    }
    let out = tool_output("lshw -short -C memory")?;
    let dimm = out.lines().find(|l| l.contains("DIMM"))?;
    dimm.split_whitespace().nth(6).and_then(parse_mhz)
}

/// Values of `name_key` and `ver_key` in a shell style KEY="value" file.
fn parse_release(text: &str, name_key: &str, ver_key: &str) -> Option<(String, String)> {
    let value = |key: &str| {
        text.lines()
            .filter_map(|l| l.trim().strip_prefix(key)?.strip_prefix('='))
            .next()
            .map(|v| v.trim().trim_matches('"').trim_matches('\'').to_string())
    };
    Some((value(name_key)?, value(ver_key).unwrap_or_default()))
}

pub fn operating_system() -> Option<(String, String)> {
    if let Some(os) = read_file("/etc/os-release")
        .ok()
        .and_then(|text| parse_release(&text, "NAME", "VERSION"))
    {
        return Some(os);
    }
    if let Some(os) = read_file("/etc/lsb-release")
        .ok()
        .and_then(|text| parse_release(&text, "DISTRIB_ID", "DISTRIB_RELEASE"))
    {
        return Some(os);
    }
    for (path, name) in &[
        ("/etc/debian_version", "Debian"),
        ("/etc/redhat-release", "Redhat"),
    ] {
        if let Ok(ver) = read_file(path) {
            return Some((name.to_string(), ver.trim().to_string()));
        }
    }
    Some((System::name()?, System::os_version().unwrap_or_default()))
}

/// Word size of a machine name such as "x86_64", "i686" or "armv7l".
fn arch_bits(machine: &str) -> Option<u32> {
    lazy_static::lazy_static! {
        static ref ARM_RE: Regex = Regex::new(r"^armv(\d+)").unwrap();
        static ref X86_32_RE: Regex = Regex::new(r"^i[3-6]86").unwrap();
    }
    let machine = machine.to_lowercase();
    if let Some(caps) = ARM_RE.captures(&machine) {
        let ver = caps[1].parse::<u32>().ok()?;
        return Some(if ver >= 8 { 64 } else { 32 });
    }
    if machine.contains("64") {
        Some(64)
    } else if X86_32_RE.is_match(&machine) {
        Some(32)
    } else {
        None
    }
}

/// `(bits, machine type)`.
pub fn architecture() -> Option<(Option<u32>, String)> {
    let machine = tool_output("lscpu")
        .and_then(|out| field(&out, "Architecture:").map(|v| v.to_string()))
        .or_else(|| tool_output("uname -m").map(|out| out.trim().to_string()))
        .filter(|m| !m.is_empty())?;
    Some((arch_bits(&machine), machine))
}

fn parse_gcc_version(output: &str) -> Option<String> {
    lazy_static::lazy_static! {
        static ref GCC_RE: Regex = Regex::new(r"gcc\s\(.*\)\s([.0-9]+)").unwrap();
    }
    let first = output.lines().next()?;
    GCC_RE.captures(first).map(|caps| caps[1].to_string())
}

pub fn gcc_version() -> Option<String> {
    tool_output("gcc --version").and_then(|out| parse_gcc_version(&out))
}

/// The value gcc resolved `-{flag}=` to in `-Q --help=target` output.
/// "native" stands in when gcc couldn't resolve it.
fn parse_target_flag(output: &str, flag: &str) -> String {
    let prefix = format!("-{}=", flag);
    output
        .lines()
        .map(|l| l.trim())
        .find(|l| l.starts_with(&prefix))
        .and_then(|l| l.split_whitespace().nth(1))
        .filter(|v| !v.contains("native"))
        .unwrap_or("native")
        .to_string()
}

pub fn gcc_flags(processor: &str) -> String {
    let processor = processor.to_lowercase();
    let arch = match processor.contains("power") || processor.contains("ppc") {
        true => "mcpu",
        false => "march",
    };
    let march = tool_output(&format!("gcc -{}=native -Q --help=target", arch))
        .map(|out| parse_target_flag(&out, arch))
        .unwrap_or_else(|| "native".into());
    let mtune = tool_output(&format!(
        "gcc -{}={} -mtune=native -Q --help=target",
        arch, &march
    ))
    .map(|out| parse_target_flag(&out, "mtune"))
    .unwrap_or_else(|| "native".into());
    format!("-{}={} -mtune={}", arch, march, mtune)
}

fn parse_java_version(output: &str) -> Option<String> {
    lazy_static::lazy_static! {
        static ref JAVA_RE: Regex = Regex::new(r#"(\w+?)\sversion\s"(.+?)""#).unwrap();
    }
    let first = output.lines().next()?;
    JAVA_RE
        .captures(first)
        .map(|caps| format!("{}-{}", &caps[1], &caps[2]))
}

pub fn java_version() -> Option<String> {
    tool_output("java -version").and_then(|out| parse_java_version(&out))
}

/// Detect everything and apply `ovr` on top.
pub fn system_information(ovr: &Overrides) -> SysInfo {
    info!("detect: Detecting the system configuration");
    let mut si = SysInfo::default();

    si.processor_name = processor_name();
    if let Some((sockets, cores, threads)) = topology() {
        si.sockets = Some(sockets);
        si.cores = Some(cores);
        si.threads = Some(threads);
    }
    si.numa_nodes = numa_nodes();
    let [l1i, l1d, l2, l3] = caches();
    si.l1i_cache = l1i;
    si.l1d_cache = l1d;
    si.l2_cache = l2;
    si.l3_cache = l3;
    si.processor_frequency = processor_frequency();
    si.memory = memory_total();
    si.memory_frequency = memory_frequency();
    if let Some((name, ver)) = operating_system() {
        si.os_name = Some(name);
        si.os_ver = Some(ver);
    }
    if let Some((bits, machine)) = architecture() {
        si.arch_bits = bits;
        si.arch_type = Some(machine);
    }
    si.gcc_ver = gcc_version();
    si.java_ver = java_version();
    si.cflags = Some(gcc_flags(
        ovr.processor_name
            .as_deref()
            .or_else(|| si.processor_name.as_deref())
            .unwrap_or(""),
    ));

    si.apply_overrides(ovr);
    debug!("detect: {:?}", &si);
    si
}

#[cfg(test)]
mod tests {
    use super::*;

    const LSCPU: &str = "\
Architecture:        x86_64
CPU op-mode(s):      32-bit, 64-bit
CPU(s):              112
Thread(s) per core:  2
Core(s) per socket:  28
Socket(s):           2
NUMA node(s):        2
Model name:          Intel(R) Xeon(R) Platinum 8180 CPU @ 2.50GHz
CPU max MHz:         3800.0000
L1d cache:           32K
L1i cache:           32K
L2 cache:            1024K
L3 cache:            39424K
";

    #[test]
    fn test_processor() {
        let cpuinfo = "processor\t: 0\nvendor_id\t: GenuineIntel\n\
                       model name\t: Intel(R) Xeon(R)  Platinum 8180 CPU @ 2.50GHz\n";
        assert_eq!(
            parse_cpuinfo_model(cpuinfo).unwrap(),
            "Intel(R) Xeon(R) Platinum 8180 CPU @ 2.50GHz"
        );
        assert_eq!(parse_cpuinfo_model("processor\t: 0\n"), None);
        assert_eq!(field(LSCPU, "CPU max MHz:").and_then(parse_mhz), Some(3800));
        assert_eq!(parse_mhz("4000 MHz"), Some(4000));
        assert_eq!(parse_mhz("Unknown"), None);
    }

    #[test]
    fn test_topology() {
        assert_eq!(parse_lscpu_topology(LSCPU), Some((2, 56, 112)));
        assert_eq!(parse_lscpu_topology("CPU(s): 4\n"), None);

        let dmidecode = "\
Processor Information
\tSocket Designation: CPU1
\tCore Count: 32
\tThread Count: 64
Processor Information
\tSocket Designation: CPU2
\tCore Count: 32
\tThread Count: 64
";
        assert_eq!(parse_dmidecode_topology(dmidecode), Some((2, 64, 128)));

        assert_eq!(siblings_tpc("1,57\n"), 2);
        assert_eq!(siblings_tpc("0-1"), 2);
        assert_eq!(siblings_tpc("1"), 1);
    }

    #[test]
    fn test_caches() {
        assert_eq!(
            parse_lscpu_caches(LSCPU),
            [Some(32 << 10), Some(32 << 10), Some(1 << 20), Some(39424 << 10)]
        );
        for (size, bytes) in &[
            ("32K", 32 << 10),
            ("32 KiB", 32 << 10),
            ("1.5 MiB (48 instances)", 32 << 10),
            ("64 MiB (2 instances)", 32 << 20),
            ("1 MiB (1 instance)", 1 << 20),
            ("8M\n", 8 << 20),
            ("1G", 1 << 30),
            ("512", 512),
        ] {
            assert_eq!(parse_cache_size(size), Some(*bytes), "{:?}", size);
        }
        assert_eq!(parse_cache_size("none"), None);

        let lscpu = "\
L1d cache:                       1.5 MiB (48 instances)
L1i cache:                       1.5 MiB (48 instances)
L2 cache:                        48 MiB (48 instances)
L3 cache:                        64 MiB (2 instances)
";
        assert_eq!(
            parse_lscpu_caches(lscpu),
            [Some(32 << 10), Some(32 << 10), Some(1 << 20), Some(32 << 20)]
        );
    }

    #[test]
    fn test_memory() {
        let lshw = "\
  *-firmware
       size: 64KiB
  *-memory
       size: 32GiB
     *-bank:0
          description: DIMM DDR4 Synchronous 2666 MHz (0.4 ns)
          size: 16GiB
     *-bank:1
          description: [empty]
     *-bank:2
          size: 16384MiB
  *-cache:0
       size: 1MiB
";
        assert_eq!(parse_lshw_memory(lshw), Some(32));
        assert_eq!(parse_lshw_memory("  *-firmware\n"), None);
        assert_eq!(parse_meminfo_total("MemTotal:       65861212 kB\n"), Some(63));

        let dmidecode = "\
Memory Device
\tSpeed: Unknown
Memory Device
\tSpeed: 2666 MT/s
\tConfigured Memory Speed: 2400 MT/s
";
        assert_eq!(parse_dmidecode_memory_speed(dmidecode), Some(2666));
    }

    #[test]
    fn test_operating_system() {
        let os_release = "NAME=\"Ubuntu\"\nVERSION=\"16.04.3 LTS (Xenial Xerus)\"\nID=ubuntu\n";
        assert_eq!(
            parse_release(os_release, "NAME", "VERSION").unwrap(),
            ("Ubuntu".to_string(), "16.04.3 LTS (Xenial Xerus)".to_string())
        );
        let lsb = "DISTRIB_ID=Ubuntu\nDISTRIB_RELEASE=17.04\n";
        assert_eq!(
            parse_release(lsb, "DISTRIB_ID", "DISTRIB_RELEASE").unwrap(),
            ("Ubuntu".to_string(), "17.04".to_string())
        );
        assert_eq!(parse_release(lsb, "NAME", "VERSION"), None);

        for (machine, bits) in &[
            ("x86_64", Some(64)),
            ("aarch64", Some(64)),
            ("ppc64le", Some(64)),
            ("armv8l", Some(64)),
            ("armv7l", Some(32)),
            ("i686", Some(32)),
            ("mips", None),
        ] {
            assert_eq!(arch_bits(machine), *bits, "{}", machine);
        }
    }

    #[test]
    fn test_tool_versions() {
        assert_eq!(
            parse_gcc_version("gcc (Ubuntu 7.2.0-8ubuntu3) 7.2.0\nCopyright (C) 2017\n").unwrap(),
            "7.2.0"
        );
        assert_eq!(parse_gcc_version("clang version 5.0.0\n"), None);
        assert_eq!(
            parse_java_version(
                "openjdk version \"1.8.0_151\"\nOpenJDK Runtime Environment (build 1.8.0_151-b12)\n"
            )
            .unwrap(),
            "openjdk-1.8.0_151"
        );

        let target = "\
The following options are target specific:
  -march=                     \t\tskylake-avx512
  -mtune=                     \t\tgeneric
";
        assert_eq!(parse_target_flag(target, "march"), "skylake-avx512");
        assert_eq!(parse_target_flag(target, "mtune"), "generic");
        assert_eq!(parse_target_flag(target, "mcpu"), "native");
    }
}
