// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;
use spet_intf::SysInfo;

/// Detected hardware and software. Fields which couldn't be detected are
/// left out.
pub fn system_table(si: &SysInfo, avx512: bool) -> String {
    let mut buf = separator();
    buf += &center("System Information", WIDTH);
    buf += "\n";
    buf += &boundary();

    if let Some(name) = si.processor_name.as_ref() {
        buf += &row("Processor Name:", name);
    }
    for (title, size) in &[
        ("L1 Instruction Cache:", si.l1i_cache),
        ("L1 Data Cache:", si.l1d_cache),
        ("L2 Cache:", si.l2_cache),
        ("L3 Cache:", si.l3_cache),
    ] {
        if let Some(size) = size.filter(|v| *v > 0) {
            buf += &row(title, &pretty_byte_size(size as f64, "B"));
        }
    }
    for (title, cnt) in &[
        ("Socket(s):", si.sockets),
        ("Core(s):", si.cores),
        ("Thread(s):", si.threads),
        ("NUMA Node(s):", si.numa_nodes),
    ] {
        if let Some(cnt) = cnt.filter(|v| *v > 0) {
            buf += &row(title, &cnt.to_string());
        }
    }
    buf += &separator();

    if let (Some(name), Some(ver)) = (si.os_name.as_ref(), si.os_ver.as_ref()) {
        buf += &row("Operating System:", &format!("{} {}", name, ver));
    }
    if let Some(bits) = si.arch_bits {
        buf += &row("Architecture:", &format!("{}-bit", bits));
    }
    if let Some(arch) = si.arch_type.as_ref() {
        buf += &row("Architecture Type:", arch);
    }
    buf += &separator();

    if let Some(mem) = si.memory.filter(|v| *v > 0) {
        buf += &row("Total RAM:", &format!("{} GB", mem));
    }
    if let Some(freq) = si.memory_frequency.filter(|v| *v > 0) {
        buf += &row("Memory Frequency:", &format!("{} MHz", freq));
    }
    buf += &separator();

    if let Some(gcc) = si.gcc_ver.as_ref() {
        buf += &row("GNU Compiler Collection (GCC):", gcc);
    }
    if let Some(cflags) = si.cflags.as_ref() {
        buf += &row("C Flags:", cflags);
    }
    if avx512 {
        buf += &row("LINPACK AVX-512 Flags:", "Enabled");
    }
    buf += &separator();
    buf
}
