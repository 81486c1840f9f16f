// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;
use crate::prereq::{MathLib, BLIS_COPYRIGHTS};
use spet_intf::{PackageVersions, SysInfo};

pub fn packages_table(vers: &PackageVersions, si: &SysInfo) -> String {
    let mathlib = MathLib::for_processor(si.processor_name());

    let mut buf = String::from("\n");
    buf += &separator();
    buf += &center("Primary Packages Used", WIDTH);
    buf += "\n";
    buf += &boundary();

    for (title, ver) in &[
        ("LMbench:", &vers.lmbench),
        ("Intel(R) Memory Latency Checker:", &vers.mlc),
        ("OpenSSL:", &vers.openssl),
        ("High-Performance Linpack:", &vers.linpack),
        ("STREAM:", &vers.stream),
        ("Linux Kernel:", &vers.linux),
        ("zlib:", &vers.zlib),
        ("Cassandra:", &vers.cassandra),
        ("YCSB:", &vers.ycsb),
        ("MySQL:", &vers.mysql),
        ("MySQL GLibC:", &vers.mysql_glibc),
        ("Docker:", &vers.docker),
    ] {
        if !ver.is_empty() {
            buf += &row(title, ver);
        }
    }
    buf += &separator();

    buf += &row("OpenMPI:", &vers.openmpi);
    buf += &row("GNU C Library (glibc):", &vers.glibc);
    if mathlib == MathLib::OpenBlas {
        buf += &row("OpenBLAS:", &vers.openblas);
    }
    buf += &row("Maven:", &vers.maven);
    match mathlib {
        MathLib::Mkl => buf += &row("Intel(R) Math Kernel Library:", &vers.mkl),
        MathLib::Blis => buf += &row("AMD BLIS*:", &vers.blis),
        MathLib::OpenBlas => {}
    }
    buf += &row("MySQL Connector/J:", &vers.jconnect);
    if let Some(java) = si.java_ver.as_ref() {
        buf += &row("Java:", java);
    }
    buf += &separator();

    if mathlib == MathLib::Blis {
        for line in BLIS_COPYRIGHTS.iter() {
            buf += line;
            buf += "\n";
        }
        buf += &separator();
    }
    buf += "\n";
    buf
}
