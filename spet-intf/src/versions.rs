// Copyright (c) Facebook, Inc. and its affiliates.
use serde::{Deserialize, Serialize};

/// Versions of every third-party package spet fetches and builds. They end
/// up in download URLs, install paths and the packages table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageVersions {
    pub lmbench: String,
    pub mlc: String,
    pub openmpi: String,
    pub glibc: String,
    pub openssl: String,
    pub linpack: String,
    pub stream: String,
    pub openblas: String,
    pub linux: String,
    pub zlib: String,
    pub cassandra: String,
    pub ycsb: String,
    pub maven: String,
    pub mysql: String,
    pub mysql_glibc: String,
    pub mkl: String,
    pub mkl_url: Option<String>,
    pub blis: String,
    pub jconnect: String,
    pub docker: String,
}

impl Default for PackageVersions {
    fn default() -> Self {
        Self {
            lmbench: "3".into(),
            mlc: "3.4".into(),
            openmpi: "3.0.0".into(),
            glibc: "2.26".into(),
            openssl: "1.1.0g".into(),
            linpack: "2.2".into(),
            stream: "5.10".into(),
            openblas: "0.2.20".into(),
            linux: "4.14.4".into(),
            zlib: "1.2.11".into(),
            cassandra: "3.11.1".into(),
            ycsb: "0.12.0".into(),
            maven: "3.5.2".into(),
            mysql: "5.7.20".into(),
            mysql_glibc: "2.12".into(),
            mkl: "2018.0.128".into(),
            mkl_url: Some(
                "http://registrationcenter-download.intel.com/akdlm/irc_nas/tec/12070/l_mkl_2018.0.128.tgz"
                    .into(),
            ),
            blis: "0.9-11-Beta".into(),
            jconnect: "5.1.44".into(),
            docker: "17.09.1".into(),
        }
    }
}

/// The first `n` dot-separated components of `ver`, e.g. "3.0" for
/// `ver_prefix("3.0.0", 2)`.
pub fn ver_prefix(ver: &str, n: usize) -> String {
    ver.split('.').take(n).collect::<Vec<&str>>().join(".")
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_ver_prefix() {
        for (ver, n, prefix) in &[
            ("3.0.0", 2, "3.0"),
            ("5.7.20", 2, "5.7"),
            ("4.14.4", 1, "4"),
            ("3", 2, "3"),
        ] {
            assert_eq!(super::ver_prefix(ver, *n), *prefix);
        }
    }
}
