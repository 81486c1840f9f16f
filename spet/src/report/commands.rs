// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

const CMD_WIDTH: usize = 70;
const CMD_INDENT: &str = "        ";

/// Strip the directories off every word, e.g. "/src/mlc/mlc_avx512" becomes
/// "mlc_avx512".
fn remove_paths(cmd: &str) -> String {
    cmd.split_whitespace()
        .map(|word| word.rsplit('/').next().unwrap_or(word))
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Commands each job recorded, in report order. Jobs which didn't record
/// anything are left out.
pub fn commands_table(jobs: &[JobCtx]) -> String {
    let mut buf = String::from("\n");
    buf += &title_block("Primary Commands Used");

    for kind in REPORT_ORDER.iter() {
        let jctx = match jobs.iter().find(|jctx| jctx.data.kind == *kind) {
            Some(jctx) if !jctx.data.commands.is_empty() => jctx,
            _ => continue,
        };
        let desc = jctx.bench.desc();
        buf += &match desc.heavy_boundary {
            true => boundary(),
            false => separator(),
        };
        buf += &center(&desc.commands_title, WIDTH);
        buf += "\n";
        buf += &boundary();
        for cmd in jctx.data.commands.iter() {
            buf += &fill(&remove_paths(cmd), CMD_WIDTH, CMD_INDENT);
            buf += "\n";
            buf += &separator();
        }
        buf += "\n";
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::init_test_benchs;
    use spet_intf::JobSpec;

    #[test]
    fn test_remove_paths() {
        for (cmd, stripped) in &[
            (
                "modprobe msr; /src/mlc/mlc_avx512 --latency_matrix",
                "modprobe msr; mlc_avx512 --latency_matrix",
            ),
            (
                "Build: ../configure --prefix=/usr/local/glibc",
                "Build: configure glibc",
            ),
            ("Run:   make -s -j 8", "Run: make -s -j 8"),
        ] {
            assert_eq!(remove_paths(cmd), *stripped);
        }
    }

    #[test]
    fn test_commands_table() {
        init_test_benchs();

        let mut openssl = JobCtx::new(&JobSpec::dfl("openssl")).unwrap();
        openssl.data.commands = vec![format!(
            "Run: taskset -c 1-79 /var/lib/spet/src/openssl/apps/openssl speed -multi 78 {}",
            "-evp aes-128-gcm ".repeat(4)
        )];
        let mut zlib = JobCtx::new(&JobSpec::dfl("zlib")).unwrap();
        zlib.data.commands = vec!["Build: ./configure && make -j 80".into()];
        let stream = JobCtx::new(&JobSpec::dfl("stream")).unwrap();

        let table = commands_table(&[openssl, zlib, stream]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "");
        assert_eq!(lines[1].trim(), "Primary Commands Used");
        assert_eq!(lines[2].trim(), "=====================");

        // zlib comes first and opens with a separator
        assert_eq!(lines[3], "-".repeat(WIDTH));
        assert_eq!(lines[4].trim(), "zlib");
        assert_eq!(lines[5], "=".repeat(WIDTH));
        assert_eq!(lines[6], "Build: configure && make -j 80");
        assert_eq!(lines[7], "-".repeat(WIDTH));
        assert_eq!(lines[8], "");

        // OpenSSL opens with a boundary and its command wraps
        assert_eq!(lines[9], "=".repeat(WIDTH));
        assert_eq!(lines[10].trim(), "OpenSSL");
        assert!(lines[12].starts_with("Run: taskset -c 1-79 openssl speed"));
        assert!(lines[12].len() <= CMD_WIDTH);
        assert!(lines[13].starts_with(CMD_INDENT));

        assert!(!table.contains("STREAM"));
    }
}
