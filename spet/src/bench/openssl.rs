// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

const DFL_RUNS: u32 = 3;
const TESTS: [(&str, u32); 2] = [("aes-128-gcm", 128), ("aes-256-gcm", 256)];
const SCORE_SIZE: u32 = 8192;
const SIBLINGS_PATH: &str = "/sys/devices/system/cpu/cpu1/topology/thread_siblings_list";

pub struct OpenSslBench {}

impl Bench for OpenSslBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new("openssl", "OpenSSL")
            .header(&format!(
                "Cryptography using OpenSSL AES-GCM {} bytes. Higher throughput is better.",
                SCORE_SIZE
            ))
            .placeholders(&["Encryption", "Decryption"])
            .heavy_boundary()
    }

    fn parse(&self, spec: &JobSpec) -> Result<Box<dyn Job>> {
        let mut job = OpenSslJob { runs: DFL_RUNS };
        for (k, v) in spec.props[0].iter() {
            match k.as_str() {
                "runs" => job.runs = parse_runs(v)?,
                k => bail!("unknown property key {:?}", k),
            }
        }
        Ok(Box::new(job))
    }
}

struct OpenSslJob {
    runs: u32,
}

/// CPUs to pin to, leaving the first core free. `siblings` is the
/// `thread_siblings_list` of cpu1.
fn taskset_ids(threads: u32, siblings: &str) -> String {
    let sibs: Vec<u32> = siblings
        .trim()
        .split(',')
        .filter_map(|tok| tok.trim().parse::<u32>().ok())
        .collect();
    if sibs.len() <= 1 {
        return format!("1-{}", threads - 1);
    }
    format!(
        "{}-{},{}-{}",
        sibs[0],
        threads / 2 - 1,
        sibs[1],
        threads - 1
    )
}

/// Number of `-multi` workers matching `taskset_ids()`.
fn multi_num(threads: u32, ids: &str) -> u32 {
    if ids.contains(',') {
        threads.saturating_sub(2).max(1)
    } else {
        threads.saturating_sub(1).max(1)
    }
}

/// Throughput in bytes per second from the last line of `openssl speed`,
/// which reports thousands of bytes.
fn parse_speed(output: &str) -> Result<f64> {
    let last = output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| BenchError::NoResult("speed".into()))?;
    let tok = match last.split_whitespace().nth(6) {
        Some(tok) => tok,
        None => bail!(BenchError::NoResult("speed".into())),
    };
    let digits: String = tok
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let kbps = digits
        .parse::<f64>()
        .with_context(|| format!("Parsing speed {:?}", tok))?;
    Ok(kbps * 1000.0)
}

impl OpenSslJob {
    fn openssl_dir(rctx: &RunCtx) -> PathBuf {
        rctx.src("openssl")
    }

    fn bin_path(rctx: &RunCtx) -> PathBuf {
        Self::openssl_dir(rctx).join("apps/openssl")
    }

    fn measure(
        rctx: &mut RunCtx,
        cmd: &str,
        env: &[(String, String)],
        out_path: &Path,
    ) -> Result<f64> {
        rctx.prerun()?;
        let output = shell_output(cmd, None, env)?;
        write_file(out_path, &output, false)?;
        parse_speed(&output)
    }
}

impl Job for OpenSslJob {
    fn setup(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let ver = rctx.versions.openssl.clone();
        let archive = format!("openssl-{}.tar.gz", &ver);
        let dir = Source::new(
            "OpenSSL",
            &format!("https://www.openssl.org/source/{}", &archive),
            &archive,
            &format!("openssl-{}", &ver),
            "openssl",
        )
        .prepare(rctx)?;

        let bin = Self::bin_path(rctx);
        if bin.exists() {
            return Ok(());
        }

        let cflags = rctx.cflags();
        let cores = rctx.nr_cores();
        let config_cmd = format!(
            "./config -Wl,--rpath={prefix}/lib -Wl,--dynamic-linker={prefix}/lib/ld-{glibc}.so \
             -Wl,-rpath,{dir} --prefix={dir}/build",
            prefix = GLIBC_PREFIX,
            glibc = &rctx.versions.glibc,
            dir = dir.display()
        );
        let make_cmd = format!("make -s -j {}", cores);
        let install_cmd = format!("make -s -j {} install", cores);

        info!(
            "openssl: Compiling with glibc {}, {} Make threads and {:?} CFLAGS",
            &rctx.versions.glibc, cores, &cflags
        );
        rctx.record_cmd(&format!("Build: CFLAGS = {}", &cflags));
        rctx.record_cmd(&format!("Build: {}", &config_cmd));
        rctx.record_cmd(&format!("Build: {}", &make_cmd));
        rctx.record_cmd(&format!("Build: {}", &install_cmd));

        fs::create_dir_all(dir.join("build"))?;
        let env = [env_set("CFLAGS", &cflags)];
        rctx.set_status("Configuring");
        shell_output(&config_cmd, Some(&dir), &env)?;
        rctx.set_status("Compiling");
        let output = shell_output_lenient(&make_cmd, Some(&dir), &env)?;
        debug!("openssl: Compilation output:\n{}", output.trim_end());
        rctx.set_status("Installing");
        shell_output_lenient(&install_cmd, Some(&dir), &[])?;

        if !bin.exists() {
            bail!(BenchError::MissingFile(bin));
        }
        Ok(())
    }

    fn run(&mut self, rctx: &mut RunCtx) -> Result<serde_json::Value> {
        let bin = Self::bin_path(rctx);
        if !bin.exists() {
            return Err(BenchError::MissingFile(bin)).context("Could not find OpenSSL binaries");
        }
        let out_dir = rctx.job_dir("openssl")?;

        let threads = rctx.nr_threads().max(2);
        let siblings = read_one_line(SIBLINGS_PATH).unwrap_or_default();
        let ids = taskset_ids(threads, &siblings);
        let multi = multi_num(threads, &ids);
        let env = [env_append(
            "LD_LIBRARY_PATH",
            &Self::openssl_dir(rctx).to_string_lossy(),
        )];
        info!(
            "openssl: Running on CPUs {} with {} workers",
            &ids, multi
        );

        let mut results = serde_json::Map::new();
        for (test, bits) in TESTS.iter() {
            let encrypt_cmd = format!(
                "taskset -c {} {} speed -multi {} -evp {}",
                &ids,
                bin.display(),
                multi,
                test
            );
            let decrypt_cmd = format!("{} -decrypt", &encrypt_cmd);
            rctx.record_cmd(&format!("Run: {}", &encrypt_cmd));
            rctx.record_cmd(&format!("Run: {}", &decrypt_cmd));

            let mut result = serde_json::Map::new();
            result.insert("unit".into(), json!("B/s"));
            result.insert("score_size".into(), json!(SCORE_SIZE));
            result.insert("score_size_unit".into(), json!("B"));
            result.insert("test_bit_size".into(), json!(bits));
            result.insert("test".into(), json!("AES-GCM"));

            let mut encrypts = vec![];
            let mut decrypts = vec![];
            for run in 1..=self.runs {
                rctx.set_status(&format!("{} run {}/{}", test, run, self.runs));
                let enc = Self::measure(
                    rctx,
                    &encrypt_cmd,
                    &env,
                    &out_dir.join(format!("openssl_{}_encrypt_run{}.txt", test, run)),
                )?;
                let dec = Self::measure(
                    rctx,
                    &decrypt_cmd,
                    &env,
                    &out_dir.join(format!("openssl_{}_decrypt_run{}.txt", test, run)),
                )?;
                debug!("openssl: {} run{} encrypt={} decrypt={}", test, run, enc, dec);
                result.insert(
                    format!("run{}", run),
                    json!({"encrypt": enc, "decrypt": dec}),
                );
                encrypts.push(enc);
                decrypts.push(dec);
            }
            insert_field_summaries(
                &mut result,
                &[("encrypt", encrypts), ("decrypt", decrypts)],
            );
            results.insert(test.to_string(), serde_json::Value::Object(result));
        }

        info!("openssl: {}", serde_json::Value::Object(results.clone()));
        Ok(serde_json::Value::Object(results))
    }

    fn format<'a>(
        &self,
        out: &mut Box<dyn Write + 'a>,
        results: &serde_json::Value,
        full: bool,
    ) -> Result<()> {
        let tests = results
            .as_object()
            .ok_or_else(|| anyhow!("result is not an object"))?;
        let throughput = |result: &serde_json::Value, v: &serde_json::Value| -> Option<String> {
            v.as_f64()
                .map(|v| pretty_byte_per_sec(v, unit_of(result)))
        };

        if full {
            for result in tests.values() {
                let bits = &result["test_bit_size"];
                for (field, name) in &[("encrypt", "Encryption"), ("decrypt", "Decryption")] {
                    for key in run_keys(result).iter() {
                        if let Some(val) = throughput(result, &result[key][*field]) {
                            let run = key.trim_start_matches("run");
                            write!(
                                out,
                                "{}",
                                row(
                                    &format!("{} Throughput ({}-bit): Run {}", name, bits, run),
                                    &val
                                )
                            )?;
                        }
                    }
                    write!(out, "{}", separator())?;
                }
            }
        }

        for result in tests.values() {
            let bits = &result["test_bit_size"];
            for (field, name) in &[("encrypt", "Encryption"), ("decrypt", "Decryption")] {
                if let Some(val) = throughput(result, &result["median"][*field]) {
                    let title = match full {
                        true => format!("{} Throughput ({}-bit): Median", name, bits),
                        false => format!("{} Throughput ({}-bit)", name, bits),
                    };
                    write!(out, "{}", row(&title, &val))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taskset_ids() {
        assert_eq!(taskset_ids(8, "1\n"), "1-7");
        assert_eq!(taskset_ids(8, ""), "1-7");
        assert_eq!(taskset_ids(80, "1,41\n"), "1-39,41-79");
        assert_eq!(multi_num(8, "1-7"), 7);
        assert_eq!(multi_num(80, "1-39,41-79"), 78);
    }

    #[test]
    fn test_parse_speed() {
        let output = "Forked child 0
Forked child 1
Got: +H:16:64:256:1024:8192 from 0
evp              1234.56k     5678.90k    12345.67k    23456.78k    34567.89k    45678.90k
aes-128-gcm     111.11k      222.22k      333.33k      444.44k      555.55k      4567890.12k
";
        assert!((parse_speed(output).unwrap() - 4567890120.0).abs() < 1e-3);
        assert!(parse_speed("").is_err());
        assert!(parse_speed("aes-128-gcm 1k 2k\n").is_err());
    }

    #[test]
    fn test_format() {
        let job = OpenSslJob { runs: 1 };
        let result = json!({
            "aes-128-gcm": {
                "unit": "B/s", "test_bit_size": 128,
                "run1": {"encrypt": 5e9, "decrypt": 6e9},
                "median": {"encrypt": 5e9, "decrypt": 6e9},
            },
            "aes-256-gcm": {
                "unit": "B/s", "test_bit_size": 256,
                "run1": {"encrypt": 4e9, "decrypt": 4.5e9},
                "median": {"encrypt": 4e9, "decrypt": 4.5e9},
            },
        });

        let mut buf = String::new();
        {
            let mut out: Box<dyn Write> = Box::new(&mut buf);
            job.format(&mut out, &result, false).unwrap();
        }
        let lines: Vec<&str> = buf.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Encryption Throughput (128-bit) "));
        assert!(lines[0].ends_with(" 4.66 GB/s"));
        assert!(lines[3].starts_with("Decryption Throughput (256-bit) "));

        let mut buf = String::new();
        {
            let mut out: Box<dyn Write> = Box::new(&mut buf);
            job.format(&mut out, &result, true).unwrap();
        }
        assert!(buf.contains("Encryption Throughput (128-bit): Run 1"));
        assert!(buf.contains("Decryption Throughput (256-bit): Median"));
        assert_eq!(buf.matches(&"-".repeat(79)).count(), 4);
    }
}
