// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

const MAX_SIZE_MB: u32 = 512;
const STRIDE: u32 = 1024;

pub struct LmbenchBench {}

impl Bench for LmbenchBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new("lmbench", "LMbench")
            .header("Cache latencies using LMbench. Lower latency is better.")
            .placeholders(&[
                "L1-Cache Read Latency",
                "L2-Cache Read Latency",
                "L3-Cache Read Latency",
            ])
    }

    fn parse(&self, spec: &JobSpec) -> Result<Box<dyn Job>> {
        for (k, _v) in spec.props[0].iter() {
            bail!("unknown property key {:?}", k);
        }
        Ok(Box::new(LmbenchJob {}))
    }
}

struct LmbenchJob {}

/// Latency of the largest working set in `output` which still fits in
/// `cache_mb`. `lat_mem_rd` prints "SIZE_MB LATENCY_NS" pairs in ascending
/// size order.
fn closest_cache_latency(cache_mb: f64, output: &str) -> Option<f64> {
    let mut latency = None;
    for line in output.lines() {
        if line.contains("stride") {
            continue;
        }
        let toks: Vec<&str> = line.split_whitespace().collect();
        if toks.len() < 2 {
            continue;
        }
        let (size, lat) = match (toks[0].parse::<f64>(), toks[1].parse::<f64>()) {
            (Ok(size), Ok(lat)) => (size, lat),
            _ => continue,
        };
        if size <= cache_mb {
            latency = Some(lat);
        } else {
            break;
        }
    }
    latency
}

impl LmbenchJob {
    fn lmbench_dir(rctx: &RunCtx) -> PathBuf {
        rctx.src("lmbench")
    }

    fn bin_path(rctx: &RunCtx) -> PathBuf {
        let arch = rctx.sysinfo.arch_type.as_deref().unwrap_or("x86_64");
        Self::lmbench_dir(rctx).join(format!("bin/{}-linux-gnu/lat_mem_rd", arch))
    }
}

impl Job for LmbenchJob {
    fn setup(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let ver = rctx.versions.lmbench.clone();
        let archive = format!("lmbench{}.tar.gz", &ver);
        Source::new(
            "LMbench",
            &format!("http://www.bitmover.com/lmbench/{}", &archive),
            &archive,
            &format!("lmbench{}", &ver),
            "lmbench",
        )
        .prepare(rctx)?;

        let bin = Self::bin_path(rctx);
        if bin.exists() {
            return Ok(());
        }

        let dir = Self::lmbench_dir(rctx);
        // The build scripts insist on an SCCS tree.
        touch(dir.join("SCCS/s.ChangeSet"))?;

        let cflags = rctx.cflags();
        let cmd = format!("make -s -j {}", rctx.nr_cores());
        info!("lmbench: Compiling with {:?} CFLAGS", &cflags);
        rctx.record_cmd(&format!("Build: CFLAGS = {}", &cflags));
        rctx.record_cmd(&format!("Build: {}", &cmd));
        rctx.set_status("Compiling");
        shell_output_lenient(&cmd, Some(&dir), &[env_set("CFLAGS", &cflags)])?;

        if !bin.exists() {
            bail!(BenchError::MissingFile(bin));
        }
        Ok(())
    }

    fn run(&mut self, rctx: &mut RunCtx) -> Result<serde_json::Value> {
        let bin = Self::bin_path(rctx);
        if !bin.exists() {
            return Err(BenchError::MissingFile(bin)).context("Could not find LMbench binaries");
        }
        let out_dir = rctx.job_dir("lmbench")?;

        let cpu = if rctx.nr_threads() >= 3 { 2 } else { 0 };
        let cmd = format!(
            "taskset -c {} {} {} {}",
            cpu,
            bin.display(),
            MAX_SIZE_MB,
            STRIDE
        );
        rctx.record_cmd(&format!("Run: {}", &cmd));
        rctx.prerun()?;
        rctx.set_status("Measuring memory read latencies");
        let output = shell_output(&cmd, None, &[])?;
        write_file(out_dir.join("lmbench_output.txt"), &output, false)?;

        let si = &rctx.sysinfo;
        let mut result = serde_json::Map::new();
        result.insert("unit".into(), json!("ns"));
        for (key, cache) in &[
            ("level1", si.l1d_cache),
            ("level2", si.l2_cache),
            ("level3", si.l3_cache),
        ] {
            if let Some(cache) = cache {
                if let Some(lat) = closest_cache_latency(to_mb(*cache), &output) {
                    result.insert(key.to_string(), json!(lat));
                }
            }
        }
        info!("lmbench: {}", serde_json::Value::Object(result.clone()));
        Ok(serde_json::Value::Object(result))
    }

    fn format<'a>(
        &self,
        out: &mut Box<dyn Write + 'a>,
        result: &serde_json::Value,
        _full: bool,
    ) -> Result<()> {
        let unit = unit_of(result);
        for (key, title) in &[
            ("level1", "L1-Cache Read Latency"),
            ("level2", "L2-Cache Read Latency"),
            ("level3", "L3-Cache Read Latency"),
        ] {
            if let Some(lat) = result[*key].as_f64() {
                write!(out, "{}", row_f(title, lat, unit))?;
            }
        }
        Ok(())
    }
}
