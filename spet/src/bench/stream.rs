// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

const DFL_RUNS: u32 = 3;
const NTIMES: u32 = 1000;
const MIN_ARRAY_SIZE: u64 = 10_000_000;
const MEDIUM_MODEL_SIZE: u64 = 4_000_000_000;
const STREAM_URL: &str = "https://www.cs.virginia.edu/stream/FTP/Code/stream.c";
const TITLE: &str = "Triad Bandwidth";

pub struct StreamBench {}

impl Bench for StreamBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new("stream", "STREAM")
            .header("Memory bandwidth using STREAM and OpenMPI. Higher throughput is better.")
            .placeholders(&[TITLE])
    }

    fn parse(&self, spec: &JobSpec) -> Result<Box<dyn Job>> {
        let mut job = StreamJob { runs: DFL_RUNS };
        for (k, v) in spec.props[0].iter() {
            match k.as_str() {
                "runs" => job.runs = parse_runs(v)?,
                k => bail!("unknown property key {:?}", k),
            }
        }
        Ok(Box::new(job))
    }
}

struct StreamJob {
    runs: u32,
}

/// Four times the combined cache so that the arrays can't be cached, but
/// no less than `MIN_ARRAY_SIZE` elements.
fn array_size(cache: u64, sockets: u32) -> u64 {
    (4 * cache * sockets as u64 / 8).max(MIN_ARRAY_SIZE)
}

fn build_cflags(base: &str, array_size: u64) -> String {
    let mut cflags = format!("{} -fopenmp ", base);
    if array_size > MEDIUM_MODEL_SIZE {
        cflags += " -mcmodel=medium ";
    }
    cflags += " -D_OPENMP ";
    cflags += &format!(" -DSTREAM_ARRAY_SIZE={} ", array_size);
    cflags += &format!(" -DNTIMES={} ", NTIMES);
    cflags
}

/// Triad bandwidth, the second word of the "Triad" line.
fn parse_triad(output: &str) -> Result<f64> {
    let lines = grep_text(output, "Triad")?;
    let tok = lines
        .first()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| BenchError::NoResult("Triad bandwidth".into()))?;
    tok.parse::<f64>()
        .with_context(|| format!("Parsing Triad bandwidth {:?}", tok))
}

impl Job for StreamJob {
    fn setup(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let dir = rctx.src("stream");
        let src = dir.join("stream.c");
        let bin = dir.join("stream");
        if !src.exists() {
            info!("stream: Downloading stream.c");
            rctx.set_status("Downloading STREAM");
            download(STREAM_URL, &src)?;
        }
        if bin.exists() {
            return Ok(());
        }

        let mpicc = rctx.mpi_bin("mpicc");
        if !mpicc.exists() {
            return Err(BenchError::MissingFile(mpicc)).context("Cannot compile STREAM");
        }
        let si = &rctx.sysinfo;
        let size = si.stream_array_size.unwrap_or_else(|| {
            array_size(si.largest_cache().unwrap_or(0), si.nr_sockets())
        });
        let cflags = build_cflags(&rctx.cflags(), size);
        let cmd = format!("{} {} stream.c -o stream", mpicc.display(), &cflags);
        info!("stream: Compiling with {} array size and {:?} CFLAGS", size, &cflags);
        rctx.record_cmd(&format!("Build: {}", &cmd));
        rctx.set_status("Compiling");
        let output = shell_output(&cmd, Some(&dir), &rctx.mpi_env())?;
        debug!("stream: Compilation output:\n{}", output.trim_end());

        if !bin.exists() {
            bail!(BenchError::MissingFile(bin));
        }
        make_executable(&bin)
    }

    fn run(&mut self, rctx: &mut RunCtx) -> Result<serde_json::Value> {
        let dir = rctx.src("stream");
        let bin = dir.join("stream");
        if !bin.exists() {
            return Err(BenchError::MissingFile(bin)).context("Cannot run STREAM");
        }
        let out_dir = rctx.job_dir("stream")?;

        let threads = rctx.nr_threads().to_string();
        let mut env = rctx.mpi_env();
        env.push(env_set("OMP_NUM_THREADS", &threads));
        env.push(env_set("OMP_PROC_BIND", "true"));
        let cmd = "./stream";
        rctx.record_cmd(&format!("Run: OMP_NUM_THREADS = {}", &threads));
        rctx.record_cmd("Run: OMP_PROC_BIND = true");
        rctx.record_cmd(&format!("Run: {}", cmd));
        info!("stream: Running with {} OMP threads", &threads);

        let mut result = serde_json::Map::new();
        result.insert("unit".into(), json!("MB/s"));
        let mut triads = vec![];
        for run in 1..=self.runs {
            rctx.prerun()?;
            rctx.set_status(&format!("Run {}/{}", run, self.runs));
            let output = shell_output(cmd, Some(&dir), &env)?;
            write_file(out_dir.join(format!("stream_run{}.txt", run)), &output, false)?;
            let triad = parse_triad(&output)?;
            debug!("stream: Run {} triad={}", run, triad);
            result.insert(format!("run{}", run), json!(triad));
            triads.push(triad);
        }
        insert_summary(&mut result, &triads);
        info!("stream: {}", serde_json::Value::Object(result.clone()));
        Ok(serde_json::Value::Object(result))
    }

    fn format<'a>(
        &self,
        out: &mut Box<dyn Write + 'a>,
        result: &serde_json::Value,
        full: bool,
    ) -> Result<()> {
        format_runs(out, result, TITLE, full, &pretty_byte_per_sec)
    }
}
