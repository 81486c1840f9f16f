// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

const MLC_URL_HINT: &str = "https://software.intel.com/en-us/articles/intelr-memory-latency-checker";

pub struct MlcBench {}

impl Bench for MlcBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new("mlc", "MLC")
            .header(
                "Processor node-to-node memory latencies using Intel(R) Memory Latency \
                 Checker. Lower latency is better.",
            )
            .commands_title("Intel(R) Memory Latency Checker")
            .placeholders(&["Node Latency"])
    }

    fn parse(&self, spec: &JobSpec) -> Result<Box<dyn Job>> {
        for (k, _v) in spec.props[0].iter() {
            bail!("unknown property key {:?}", k);
        }
        Ok(Box::new(MlcJob {}))
    }
}

struct MlcJob {}

/// Latencies from node 0 to every node in an `mlc --latency_matrix`
/// report.
fn parse_latencies(output: &str) -> Result<Vec<f64>> {
    lazy_static::lazy_static! {
        static ref NODE0_RE: regex::Regex = regex::Regex::new(r"^\s*0").unwrap();
    }
    let line = match output.lines().find(|line| NODE0_RE.is_match(line)) {
        Some(line) => line,
        None => bail!(BenchError::NoResult("node 0 latencies".into())),
    };
    line.split_whitespace()
        .skip(1)
        .map(|tok| {
            tok.parse::<f64>()
                .with_context(|| format!("Parsing latency {:?}", tok))
        })
        .collect()
}

impl MlcJob {
    fn source(rctx: &RunCtx) -> Source {
        let archive = format!("mlc_v{}.tgz", &rctx.versions.mlc);
        Source::manual(
            "MLC",
            &archive,
            "mlc",
            "mlc",
            &format!(
                "Unable to find an URL for MLC. Please visit {} to download MLC and place \
                 the archive in the {} directory.",
                MLC_URL_HINT,
                rctx.src_dir.display()
            ),
        )
    }

    fn bin_path(rctx: &RunCtx) -> PathBuf {
        rctx.src("mlc/Linux/mlc_avx512")
    }
}

impl Job for MlcJob {
    fn setup(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let src = Self::source(rctx);
        src.fetch(rctx)?;

        // The archive has no top-level directory.
        let dir = src.dir_path(rctx);
        if !dir.exists() {
            info!("mlc: Extracting {:?}", &src.archive);
            rctx.set_status("Extracting MLC");
            extract_tar(src.archive_path(rctx), &dir)?;
        }
        Ok(())
    }

    fn run(&mut self, rctx: &mut RunCtx) -> Result<serde_json::Value> {
        let bin = Self::bin_path(rctx);
        if !bin.exists() {
            return Err(BenchError::MissingFile(bin)).context("Cannot run MLC");
        }
        let out_dir = rctx.job_dir("mlc")?;

        let cmd = format!("modprobe msr; {} --latency_matrix", bin.display());
        rctx.record_cmd(&format!("Run: {}", &cmd));
        rctx.prerun()?;
        rctx.set_status("Measuring the latency matrix");
        let output = shell_output(&cmd, Some(&rctx.src("mlc")), &[])?;
        write_file(out_dir.join("mlc_output.txt"), &output, false)?;

        let latencies = parse_latencies(&output)?;
        info!("mlc: Node 0 latencies {:?}", &latencies);
        Ok(json!({
            "unit": "ns",
            "latencies": latencies,
        }))
    }

    fn format<'a>(
        &self,
        out: &mut Box<dyn Write + 'a>,
        result: &serde_json::Value,
        _full: bool,
    ) -> Result<()> {
        let unit = unit_of(result);
        let latencies = result["latencies"]
            .as_array()
            .ok_or_else(|| anyhow!("latencies missing"))?;
        for (node, lat) in latencies.iter().enumerate() {
            let title = match node {
                0 => "Node0 Latency".to_string(),
                node => format!("Node0-Node{} Latency", node),
            };
            if let Some(lat) = lat.as_f64() {
                write!(out, "{}", row_f(&title, lat, unit))?;
            }
        }
        Ok(())
    }
}
