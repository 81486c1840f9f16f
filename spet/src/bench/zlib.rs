// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

const DFL_RUNS: u32 = 3;
const LEVEL: u32 = 6;
const CORPUS_SIZE: u64 = 2 << 30;
const CORPUS_COMP: f64 = 0.5;

pub struct ZlibBench {}

impl Bench for ZlibBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new("zlib", "zlib")
            .header(
                "Compression and decompression performance for a 2 GB file using zlib. \
                 Lower time is better.",
            )
            .placeholders(&["Compression", "Decompression"])
    }

    fn parse(&self, spec: &JobSpec) -> Result<Box<dyn Job>> {
        let mut job = ZlibJob { runs: DFL_RUNS };
        for (k, v) in spec.props[0].iter() {
            match k.as_str() {
                "runs" => job.runs = parse_runs(v)?,
                k => bail!("unknown property key {:?}", k),
            }
        }
        Ok(Box::new(job))
    }
}

struct ZlibJob {
    runs: u32,
}

impl ZlibJob {
    /// `minigzip64` if it was built, `minigzip` otherwise.
    fn find_bin(rctx: &RunCtx) -> Option<PathBuf> {
        ["minigzip64", "minigzip"]
            .iter()
            .map(|name| rctx.src("zlib").join(name))
            .find(|path| path.exists())
    }

    fn corpus_path(rctx: &RunCtx) -> PathBuf {
        rctx.src("corpus/corpus.txt")
    }
}

impl Job for ZlibJob {
    fn setup(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let ver = rctx.versions.zlib.clone();
        let archive = format!("zlib-{}.tar.gz", &ver);
        let dir = Source::new(
            "zlib",
            &format!("https://zlib.net/{}", &archive),
            &archive,
            &format!("zlib-{}", &ver),
            "zlib",
        )
        .prepare(rctx)?;

        if Self::find_bin(rctx).is_none() {
            let cflags = rctx.cflags();
            let cmd = format!("./configure && make -j {}", rctx.nr_cores());
            info!("zlib: Compiling with {:?} CFLAGS", &cflags);
            rctx.record_cmd(&format!("Build: CFLAGS = {}", &cflags));
            rctx.record_cmd(&format!("Build: {}", &cmd));
            rctx.set_status("Compiling");
            shell_output(&cmd, Some(&dir), &[env_set("CFLAGS", &cflags)])?;
            if Self::find_bin(rctx).is_none() {
                bail!(BenchError::MissingFile(dir.join("minigzip64")));
            }
        }

        let corpus = Self::corpus_path(rctx);
        if !corpus.exists() {
            rctx.set_status("Generating the corpus");
            generate_corpus(&corpus, CORPUS_SIZE, CORPUS_COMP)?;
        }
        Ok(())
    }

    fn run(&mut self, rctx: &mut RunCtx) -> Result<serde_json::Value> {
        let bin = match Self::find_bin(rctx) {
            Some(bin) => bin,
            None => {
                return Err(BenchError::MissingFile(rctx.src("zlib/minigzip64")))
                    .context("Cannot run zlib")
            }
        };
        let corpus = Self::corpus_path(rctx);
        if !corpus.exists() {
            return Err(BenchError::MissingFile(corpus)).context("Cannot run zlib");
        }
        let corpus_dir = rctx.src("corpus");
        let archive = corpus_dir.join("corpus.txt.zlib");
        let out_dir = rctx.job_dir("zlib")?;

        let (bin, corpus_s, archive_s) = (
            bin.display().to_string(),
            corpus.display().to_string(),
            archive.display().to_string(),
        );
        let compress_warmup = format!("{} -1 < {} > /dev/null", &bin, &corpus_s);
        let compress_cmd = format!("{} -{} < {} > {}", &bin, LEVEL, &corpus_s, &archive_s);
        let decompress_cmd = format!("{} -d < {} > /dev/null", &bin, &archive_s);
        rctx.record_cmd(&format!("Run - Warmup: {}", &compress_warmup));
        rctx.record_cmd(&format!("Run: {}", &compress_cmd));
        rctx.record_cmd(&format!("Run - Warmup: {}", &decompress_cmd));
        rctx.record_cmd(&format!("Run: {}", &decompress_cmd));

        let mut result = serde_json::Map::new();
        result.insert("unit".into(), json!("s"));
        let mut compress_times = vec![];
        let mut decompress_times = vec![];
        for run in 1..=self.runs {
            rctx.prerun()?;
            rctx.set_status(&format!("Compressing run {}/{}", run, self.runs));
            shell_output(&compress_warmup, Some(&corpus_dir), &[])?;
            let compress = shell_timed(&compress_cmd, Some(&corpus_dir), &[])?;

            rctx.prerun()?;
            rctx.set_status(&format!("Decompressing run {}/{}", run, self.runs));
            shell_output(&decompress_cmd, Some(&corpus_dir), &[])?;
            let decompress = shell_timed(&decompress_cmd, Some(&corpus_dir), &[])?;

            write_file(
                out_dir.join(format!("zlib_run{}.txt", run)),
                &format!(
                    "Compress Time (Level {}):  {}\nDecompress Time:          {}\n",
                    LEVEL, compress, decompress
                ),
                false,
            )?;
            debug!(
                "zlib: Run {} compress={} decompress={}",
                run, compress, decompress
            );
            result.insert(
                format!("run{}", run),
                json!({"compress": compress, "decompress": decompress}),
            );
            compress_times.push(compress);
            decompress_times.push(decompress);
        }
        if let Err(e) = fs::remove_file(&archive) {
            warn!("zlib: Failed to remove {:?} ({})", &archive, &e);
        }

        insert_field_summaries(
            &mut result,
            &[("compress", compress_times), ("decompress", decompress_times)],
        );
        info!("zlib: {}", serde_json::Value::Object(result.clone()));
        Ok(serde_json::Value::Object(result))
    }

    fn format<'a>(
        &self,
        out: &mut Box<dyn Write + 'a>,
        result: &serde_json::Value,
        full: bool,
    ) -> Result<()> {
        let unit = unit_of(result);
        let fields = [("compress", "Compression"), ("decompress", "Decompression")];
        if full {
            for (field, name) in fields.iter() {
                for key in run_keys(result).iter() {
                    if let Some(val) = result[key][*field].as_f64() {
                        let title = format!("{}: Run {}", name, key.trim_start_matches("run"));
                        write!(out, "{}", row_f(&title, val, unit))?;
                    }
                }
                write!(out, "{}", separator())?;
            }
        }
        for (field, name) in fields.iter() {
            if let Some(val) = result["median"][*field].as_f64() {
                let title = match full {
                    true => format!("{}: Median", name),
                    false => name.to_string(),
                };
                write!(out, "{}", row_f(&title, val, unit))?;
            }
        }
        Ok(())
    }
}
