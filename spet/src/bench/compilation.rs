// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

const DFL_RUNS: u32 = 3;
const TITLE: &str = "Linux Kernel Compilation";

pub struct CompilationBench {}

impl Bench for CompilationBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new("compilation", "Timed Kernel Compilation")
            .header(
                "Software development and compute compilation performance. \
                 Lower time is better.",
            )
            .placeholders(&[TITLE])
    }

    fn parse(&self, spec: &JobSpec) -> Result<Box<dyn Job>> {
        let mut job = CompilationJob { runs: DFL_RUNS };
        for (k, v) in spec.props[0].iter() {
            match k.as_str() {
                "runs" => job.runs = parse_runs(v)?,
                k => bail!("unknown property key {:?}", k),
            }
        }
        Ok(Box::new(job))
    }
}

struct CompilationJob {
    runs: u32,
}

impl Job for CompilationJob {
    fn setup(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let ver = rctx.versions.linux.clone();
        let archive = format!("linux-{}.tar.gz", &ver);
        let dir = Source::new(
            "the Linux kernel",
            &format!(
                "http://www.kernel.org/pub/linux/kernel/v{}.x/{}",
                ver_prefix(&ver, 1),
                &archive
            ),
            &archive,
            &format!("linux-{}", &ver),
            "linux",
        )
        .prepare(rctx)?;

        if dir.join(".config").exists() {
            return Ok(());
        }

        let cflags = rctx.cflags();
        let cmd = format!("make -s -j {0} defconfig && make -s -j {0} clean", rctx.nr_cores());
        info!("compilation: Configuring with {:?} CFLAGS", &cflags);
        rctx.record_cmd(&format!("Setup: CFLAGS = {}", &cflags));
        rctx.record_cmd(&format!("Setup: {}", &cmd));
        rctx.set_status("Configuring");
        let output = shell_output(&cmd, Some(&dir), &[env_set("CFLAGS", &cflags)])?;
        debug!("compilation: Setup output:\n{}", output.trim_end());

        let config = dir.join(".config");
        if !config.exists() {
            bail!(BenchError::MissingFile(config));
        }
        Ok(())
    }

    fn run(&mut self, rctx: &mut RunCtx) -> Result<serde_json::Value> {
        let dir = rctx.src("linux");
        let config = dir.join(".config");
        if !config.exists() {
            return Err(BenchError::MissingFile(config))
                .context("Cannot run timed Linux kernel compilation");
        }
        let out_dir = rctx.job_dir("compilation")?;

        let cflags = rctx.cflags();
        let env = [env_set("CFLAGS", &cflags)];
        let cores = rctx.nr_cores();
        let clean_cmd = format!("make -s -j {} clean", cores);
        let build_cmd = format!("make -s -j {}", cores);
        rctx.record_cmd(&format!("Run: CFLAGS = {}", &cflags));
        rctx.record_cmd(&format!("Prerun: {}", &clean_cmd));
        rctx.record_cmd(&format!("Run: {}", &build_cmd));
        info!("compilation: Compiling with {} Make threads", cores);

        let mut result = serde_json::Map::new();
        result.insert("unit".into(), json!("s"));
        let mut times = vec![];
        for run in 1..=self.runs {
            rctx.set_status(&format!("Cleaning for run {}/{}", run, self.runs));
            shell_output(&clean_cmd, Some(&dir), &env)?;
            rctx.prerun()?;

            rctx.set_status(&format!("Compiling run {}/{}", run, self.runs));
            let secs = shell_timed(&build_cmd, Some(&dir), &env)
                .context("Linux Kernel failed to compile")?;
            if !dir.join("vmlinux").exists() {
                bail!("Linux Kernel failed to compile.");
            }
            write_file(
                out_dir.join(format!("compilation_run{}.txt", run)),
                &format!("{}\n{} Speed:  {}\n", &build_cmd, TITLE, secs),
                false,
            )?;
            info!("compilation: Run {} took {}", run, format_duration(secs));
            result.insert(format!("run{}", run), json!(secs));
            times.push(secs);
        }
        insert_summary(&mut result, &times);
        Ok(serde_json::Value::Object(result))
    }

    fn format<'a>(
        &self,
        out: &mut Box<dyn Write + 'a>,
        result: &serde_json::Value,
        full: bool,
    ) -> Result<()> {
        format_runs(out, result, TITLE, full, &plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let job = CompilationJob { runs: 3 };
        let result = json!({
            "unit": "s", "run1": 61.5, "run2": 60.25, "run3": 63.0,
            "average": 61.58, "median": 61.5, "variance": 1.9, "range": 2.75,
        });

        let mut buf = String::new();
        {
            let mut out: Box<dyn Write> = Box::new(&mut buf);
            job.format(&mut out, &result, true).unwrap();
        }
        let lines: Vec<&str> = buf.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Linux Kernel Compilation: Run 1 "));
        assert!(lines[1].ends_with(" 60.25 s"));
        assert_eq!(lines[3], "-".repeat(79));
        assert!(lines[4].starts_with("Linux Kernel Compilation: Median "));
        assert!(lines.iter().all(|l| l.len() == 79));

        let mut buf = String::new();
        {
            let mut out: Box<dyn Write> = Box::new(&mut buf);
            job.format(&mut out, &result, false).unwrap();
        }
        assert!(buf.starts_with("Linux Kernel Compilation "));
        assert!(buf.ends_with(" 61.50 s\n"));
    }

    #[test]
    fn test_parse() {
        let bench = CompilationBench {};
        let mut spec = JobSpec::dfl("compilation");
        spec.props[0].insert("runs".into(), "5".into());
        assert!(bench.parse(&spec).is_ok());
        spec.props[0].insert("jobs".into(), "5".into());
        assert!(bench.parse(&spec).is_err());
    }
}
