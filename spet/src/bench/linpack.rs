// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

const MAKE_INTEL: &str = include_str!("../../provided/Make.intel");
const MAKE_AMD: &str = include_str!("../../provided/Make.amd");
const MAKE_GENERIC: &str = include_str!("../../provided/Make.generic");
const HPL_DAT: &str = include_str!("../../provided/HPL.dat");

const MAX_NR_NS: usize = 20;
const MEM_UTILIZATION: f64 = 0.8;
const TITLE: &str = "Operations Per Second";
pub struct LinpackBench {}

impl Bench for LinpackBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new("linpack", "High-Performance Linpack").placeholders(&[TITLE])
    }

    fn parse(&self, spec: &JobSpec) -> Result<Box<dyn Job>> {
        for (k, _v) in spec.props[0].iter() {
            bail!("unknown property key {:?}", k);
        }
        Ok(Box::new(LinpackJob {
            mathlib: MathLib::OpenBlas,
        }))
    }
}

struct LinpackJob {
    mathlib: MathLib,
}

fn nb_size(threads: u32) -> u64 {
    match threads {
        t if t >= 64 => 384,
        t if t >= 32 => 256,
        _ => 192,
    }
}

/// Largest problem size which fits in `MEM_UTILIZATION` of memory,
/// rounded down to a multiple of `nb`.
fn problem_size(mem_gb: u64, nb: u64) -> u64 {
    let mem = mem_gb.max(1) as f64 * (1u64 << 30) as f64;
    let n = (MEM_UTILIZATION * mem / 8.0).sqrt() as u64;
    n / nb * nb
}

/// `n` and progressively smaller sizes, ascending. HPL takes at most 20.
fn scale_sizes(n: u64, nb: u64) -> Vec<u64> {
    let mut sizes = vec![n];
    let mut cur = n;
    while cur > 1000 {
        cur = (cur as f64 / 1.25) as u64 / nb * nb;
        sizes.push(cur);
    }
    sizes.sort();
    let skip = sizes.len().saturating_sub(MAX_NR_NS);
    sizes.split_off(skip)
}

/// The P x Q process grid from the middle divisors of `nr_procs`.
fn process_grid(nr_procs: u32) -> (u32, u32) {
    let divs: Vec<u32> = (1..=nr_procs.max(1))
        .filter(|i| nr_procs.max(1) % i == 0)
        .collect();
    let mid = divs.len() / 2;
    if divs.len() % 2 == 0 {
        (divs[mid - 1], divs[divs.len() - mid])
    } else {
        (divs[mid], divs[mid])
    }
}

/// Best GFLOPS among the result lines for the `nb`, `p`, `q` configuration.
fn parse_score(output: &str, nb: u64, (p, q): (u32, u32)) -> Result<f64> {
    let pattern = format!(r"\s+{}\s+{}\s+{}\s+", nb, p, q);
    let mut score: Option<f64> = None;
    for line in grep_text(output, &pattern)?.iter() {
        if let Some(Ok(gflops)) = line.split_whitespace().nth(6).map(|t| t.parse::<f64>()) {
            score = Some(score.map_or(gflops, |s| s.max(gflops)));
        }
    }
    score.ok_or_else(|| BenchError::NoResult("HPL score".into()).into())
}

impl LinpackJob {
    fn hpl_dir(rctx: &RunCtx) -> PathBuf {
        rctx.src("hpl")
    }

    fn arch(rctx: &RunCtx) -> String {
        rctx.sysinfo
            .arch_type
            .clone()
            .unwrap_or_else(|| "x86_64".into())
    }

    fn bin_dir(rctx: &RunCtx) -> PathBuf {
        Self::hpl_dir(rctx).join("bin").join(Self::arch(rctx))
    }

    fn makefile(rctx: &RunCtx) -> PathBuf {
        Self::hpl_dir(rctx).join(format!("Make.{}", Self::arch(rctx)))
    }

    fn edit_makefile(&self, rctx: &RunCtx) -> Result<()> {
        let makefile = Self::makefile(rctx);
        if makefile.exists() {
            return Ok(());
        }
        let (template, ladir) = match self.mathlib {
            MathLib::Mkl => (MAKE_INTEL, PathBuf::from(MKL_INSTALL_DIR)),
            MathLib::Blis => (MAKE_AMD, rctx.src("blis")),
            MathLib::OpenBlas => (MAKE_GENERIC, rctx.src("openblas")),
        };
        let arch = Self::arch(rctx);
        let cc = format!(
            "{} {}{} -lgomp -fopenmp",
            rctx.mpi_bin("mpicc").display(),
            rctx.sysinfo.cflags(),
            rctx.avx_flags()
        );
        info!(
            "linpack: Writing {:?} for {} with {:?}",
            &makefile,
            self.mathlib.name(),
            &cc
        );

        write_file(&makefile, template, false)?;
        replace_line(&makefile, "ARCH         = x86_64", &format!("ARCH         = {}", arch))?;
        replace_line(
            &makefile,
            "TOPdir       =",
            &format!("TOPdir       = {}", Self::hpl_dir(rctx).display()),
        )?;
        replace_line(
            &makefile,
            "LAdir        =",
            &format!("LAdir        = {}", ladir.display()),
        )?;
        replace_line(&makefile, "CC           =", &format!("CC           = {}", &cc))?;
        Ok(())
    }

    fn write_datfile(rctx: &RunCtx) -> Result<PathBuf> {
        let nb = nb_size(rctx.nr_threads());
        let sizes = scale_sizes(problem_size(rctx.sysinfo.memory.unwrap_or(1), nb), nb);
        let (p, q) = process_grid(rctx.nr_cores());
        let ns: Vec<String> = sizes.iter().map(|n| n.to_string()).collect();

        let dat = Self::bin_dir(rctx).join("HPL.dat");
        write_file(&dat, HPL_DAT, false)?;
        for (pat, repl) in &[
            (
                r"\d+\s+# of problems sizes \(N\)",
                format!("{}      # of problems sizes (N)", sizes.len()),
            ),
            (r"(\d+\s)+\s*Ns", format!("{}   Ns", ns.join(" "))),
            (r"(\d+\s)+\s*NBs", format!("{}    NBs", nb)),
            (
                r"\d+\s+# of process grids \(P x Q\)",
                "1  # of process grids (P x Q)".to_string(),
            ),
            (r"([0-9]+\s+)+Ps", format!("{}  Ps", p)),
            (r"([0-9]+\s+)+Qs", format!("{}  Qs", q)),
        ] {
            replace_line(&dat, pat, repl)?;
        }
        debug!("linpack: N={:?} NB={} P={} Q={}", &sizes, nb, p, q);
        Ok(dat)
    }
}

impl Job for LinpackJob {
    fn setup(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let ver = rctx.versions.linpack.clone();
        let archive = format!("hpl-{}.tar.gz", &ver);
        let dir = Source::new(
            "HPL",
            &format!("http://www.netlib.org/benchmark/hpl/{}", &archive),
            &archive,
            &format!("hpl-{}", &ver),
            "hpl",
        )
        .prepare(rctx)?;

        self.mathlib = MathLib::available(rctx);
        self.edit_makefile(rctx)?;

        let arch = Self::arch(rctx);
        let bin = Self::bin_dir(rctx).join("xhpl");
        if !bin.exists() {
            let mpicc = rctx.mpi_bin("mpicc");
            if !mpicc.exists() {
                return Err(BenchError::MissingFile(mpicc)).context("Cannot compile HPL");
            }
            let cflags = rctx.cflags() + rctx.avx_flags();
            let threads = rctx.nr_threads().to_string();
            let cores = rctx.nr_cores();
            // The first build attempt sometimes fails spuriously.
            let build_cmd = format!(
                "make -s -j {0} all arch={1} || make -s -j {0} all arch={1}",
                cores, &arch
            );
            let install_cmd = format!("make -s -j {} install arch={}", cores, &arch);
            rctx.record_cmd(&format!("Build: CFLAGS = {}", &cflags));
            rctx.record_cmd(&format!("Build: OMP_NUM_THREADS = {}", &threads));
            rctx.record_cmd(&format!("Build: {}", &build_cmd));
            rctx.record_cmd(&format!("Build: {}", &install_cmd));

            let mut env = rctx.mpi_env();
            env.push(env_set("CFLAGS", &cflags));
            env.push(env_set("OMP_NUM_THREADS", &threads));
            info!(
                "linpack: Compiling for {:?} with {} OMP threads and {:?} CFLAGS",
                &arch, &threads, &cflags
            );
            rctx.set_status("Compiling");
            shell_output(&build_cmd, Some(&dir), &env)?;
            shell_output_lenient(&install_cmd, Some(&dir), &env)?;
            if !bin.exists() {
                bail!(BenchError::MissingFile(bin));
            }
        }

        Self::write_datfile(rctx)?;
        Ok(())
    }

    fn run(&mut self, rctx: &mut RunCtx) -> Result<serde_json::Value> {
        let bin_dir = Self::bin_dir(rctx);
        let bin = bin_dir.join("xhpl");
        if !bin.exists() {
            return Err(BenchError::MissingFile(bin)).context("Could not find HPL binaries");
        }
        let mpirun = rctx.mpi_bin("mpirun");
        if !mpirun.exists() {
            return Err(BenchError::MissingFile(mpirun)).context("Could not find OpenMPI");
        }
        let out_dir = rctx.job_dir("linpack")?;

        let (threads, cores) = (rctx.nr_threads(), rctx.nr_cores());
        let nb = nb_size(threads);
        let grid = process_grid(cores);
        let mut cmd = format!("{} -n {} --allow-run-as-root", mpirun.display(), cores);
        if threads != cores {
            cmd += " --mca mpi_paffinity_alone 1";
        }
        cmd += " ./xhpl";

        for src in &[Self::makefile(rctx), bin_dir.join("HPL.dat")] {
            if let Some(name) = src.file_name() {
                fs::copy(src, out_dir.join(name))
                    .with_context(|| format!("Copying {:?}", src))?;
            }
        }

        rctx.record_cmd(&format!("Run: {}", &cmd));
        rctx.prerun()?;
        rctx.set_status(&format!("Solving with {}", self.mathlib.name()));
        let output = shell_output(&cmd, Some(&bin_dir), &rctx.mpi_env())?;
        write_file(out_dir.join("linpack_output.txt"), &output, false)?;

        let score = parse_score(&output, nb, grid)?;
        info!("linpack: {} GFLOPS using {}", score, self.mathlib.name());
        Ok(json!({
            "unit": "GFLOPS",
            "mathlib": self.mathlib.as_str(),
            "score": score,
        }))
    }

    fn header(&self, _desc: &BenchDesc, result: &serde_json::Value) -> String {
        let mathlib = match result["mathlib"].as_str() {
            Some("mkl") => " Intel(R) MKL,",
            Some("blis") => " AMD BLIS*,",
            Some("openblas") => " OpenBLAS,",
            _ => "",
        };
        format!(
            "Floating-point and math computing performance using High-Performance \
             Linpack,{} and OpenMPI. Higher FLOPS is better.",
            mathlib
        )
    }

    fn notes(&self, result: &serde_json::Value) -> Vec<String> {
        match result["mathlib"].as_str() {
            Some("blis") => BLIS_COPYRIGHTS.iter().map(|s| s.to_string()).collect(),
            _ => vec![],
        }
    }

    fn format<'a>(
        &self,
        out: &mut Box<dyn Write + 'a>,
        result: &serde_json::Value,
        _full: bool,
    ) -> Result<()> {
        let score = result["score"]
            .as_f64()
            .ok_or_else(|| anyhow!("score missing"))?;
        write!(out, "{}", row(TITLE, &pretty_flops(score, unit_of(result))))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::test_rctx;

    #[test]
    fn test_sizing() {
        assert_eq!(nb_size(80), 384);
        assert_eq!(nb_size(32), 256);
        assert_eq!(nb_size(8), 192);

        // sqrt(0.8 * 2^30 / 8) = 10362.2
        assert_eq!(problem_size(1, 192), 10368 - 192);
        assert_eq!(problem_size(0, 192), problem_size(1, 192));

        let sizes = scale_sizes(137706, 389);
        assert_eq!(sizes.len(), 20);
        assert_eq!(*sizes.last().unwrap(), 137706);
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(scale_sizes(960, 192), vec![960]);
        assert_eq!(scale_sizes(1536, 192), vec![768, 1152, 1536]);
    }

    #[test]
    fn test_process_grid() {
        assert_eq!(process_grid(112), (8, 14));
        assert_eq!(process_grid(40), (5, 8));
        assert_eq!(process_grid(16), (4, 4));
        assert_eq!(process_grid(7), (1, 7));
        assert_eq!(process_grid(1), (1, 1));
    }

    #[test]
    fn test_parse_score() {
        let output = "================================================================================
T/V                N    NB     P     Q               Time                 Gflops
--------------------------------------------------------------------------------
WR11C2R4       27648   384     5     8              21.43             6.6003e+02
WR11C2R4       34560   384     5     8              36.87             7.4630e+02
WR11C2R4       10368   192     5     8               4.11             1.8000e+02
";
        let score = parse_score(output, 384, (5, 8)).unwrap();
        assert!((score - 746.30).abs() < 1e-6);
        assert!(parse_score(output, 256, (5, 8)).is_err());
    }

    #[test]
    fn test_edit_files() {
        let root = tempfile::tempdir().unwrap();
        let rctx = test_rctx(root.path());
        let job = LinpackJob {
            mathlib: MathLib::OpenBlas,
        };
        job.edit_makefile(&rctx).unwrap();
        let make = read_file(LinpackJob::makefile(&rctx)).unwrap();
        let hpl_dir = rctx.src("hpl").display().to_string();
        assert!(make.contains(&format!("TOPdir       = {}\n", &hpl_dir)));
        assert!(make.contains(&format!("LAdir        = {}/openblas\n", rctx.src_dir.display())));
        assert!(make.contains("-march=native -mtune=native -lgomp -fopenmp\n"));
        assert!(make.contains("LINKER       = $(CC)\n"));

        let dat = read_file(LinpackJob::write_datfile(&rctx).unwrap()).unwrap();
        let lines: Vec<&str> = dat.lines().collect();
        assert_eq!(lines[7], "384    NBs");
        assert_eq!(lines[9], "1  # of process grids (P x Q)");
        assert_eq!(lines[10], "5  Ps");
        assert_eq!(lines[11], "8  Qs");
        assert!(lines[5].ends_with("   Ns"));
        assert!(lines[12].starts_with("16.0"));
    }

    #[test]
    fn test_header() {
        let job = LinpackJob {
            mathlib: MathLib::Blis,
        };
        let desc = LinpackBench {}.desc();
        let result = json!({"unit": "GFLOPS", "mathlib": "blis", "score": 746.3});
        assert!(job.header(&desc, &result).contains("Linpack, AMD BLIS*, and OpenMPI."));
        assert_eq!(job.notes(&result).len(), 2);
        assert!(job.notes(&json!({"mathlib": "mkl"})).is_empty());
        assert!(job
            .header(&desc, &json!({"error": "boom"}))
            .contains("Linpack, and OpenMPI."));
    }
}
