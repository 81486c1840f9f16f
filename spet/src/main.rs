// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;

use spet_intf::{set_after_help, Args, JobSpec, Mode, Overrides, ResultFile, FULL_VERSION};
use spet_util::*;

mod bench;
mod detect;
mod job;
mod prereq;
mod progress;
mod report;
mod run;
mod stats;
mod tune;

use job::JobCtx;
use prereq::MathLib;
use run::RunCtx;

const LOCK_FILE: &str = ".SPET.lock";

/// Where a run's files go. Every file shares the run name as its prefix.
struct RunFiles {
    dir: PathBuf,
    name: String,
}

impl RunFiles {
    fn new(results_dir: &Path, nr: u32, processor: &str) -> Self {
        let name = format!("SPET.{:03}.{}", nr, uglify_filename(processor));
        Self {
            dir: results_dir.join(&name),
            name,
        }
    }

    fn path(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", &self.name, suffix))
    }
}

fn bench_list() -> Vec<(String, String)> {
    bench::all_benchs()
        .iter()
        .map(|bench| {
            let desc = bench.desc();
            (desc.kind, desc.title)
        })
        .collect()
}

/// Overrides from `--overrides` with `--sysinfo` on top. A missing
/// overrides file is created as a documented template.
fn load_overrides(args: &Args) -> Result<Overrides> {
    let mut ovr = JsonConfigFile::<Overrides>::load_or_create(args.overrides.as_ref())
        .with_context(|| format!("Loading system overrides {:?}", &args.overrides))?
        .data;
    ovr.merge(&args.sysinfo_ovr);
    Ok(ovr)
}

/// Jobs in run order. Without explicit specs every benchmark runs in the
/// order they're registered. Excluded ones stay in the list as skipped so
/// that they're recorded as such.
fn build_jobs(args: &Args) -> Result<Vec<JobCtx>> {
    let kinds: Vec<String> = bench_list().into_iter().map(|(kind, _)| kind).collect();
    for exclude in args.excludes.iter() {
        if !kinds.contains(exclude) {
            bail!("Unknown benchmark {:?} in --exclude", exclude);
        }
    }

    let specs: Vec<JobSpec> = match args.job_specs.len() {
        0 => kinds.iter().map(|kind| JobSpec::dfl(kind)).collect(),
        _ => args.job_specs.clone(),
    };

    let mut jobs = vec![];
    for spec in specs.iter() {
        let mut jctx = JobCtx::new(spec).with_context(|| format!("{}", spec))?;
        if args.excludes.contains(&spec.kind) {
            jctx.skip();
        }
        jobs.push(jctx);
    }
    Ok(jobs)
}

fn format_result_file(path: &str) -> Result<()> {
    let rf = ResultFile::load(path).with_context(|| format!("Loading {:?}", path))?;
    print!("{}", report::text_report(&rf)?);
    Ok(())
}

/// Write `.results.json`, `.spet.json` and `.results.txt`. The full result
/// file is staged and renamed into place.
fn save_reports(rf: ResultFile, files: &RunFiles) -> Result<()> {
    rf.save_results(files.path("results.json"))?;

    let mut spet_json = JsonReportFile::<ResultFile>::new(Some(files.path("spet.json")));
    spet_json.data = rf;
    spet_json.commit()?;

    write_file(
        files.path("results.txt"),
        &report::text_report(&spet_json.data)?,
        false,
    )
}

fn print_file_locations(files: &[PathBuf]) {
    println!("{}", center("File Locations", report::WIDTH));
    println!("{}", center("==============", report::WIDTH));
    for path in files.iter() {
        println!("{}", path.display());
    }
    println!("\n");
}

fn run_benchs(args: &Args) -> Result<()> {
    if !is_root() {
        bail!(
            "You do not have root access. Please restart SPET once you have \
             the proper access. Exiting now."
        );
    }

    let mut jobs = build_jobs(args)?;
    let ovr = load_overrides(args)?;

    let results_dir = PathBuf::from(&args.results_dir);
    fs::create_dir_all(&results_dir)
        .with_context(|| format!("Creating results directory {:?}", &results_dir))?;
    let nr = next_run_number(results_dir.join(LOCK_FILE))?;
    let processor = ovr
        .processor_name
        .clone()
        .or_else(detect::processor_name)
        .unwrap_or_else(|| "unknown".into());
    let files = RunFiles::new(&results_dir, nr, &processor);
    fs::create_dir_all(&files.dir)
        .with_context(|| format!("Creating run directory {:?}", &files.dir))?;
    set_log_files(files.path("log"), files.path("debug.log"))?;

    info!("Server Performance Evaluation Tool ({})", *FULL_VERSION);

    info!("Installing prerequisites from the system's package manager");
    prereq::pkgmgr::install_packages();

    let sysinfo = detect::system_information(&ovr);
    println!("\n{}", report::system_table(&sysinfo, args.avx512));

    info!("Tuning the system");
    tune::tune_system();

    let mut rctx = RunCtx::new(args, &files.dir, sysinfo.clone());
    info!("Setting up and compiling prerequisites");
    prereq::install_prerequisites(&mut rctx);

    let mut rf = ResultFile {
        version: FULL_VERSION.clone(),
        run_name: files.name.clone(),
        started_at: unix_now(),
        sysinfo,
        avx512: args.avx512,
        mathlib: MathLib::available(&rctx).as_str().into(),
        versions: rctx.versions.clone(),
        ..Default::default()
    };

    info!("Setting up and compiling benchmarks");
    for jctx in jobs.iter_mut() {
        if prog_exiting() {
            bail!("Interrupted while setting up benchmarks");
        }
        jctx.setup(&mut rctx);
    }

    info!("Running benchmarks");
    print!("{}", report::results_title());
    for jctx in jobs.iter_mut() {
        if prog_exiting() {
            warn!("Interrupted, skipping the remaining benchmarks");
            break;
        }
        jctx.run(&mut rctx);
        print!("{}", jctx.format_section(false));
        rf.record(jctx.data.clone());
    }
    rf.ended_at = unix_now();
    info!(
        "Benchmarks finished in {}",
        pretty_time_elapsed(rf.ended_at.saturating_sub(rf.started_at) as f64, "s")
    );

    save_reports(rf, &files)?;
    print_file_locations(&[
        files.path("results.txt"),
        files.path("results.json"),
        files.path("log"),
        files.path("debug.log"),
    ]);
    Ok(())
}

fn main() {
    setup_prog_state();
    bench::init_benchs();
    set_after_help(&bench_list());

    let (args_file, updated) = Args::init_args_and_logging_nosave().unwrap_or_else(|e| {
        error!("Failed to process args file ({:#})", &e);
        exit(1);
    });

    if updated {
        if let Err(e) = Args::save_args(&args_file) {
            error!("Failed to update args file ({:#})", &e);
            exit(1);
        }
    }

    let args = &args_file.data;

    match args.mode {
        Mode::List => {
            for (kind, title) in bench_list().iter() {
                println!("{:12} {}", kind, title);
            }
        }
        Mode::Format => {
            if let Err(e) = format_result_file(&args.result) {
                error!("Failed to format result file ({:#})", &e);
                exit(1);
            }
        }
        Mode::Run => {
            if let Err(e) = run_benchs(args) {
                error_message(&format!("{:#}", &e));
                exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_files() {
        let files = RunFiles::new(
            Path::new("/root/spet_results"),
            7,
            "Intel(R) Xeon(R) Platinum 8180 CPU @ 2.50GHz",
        );
        assert_eq!(files.name, "SPET.007.intel_xeon_platinum_8180_cpu_2.50ghz");
        assert_eq!(
            files.path("results.json"),
            PathBuf::from(
                "/root/spet_results/SPET.007.intel_xeon_platinum_8180_cpu_2.50ghz/\
                 SPET.007.intel_xeon_platinum_8180_cpu_2.50ghz.results.json"
            )
        );
    }

    #[test]
    fn test_load_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");

        let mut args = Args::default();
        args.overrides = Some(path.to_string_lossy().to_string());
        args.sysinfo_ovr.cores = Some(8);
        let ovr = load_overrides(&args).unwrap();
        assert_eq!(ovr.cores, Some(8));
        assert_eq!(ovr.sockets, None);
        assert!(fs::read_to_string(&path).unwrap().starts_with("//"));

        fs::write(&path, "// edited\n{ \"sockets\": 2, \"cores\": 4 }\n").unwrap();
        let ovr = load_overrides(&args).unwrap();
        assert_eq!(ovr.sockets, Some(2));
        assert_eq!(ovr.cores, Some(8));

        args.overrides = None;
        assert_eq!(load_overrides(&args).unwrap().sockets, None);
    }

    #[test]
    fn test_save_reports() {
        bench::init_test_benchs();

        let dir = tempfile::tempdir().unwrap();
        let files = RunFiles::new(dir.path(), 3, "Test CPU");
        fs::create_dir_all(&files.dir).unwrap();

        let rf = ResultFile {
            run_name: files.name.clone(),
            started_at: 100,
            ended_at: 200,
            ..Default::default()
        };
        save_reports(rf, &files).unwrap();

        for suffix in &["results.json", "spet.json", "results.txt"] {
            assert!(files.path(suffix).is_file(), "{}", suffix);
        }
        assert!(!files.dir.join("SPET.003.test_cpu.spet.json.staging").exists());

        let loaded = ResultFile::load(files.path("spet.json")).unwrap();
        assert_eq!(loaded.run_name, "SPET.003.test_cpu");
        assert_eq!(loaded.ended_at, 200);
        let text = fs::read_to_string(files.path("results.txt")).unwrap();
        assert!(text.contains("Server Performance Evaluation Tool Summary"));
        assert!(text.contains("SKIPPED"));
    }

    #[test]
    fn test_build_jobs() {
        bench::init_test_benchs();

        let mut args = Args::default();
        args.excludes = vec!["docker".into(), "sql".into()];
        let jobs = build_jobs(&args).unwrap();
        let kinds: Vec<&str> = jobs.iter().map(|j| j.data.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "lmbench",
                "mlc",
                "openssl",
                "compilation",
                "zlib",
                "linpack",
                "stream",
                "nosql",
                "sql",
                "docker"
            ]
        );
        let skipped: Vec<&str> = jobs
            .iter()
            .filter(|j| j.is_skipped())
            .map(|j| j.data.kind.as_str())
            .collect();
        assert_eq!(skipped, vec!["sql", "docker"]);

        args.job_specs = vec![Args::parse_job_spec("stream:runs=5").unwrap()];
        assert_eq!(build_jobs(&args).unwrap().len(), 1);

        args.excludes = vec!["bogus".into()];
        assert!(build_jobs(&args).is_err());
        args.excludes = vec![];
        args.job_specs = vec![Args::parse_job_spec("stream:bogus=1").unwrap()];
        assert!(build_jobs(&args).is_err());
    }
}
