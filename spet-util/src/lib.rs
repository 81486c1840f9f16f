// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local};
use log::{info, warn};
use simplelog as sl;
use std::collections::HashMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::prelude::*;
use std::io::BufReader;
use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, UNIX_EPOCH};

pub mod exec;
pub mod fetch;
pub mod json_file;
pub mod pretty;

pub use exec::*;
pub use fetch::{download, extract_tar, generate_corpus};
pub use json_file::{JsonArgs, JsonArgsHelper, JsonConfigFile, JsonLoad, JsonReportFile, JsonSave};
pub use pretty::*;

lazy_static::lazy_static! {
    pub static ref TOTAL_SYSTEM_MEMORY: usize = {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        sys.total_memory() as usize
    };
    pub static ref NR_SYSTEM_CPUS: usize = ::num_cpus::get();
    static ref DEBUG_LOG_SINK: LogSink = LogSink::new();
    static ref CONSOLE_LOG_SINK: LogSink = LogSink::new();
}

pub fn full_version(semver: &str) -> String {
    let mut ver = semver.to_string();
    if let Some(sha) = option_env!("VERGEN_GIT_SHA") {
        if sha.len() > 0 {
            ver += " ";
            ver += &sha[0..7.min(sha.len())];
            if option_env!("VERGEN_GIT_DIRTY") == Some("true") {
                ver += "-dirty";
            }
        }
    }
    if let Some(triple) = option_env!("VERGEN_CARGO_TARGET_TRIPLE") {
        ver += " ";
        ver += triple;
    }
    ver
}

pub fn to_gb<T>(size: T) -> f64
where
    T: num::ToPrimitive,
{
    let size_f64 = size.to_f64().unwrap_or(0.0);
    size_f64 / (1 << 30) as f64
}

pub fn to_mb<T>(size: T) -> f64
where
    T: num::ToPrimitive,
{
    let size_f64 = size.to_f64().unwrap_or(0.0);
    size_f64 / (1 << 20) as f64
}

fn format_size_internal<T>(size: T, zero: &str) -> String
where
    T: num::ToPrimitive,
{
    let format_size_helper = |size: u64, shift: u32, suffix: &str| -> Option<String> {
        let unit: u64 = 1 << shift;

        if (size as f64 / unit as f64) < 99.95 {
            Some(format!(
                "{:.1}{}",
                (size as f64 / unit as f64).max(0.1),
                suffix
            ))
        } else if (size as f64 / unit as f64) < 1024.0 {
            Some(format!("{:.0}{}", size as f64 / unit as f64, suffix))
        } else {
            None
        }
    };

    let size = size.to_u64().unwrap_or(0);

    if size == 0 {
        zero.to_string()
    } else if size < 9999 {
        format!("{}", size)
    } else {
        format_size_helper(size, 10, "K")
            .or_else(|| format_size_helper(size, 20, "M"))
            .or_else(|| format_size_helper(size, 30, "G"))
            .or_else(|| format_size_helper(size, 40, "P"))
            .or_else(|| format_size_helper(size, 50, "E"))
            .unwrap_or_else(|| "INF".into())
    }
}

pub fn format_size<T>(size: T) -> String
where
    T: num::ToPrimitive,
{
    format_size_internal(size, "0")
}

fn format_duration_internal(dur: f64, zero: &str) -> String {
    let format_nsecs_helper = |nsecs: u64, unit: u64, max: u64, suffix: &str| -> Option<String> {
        if nsecs == 0 {
            Some(zero.to_string())
        } else if (nsecs as f64 / unit as f64) < 99.95 {
            Some(format!(
                "{:.1}{}",
                (nsecs as f64 / unit as f64).max(0.1),
                suffix
            ))
        } else if (nsecs as f64 / unit as f64) < max as f64 {
            Some(format!("{:.0}{}", nsecs as f64 / unit as f64, suffix))
        } else {
            None
        }
    };

    let nsecs = (dur * 1_000_000_000.0).round() as u64;

    format_nsecs_helper(nsecs, 10_u64.pow(0), 1000, "n")
        .or_else(|| format_nsecs_helper(nsecs, 10_u64.pow(3), 1000, "u"))
        .or_else(|| format_nsecs_helper(nsecs, 10_u64.pow(6), 1000, "m"))
        .or_else(|| format_nsecs_helper(nsecs, 10_u64.pow(9), 60, "s"))
        .or_else(|| format_nsecs_helper(nsecs, 10_u64.pow(9) * 60, 60, "M"))
        .or_else(|| format_nsecs_helper(nsecs, 10_u64.pow(9) * 60 * 60, 24, "H"))
        .or_else(|| format_nsecs_helper(nsecs, 10_u64.pow(9) * 60 * 60 * 24, 365, "D"))
        .unwrap_or_else(|| "INF".into())
}

pub fn format_duration(dur: f64) -> String {
    format_duration_internal(dur, "0")
}

pub fn parse_duration(input: &str) -> Result<f64> {
    lazy_static::lazy_static! {
        static ref UNITS: HashMap<char, f64> = [
            ('n', 0.000_000_001),
            ('u', 0.000_001),
            ('m', 0.001),
            ('s', 1.0),
            ('M', 60.0),
            ('H', 3600.0),
            ('D', 3600.0 * 24.0),
        ]
            .iter()
            .cloned()
            .collect();
    }

    let mut num = String::new();
    let mut sum = 0.0;
    for ch in input.chars() {
        match ch {
            '_' => continue,
            ch if UNITS.contains_key(&ch) => {
                sum += num.trim().parse::<f64>()? * UNITS[&ch];
                num.clear();
            }
            ch => num.push(ch),
        }
    }
    if num.trim().len() > 0 {
        sum += num.trim().parse::<f64>()?;
    }
    Ok(sum)
}

/// Parse sizes as printed by lscpu and sysfs, e.g. "32K", "1024 KiB" or
/// "35.75 MiB (1 instance)". Anything after the first unit is ignored.
pub fn parse_size(input: &str) -> Result<u64> {
    lazy_static::lazy_static! {
        static ref UNITS: HashMap<char, u32> = [
            ('B', 0),
            ('K', 10),
            ('M', 20),
            ('G', 30),
            ('T', 40),
            ('P', 50),
        ].iter().cloned().collect();
    }

    let parse_num = |num: &str, shift: u32| -> Result<u64> {
        Ok(if num.contains(".") {
            (num.parse::<f64>()? * (2u64.pow(shift) as f64)).round() as u64
        } else {
            num.parse::<u64>()? * (1 << shift)
        })
    };

    let mut num = String::new();
    for ch in input.trim().chars() {
        let ch = ch.to_ascii_uppercase();
        match ch {
            '_' | ' ' => continue,
            ch if UNITS.contains_key(&ch) => {
                if num.is_empty() {
                    bail!("size {:?} has no number", input);
                }
                return parse_num(&num, UNITS[&ch]);
            }
            ch if ch.is_ascii_digit() || ch == '.' => num.push(ch),
            _ => break,
        }
    }
    if num.is_empty() {
        bail!("size {:?} has no number", input);
    }
    parse_num(&num, 0)
}

fn is_executable<P: AsRef<Path>>(path_in: P) -> bool {
    let path = path_in.as_ref();
    match path.metadata() {
        Ok(md) => md.is_file() && md.mode() & 0o111 != 0,
        Err(_) => false,
    }
}

pub fn find_bin<N: AsRef<OsStr>, P: AsRef<OsStr>>(
    name_in: N,
    prepend_in: Option<P>,
) -> Option<PathBuf> {
    let name = name_in.as_ref();
    let mut search = OsString::new();
    if let Some(prepend) = prepend_in.as_ref() {
        search.push(prepend);
        search.push(":");
    }
    if let Some(dirs) = env::var_os("PATH") {
        search.push(dirs);
    }
    for dir in env::split_paths(&search) {
        let mut path = dir.to_owned();
        path.push(name);
        if let Ok(path) = path.canonicalize() {
            if is_executable(&path) {
                return Some(path);
            }
        }
    }
    None
}

pub fn make_executable<P: AsRef<Path>>(path_in: P) -> Result<()> {
    let path = path_in.as_ref();
    let mut perm = fs::metadata(path)?.permissions();
    perm.set_mode(perm.mode() | 0o111);
    fs::set_permissions(path, perm)?;
    Ok(())
}

pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

pub fn read_one_line<P: AsRef<Path>>(path: P) -> Result<String> {
    let f = fs::OpenOptions::new().read(true).open(path)?;
    let r = BufReader::new(f);
    Ok(r.lines().next().ok_or(anyhow!("File empty"))??)
}

pub fn write_one_line<P: AsRef<Path>>(path: P, line: &str) -> Result<()> {
    let mut f = fs::OpenOptions::new().write(true).open(path)?;
    Ok(f.write_all(line.as_ref())?)
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    fs::read_to_string(path).with_context(|| format!("Reading {:?}", path))
}

pub fn write_file<P: AsRef<Path>>(path: P, text: &str, append: bool) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .with_context(|| format!("Opening {:?}", path))?;
    f.write_all(text.as_ref())?;
    Ok(())
}

pub fn touch<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Touching {:?}", path))?;
    Ok(())
}

/// Substitute `pattern` with `repl` on every line of the file.
pub fn replace_line<P: AsRef<Path>>(path: P, pattern: &str, repl: &str) -> Result<()> {
    let path = path.as_ref();
    let re = regex::Regex::new(pattern)?;
    let text = read_file(path)?;
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        out += &re.replace_all(line, repl);
        out += "\n";
    }
    write_file(path, &out, false)
}

pub fn grep_text(text: &str, pattern: &str) -> Result<Vec<String>> {
    let re = regex::Regex::new(pattern)?;
    Ok(text
        .lines()
        .filter(|line| re.is_match(line))
        .map(|line| line.to_string())
        .collect())
}

pub fn grep_file<P: AsRef<Path>>(path: P, pattern: &str) -> Result<Vec<String>> {
    grep_text(&read_file(path)?, pattern)
}

pub fn remove_ansi(text: &str) -> String {
    lazy_static::lazy_static! {
        static ref ANSI_RE: regex::Regex =
            regex::Regex::new(r"\x1b(\[[0-9;?]*[ -/]*[@-~]|[@-Z\\-_])").unwrap();
    }
    ANSI_RE.replace_all(text, "").to_string()
}

/// Bump the run number stored in `lock` and return the new value. A
/// missing or garbled lock file starts over from 1.
pub fn next_run_number<P: AsRef<Path>>(lock: P) -> Result<u32> {
    let lock = lock.as_ref();
    let nr = match read_one_line(lock) {
        Ok(line) => line.trim().parse::<u32>().unwrap_or(0) + 1,
        Err(_) => 1,
    };
    write_file(lock, &format!("{}\n", nr), false)?;
    Ok(nr)
}

pub fn unix_now() -> u64 {
    UNIX_EPOCH.elapsed().map(|d| d.as_secs()).unwrap_or(0)
}

pub fn format_unix_time(time: u64) -> String {
    DateTime::<Local>::from(UNIX_EPOCH + Duration::from_secs(time))
        .format("%Y-%m-%d %T")
        .to_string()
}

/// Log destination which buffers until a file is attached. Logging is
/// brought up before the run directory is known.
#[derive(Clone)]
struct LogSink {
    inner: Arc<Mutex<(Vec<u8>, Option<fs::File>)>>,
}

impl LogSink {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new((vec![], None))),
        }
    }

    fn attach(&self, path: &Path) -> Result<()> {
        let mut f = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Opening log file {:?}", path))?;
        let mut inner = self.inner.lock().unwrap();
        f.write_all(&inner.0)?;
        inner.0.clear();
        inner.1 = Some(f);
        Ok(())
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        match inner.1.as_mut() {
            Some(f) => f.write(buf),
            None => {
                inner.0.extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.inner.lock().unwrap().1.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

pub fn init_logging(verbosity: u32) {
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
    } else {
        let sl_level = match verbosity {
            0 | 1 => sl::LevelFilter::Info,
            2 => sl::LevelFilter::Debug,
            _ => sl::LevelFilter::Trace,
        };
        let mut lcfg = sl::ConfigBuilder::new();
        lcfg.set_time_level(sl::LevelFilter::Off)
            .set_location_level(sl::LevelFilter::Off)
            .set_target_level(sl::LevelFilter::Off)
            .set_thread_level(sl::LevelFilter::Off);
        let mut dcfg = sl::ConfigBuilder::new();
        dcfg.set_time_level(sl::LevelFilter::Error)
            .set_location_level(sl::LevelFilter::Error)
            .set_target_level(sl::LevelFilter::Off)
            .set_thread_level(sl::LevelFilter::Off);

        let term: Box<dyn sl::SharedLogger> = if console::user_attended_stderr() {
            sl::TermLogger::new(
                sl_level,
                lcfg.build(),
                sl::TerminalMode::Stderr,
                sl::ColorChoice::Auto,
            )
        } else {
            sl::SimpleLogger::new(sl_level, lcfg.build())
        };

        let loggers: Vec<Box<dyn sl::SharedLogger>> = vec![
            term,
            sl::WriteLogger::new(sl_level, lcfg.build(), CONSOLE_LOG_SINK.clone()),
            sl::WriteLogger::new(
                sl::LevelFilter::Debug.max(sl_level),
                dcfg.build(),
                DEBUG_LOG_SINK.clone(),
            ),
        ];
        if let Err(e) = sl::CombinedLogger::init(loggers) {
            eprintln!("Failed to initialize logging ({})", &e);
        }
    }
}

/// Start persisting log records. `log` receives what the console shows and
/// `debug` everything down to debug level. Records logged before this call
/// are written out first.
pub fn set_log_files<P: AsRef<Path>, Q: AsRef<Path>>(log: P, debug: Q) -> Result<()> {
    CONSOLE_LOG_SINK.attach(log.as_ref())?;
    DEBUG_LOG_SINK.attach(debug.as_ref())?;
    Ok(())
}

struct GlobalProgState {
    exiting: bool,
}

lazy_static::lazy_static! {
    static ref PROG_STATE: Mutex<GlobalProgState> = Mutex::new(GlobalProgState { exiting: false });
    static ref PROG_WAITQ: Condvar = Condvar::new();
}

pub fn setup_prog_state() {
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGINT/TERM received, exiting...");
        set_prog_exiting();
    }) {
        warn!("Failed to set term handler ({})", &e);
    }
}

pub fn set_prog_exiting() {
    PROG_STATE.lock().unwrap().exiting = true;
    PROG_WAITQ.notify_all();
}

pub fn prog_exiting() -> bool {
    PROG_STATE.lock().unwrap().exiting
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgState {
    Running,
    Exiting,
}

fn wait_prog_state(dur: Duration) -> ProgState {
    let mut first = true;
    let mut state = PROG_STATE.lock().unwrap();
    loop {
        if state.exiting {
            return ProgState::Exiting;
        }
        if first {
            state = PROG_WAITQ.wait_timeout(state, dur).unwrap().0;
            first = false;
        } else {
            return ProgState::Running;
        }
    }
}

/// Sleep for `dur` while services and caches settle. Fails early if the
/// program is told to exit.
pub fn sleep_unless_exiting(dur: Duration) -> Result<()> {
    let until = std::time::Instant::now() + dur;
    loop {
        let now = std::time::Instant::now();
        if now >= until {
            return Ok(());
        }
        if wait_prog_state(until - now) == ProgState::Exiting {
            bail!("Program exiting");
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_format_duration() {
        for pair in &[
            (0.000003932, "3.9u"),
            (0.00448, "4.5m"),
            (0.3, "300m"),
            (2042.0, "34.0M"),
            (3456000.0, "40.0D"),
        ] {
            let result = super::format_duration(pair.0);
            assert_eq!(&result, pair.1);
            println!("{} -> {} ({})", pair.0, &result, pair.1);
        }
    }

    #[test]
    fn test_parse_duration() {
        for pair in &[
            (0.0000039, "3.9u"),
            (0.0044, "4.4m"),
            (0.3, "300m"),
            (2040.0, "34.0M"),
            (10.0, "10s"),
            (1.27, "1.27"),
            (1.37, "100m1.27"),
        ] {
            let result = super::parse_duration(pair.1).unwrap();
            assert_eq!(pair.0, result);
            println!("{} -> {} ({})", pair.1, result, pair.0);
        }
    }

    #[test]
    fn test_parse_size() {
        for pair in &[
            (32768, "32K"),
            (1048576, "1024K"),
            (1048576, "1024 KiB"),
            (37486592, "35.75 MiB (1 instance)"),
            (4096, "4096"),
            (8388608, "8M"),
        ] {
            let result = super::parse_size(pair.1).unwrap();
            assert_eq!(pair.0, result);
            println!("{} -> {} ({})", pair.1, result, pair.0);
        }
        assert!(super::parse_size("unknown").is_err());
    }

    #[test]
    fn test_run_number() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join(".SPET.lock");
        assert_eq!(super::next_run_number(&lock).unwrap(), 1);
        assert_eq!(super::next_run_number(&lock).unwrap(), 2);
        assert_eq!(super::read_one_line(&lock).unwrap(), "2");
        super::write_file(&lock, "garbage\n", false).unwrap();
        assert_eq!(super::next_run_number(&lock).unwrap(), 1);
    }

    #[test]
    fn test_replace_and_grep() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("HPL.dat");
        super::write_file(
            &path,
            "1            # of problems sizes (N)\n29 30 34 35  Ns\n1 2 3 4      NBs\n",
            false,
        )
        .unwrap();
        super::replace_line(&path, r"(\d+\s)+\s*NBs", "192    NBs").unwrap();
        super::replace_line(&path, r"^\d+\s+# of problems sizes \(N\)", "3      # of problems sizes (N)")
            .unwrap();
        let text = super::read_file(&path).unwrap();
        assert_eq!(
            text,
            "3      # of problems sizes (N)\n29 30 34 35  Ns\n192    NBs\n"
        );
        assert_eq!(
            super::grep_file(&path, "NBs").unwrap(),
            vec!["192    NBs".to_string()]
        );
        assert!(super::replace_line(dir.path().join("missing"), "a", "b").is_err());
    }

    #[test]
    fn test_remove_ansi() {
        assert_eq!(
            super::remove_ansi("\x1b[31mError\x1b[0m: failed"),
            "Error: failed"
        );
        assert_eq!(super::remove_ansi("plain"), "plain");
    }
}
