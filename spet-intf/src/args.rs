// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Context, Result};
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::process::exit;
use std::sync::Mutex;

use super::{JobSpec, Overrides};
use spet_util::*;

lazy_static::lazy_static! {
    static ref TOP_ARGS_STR: String = {
        let dfl_args = Args::default();
        format!(
            "-r, --results-dir=[DIR]      'Directory for result files (dfl: {dfl_results_dir})'
                 --root=[DIR]             'Directory for downloaded and built packages (dfl: {dfl_root})'
             -o, --overrides=[FILE]       'Loads system information overrides from FILE'
                 --sysinfo=[OVRS]         'System information overrides, e.g. cores=8,memory=64'
                 --avx512                 'Enables AVX-512 for LINPACK'
                 --prerun-settle=[DUR]    'Settle time before each measurement (dfl: {dfl_settle})'
             -a, --args=[FILE]            'Loads base command line arguments from FILE'
             -d, --debug                  'Shows debugging statements, same as -vv'
             -v...                        'Sets the level of verbosity'",
            dfl_results_dir = dfl_args.results_dir,
            dfl_root = dfl_args.root,
            dfl_settle = format_duration(dfl_args.prerun_settle),
        )
    };
    static ref AFTER_HELP: Mutex<&'static str> = Mutex::new("");
}

pub fn set_after_help(list: &[(String, String)]) {
    let mut buf = String::new();
    let kind_width = list.iter().map(|pair| pair.0.len()).max().unwrap_or(0);
    writeln!(buf, "BENCHMARKS: Names accepted by --exclude and as job specs").unwrap();
    for pair in list.iter() {
        writeln!(
            buf,
            "    {:width$}    {}",
            &pair.0,
            &pair.1,
            width = kind_width
        )
        .unwrap();
    }
    *AFTER_HELP.lock().unwrap() = Box::leak(Box::new(buf));
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Mode {
    Run,
    Format,
    List,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Args {
    pub results_dir: String,
    pub root: String,
    pub overrides: Option<String>,
    pub sysinfo_ovr: Overrides,
    pub excludes: Vec<String>,
    pub avx512: bool,
    pub prerun_settle: f64,
    pub mode: Mode,
    pub job_specs: Vec<JobSpec>,

    #[serde(skip)]
    pub result: String,
    #[serde(skip)]
    pub verbosity: u32,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            results_dir: Self::dfl_results_dir(),
            root: Self::DFL_ROOT.into(),
            overrides: None,
            sysinfo_ovr: Default::default(),
            excludes: vec![],
            avx512: false,
            prerun_settle: Self::DFL_PRERUN_SETTLE,
            mode: Mode::Run,
            job_specs: vec![],
            result: "".into(),
            verbosity: 0,
        }
    }
}

impl Args {
    pub const DFL_ROOT: &'static str = "/var/lib/spet";
    pub const DFL_PRERUN_SETTLE: f64 = 10.0;

    fn dfl_results_dir() -> String {
        match std::env::var("HOME") {
            Ok(home) if home.len() > 0 => format!("{}/spet_results", home),
            _ => "/root/spet_results".into(),
        }
    }

    pub fn src_dir(&self) -> String {
        self.root.clone() + "/src"
    }

    pub fn parse_propset(input: &str) -> BTreeMap<String, String> {
        let mut propset = BTreeMap::<String, String>::new();
        for tok in input.split(',') {
            if tok.len() == 0 {
                continue;
            }

            // Allow key-only properties.
            let mut kv = tok.splitn(2, '=').collect::<Vec<&str>>();
            while kv.len() < 2 {
                kv.push("");
            }

            propset.insert(kv[0].into(), kv[1].into());
        }
        propset
    }

    pub fn parse_job_spec(spec: &str) -> Result<JobSpec> {
        let mut groups = spec.split(':');

        let kind = match groups.next() {
            Some(v) if v.len() > 0 => v,
            _ => bail!("invalid job type"),
        };

        let mut props = vec![];
        let mut id = None;

        for group in groups {
            let mut propset = Self::parse_propset(group);
            if let Some(v) = propset.remove("id") {
                id = Some(v);
            }
            props.push(propset);
        }

        // Make sure there always is the first group.
        if props.len() == 0 {
            props.push(Default::default());
        }

        Ok(JobSpec::new(kind, id.as_deref(), props))
    }

    fn parse_job_specs(subm: &clap::ArgMatches) -> Result<Vec<JobSpec>> {
        let mut job_specs = vec![];
        if let Some(specs) = subm.values_of("spec") {
            for spec in specs {
                match Self::parse_job_spec(spec) {
                    Ok(v) => job_specs.push(v),
                    Err(e) => bail!("spec {:?}: {}", spec, &e),
                }
            }
        }
        Ok(job_specs)
    }

    fn parse_sysinfo_ovr(input: &str) -> Result<Overrides> {
        let mut ovr = Overrides::default();
        for (k, v) in Self::parse_propset(input).iter() {
            let consumed = ovr
                .parse(k, v)
                .with_context(|| format!("Parsing sysinfo override \"{}={}\"", k, v))?;
            if !consumed {
                bail!("Unknown sysinfo override {:?}", k);
            }
        }
        Ok(ovr)
    }

    fn process_run(&mut self, subm: &clap::ArgMatches) -> bool {
        let mut updated = false;

        if self.mode != Mode::Run {
            self.job_specs = vec![];
            self.mode = Mode::Run;
            updated = true;
        }

        match Self::parse_job_specs(subm) {
            Ok(job_specs) => {
                if job_specs.len() > 0 {
                    self.job_specs = job_specs;
                    updated = true;
                }
            }
            Err(e) => {
                error!("{}", &e);
                exit(1);
            }
        }
        updated
    }
}

impl JsonLoad for Args {}
impl JsonSave for Args {}

#[allow(unknown_lints, dangerous_implicit_autorefs)]
impl JsonArgs for Args {
    fn match_cmdline() -> clap::ArgMatches<'static> {
        let job_spec_arg = clap::Arg::with_name("spec")
            .multiple(true)
            .help("Benchmark job spec - \"BENCH[:KEY[=VAL][,KEY[=VAL]...]]\"");

        clap::App::new("spet")
            .version((*super::FULL_VERSION).as_str())
            .author(clap::crate_authors!("\n"))
            .about("Server Performance Evaluation Tool")
            .setting(clap::AppSettings::UnifiedHelpMessage)
            .setting(clap::AppSettings::DeriveDisplayOrder)
            .args_from_usage(&TOP_ARGS_STR)
            .arg(
                clap::Arg::with_name("exclude")
                    .long("exclude")
                    .short("e")
                    .multiple(true)
                    .takes_value(true)
                    .number_of_values(1)
                    .use_delimiter(true)
                    .help("Excludes the listed benchmarks from this run"),
            )
            .subcommand(
                clap::SubCommand::with_name("run")
                    .about("Runs benchmarks (default)")
                    .arg(job_spec_arg.clone()),
            )
            .subcommand(
                clap::SubCommand::with_name("format")
                    .about("Formats the results of an earlier run")
                    .arg(
                        clap::Arg::with_name("result")
                            .long("result")
                            .short("R")
                            .takes_value(true)
                            .required(true)
                            .help("The *.spet.json file of the run"),
                    ),
            )
            .subcommand(clap::SubCommand::with_name("list").about("Lists the benchmarks"))
            .after_help(*AFTER_HELP.lock().unwrap())
            .get_matches()
    }

    fn verbosity(matches: &clap::ArgMatches) -> u32 {
        let v = matches.occurrences_of("v") as u32;
        if matches.is_present("debug") {
            v.max(2)
        } else {
            v
        }
    }

    fn process_cmdline(&mut self, matches: &clap::ArgMatches) -> bool {
        let dfl = Args::default();
        let mut updated = false;

        if let Some(v) = matches.value_of("results-dir") {
            self.results_dir = if v.len() > 0 {
                v.to_string()
            } else {
                dfl.results_dir.clone()
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("root") {
            self.root = if v.len() > 0 {
                v.to_string()
            } else {
                dfl.root.clone()
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("overrides") {
            self.overrides = if v.len() > 0 {
                Some(v.to_string())
            } else {
                None
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("sysinfo") {
            self.sysinfo_ovr = match Self::parse_sysinfo_ovr(v) {
                Ok(ovr) => ovr,
                Err(e) => {
                    error!("{:#}", &e);
                    exit(1);
                }
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("prerun-settle") {
            self.prerun_settle = if v.len() > 0 {
                match parse_duration(v) {
                    Ok(dur) => dur,
                    Err(e) => {
                        error!("Invalid --prerun-settle {:?} ({})", v, &e);
                        exit(1);
                    }
                }
            } else {
                dfl.prerun_settle
            };
            updated = true;
        }
        if let Some(excludes) = matches.values_of("exclude") {
            self.excludes = excludes
                .filter(|x| x.len() > 0)
                .map(|x| x.to_lowercase())
                .collect();
            updated = true;
        }
        if matches.is_present("avx512") {
            if !self.avx512 {
                updated = true;
            }
            self.avx512 = true;
        }

        self.verbosity = Self::verbosity(matches);

        updated |= match matches.subcommand() {
            ("run", Some(subm)) => self.process_run(subm),
            ("format", Some(subm)) => {
                self.mode = Mode::Format;
                self.result = subm.value_of("result").unwrap_or("").into();
                false
            }
            ("list", Some(_subm)) => {
                self.mode = Mode::List;
                false
            }
            _ => {
                let changed = self.mode != Mode::Run;
                self.mode = Mode::Run;
                changed
            }
        };

        updated
    }
}
