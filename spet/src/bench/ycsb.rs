// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;
use serde::Serialize;

const DFL_RUNS: u32 = 3;
const SERVICE_SETTLE: Duration = Duration::from_secs(20);
const RUN_SETTLE: Duration = Duration::from_secs(10);
const CASSANDRA_PIDFILE: &str = "/tmp/cassandra.pid";
const MYSQL_PIDFILE: &str = "/tmp/mysql.pid";
const CASSANDRA_SCHEMA: &str = include_str!("../../provided/create-table.cql");
const MYSQL_SCHEMA: &str = include_str!("../../provided/create-table.mysql");

const THROUGHPUT: &str = "Throughput";
const READ_LATENCY: &str = "95th Percentile Read Latency";
const UPDATE_LATENCY: &str = "95th Percentile Update Latency";

const JDBC_ARGS: &str = "-p db.driver=com.mysql.jdbc.Driver \
                         -p db.url=jdbc:mysql://localhost:3306/ycsb?useSSL=false \
                         -p db.user=root -p db.passwd=\"\"";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Backend {
    Cassandra,
    MySql,
}

impl Backend {
    fn kind(&self) -> &'static str {
        match self {
            Self::Cassandra => "nosql",
            Self::MySql => "sql",
        }
    }

    fn service(&self) -> &'static str {
        match self {
            Self::Cassandra => "Cassandra",
            Self::MySql => "MySQL",
        }
    }

    fn dfl_count(&self) -> u64 {
        match self {
            Self::Cassandra => 10_000_000,
            Self::MySql => 1_000_000,
        }
    }

    /// `ycsb load` or `ycsb run` for the backend.
    fn ycsb_cmd(&self, verb: &str, threads: u32, count_key: &str, count: u64) -> String {
        let binding = match self {
            Self::Cassandra => {
                "cassandra-cql -s -P workloads/workloada -p hosts=\"localhost\"".to_string()
            }
            Self::MySql => format!("jdbc -s -P workloads/workloada {}", JDBC_ARGS),
        };
        format!(
            "./bin/ycsb {} {} -threads {} -p {}={}",
            verb, binding, threads, count_key, count
        )
    }
}

pub struct YcsbBench {
    backend: Backend,
}

impl YcsbBench {
    pub fn nosql() -> Self {
        Self {
            backend: Backend::Cassandra,
        }
    }

    pub fn sql() -> Self {
        Self {
            backend: Backend::MySql,
        }
    }
}

impl Bench for YcsbBench {
    fn desc(&self) -> BenchDesc {
        let desc = match self.backend {
            Backend::Cassandra => BenchDesc::new("nosql", "YCSB NoSQL")
                .header(
                    "NoSQL database computing performance using YCSB and Cassandra. \
                     Higher throughput is better. Lower latency is better.",
                )
                .commands_title("YCSB NoSQL using Cassandra"),
            Backend::MySql => BenchDesc::new("sql", "YCSB SQL")
                .header(
                    "SQL database computing performance using YCSB and MySQL. \
                     Higher throughput is better. Lower latency is better.",
                )
                .commands_title("YCSB SQL using MySQL")
                .heavy_boundary(),
        };
        desc.placeholders(&[THROUGHPUT, READ_LATENCY, UPDATE_LATENCY])
    }

    fn parse(&self, spec: &JobSpec) -> Result<Box<dyn Job>> {
        let mut job = YcsbJob {
            backend: self.backend,
            runs: DFL_RUNS,
            records: self.backend.dfl_count(),
            ops: self.backend.dfl_count(),
        };
        for (k, v) in spec.props[0].iter() {
            match k.as_str() {
                "runs" => job.runs = parse_runs(v)?,
                "records" => job.records = v.parse::<u64>()?,
                "ops" => job.ops = v.parse::<u64>()?,
                k => bail!("unknown property key {:?}", k),
            }
        }
        if job.records == 0 || job.ops == 0 {
            bail!("records and ops must be positive");
        }
        Ok(Box::new(job))
    }
}

#[derive(Debug, PartialEq, Serialize)]
struct YcsbRun {
    throughput: f64,
    read_latency: f64,
    update_latency: f64,
}

/// The third comma separated field of the last line matching `pattern`.
fn parse_field(output: &str, pattern: &str) -> Option<f64> {
    grep_text(output, pattern)
        .ok()?
        .last()?
        .split(',')
        .nth(2)?
        .trim()
        .parse::<f64>()
        .ok()
}

fn parse_run(output: &str) -> Result<Option<YcsbRun>> {
    if output.contains("UPDATE-FAILED") || output.contains("READ-FAILED") {
        bail!(BenchError::DatabaseFailed);
    }
    let throughput = parse_field(output, r"\[OVERALL\], Throughput\(ops/sec\),");
    let read_latency = parse_field(output, r"\[READ\], 95thPercentileLatency\(us\),");
    let update_latency = parse_field(output, r"\[UPDATE\], 95thPercentileLatency\(us\),");
    Ok(match (throughput, read_latency, update_latency) {
        (Some(throughput), Some(read_latency), Some(update_latency)) => Some(YcsbRun {
            throughput,
            read_latency,
            update_latency,
        }),
        _ => None,
    })
}

fn variance_pct(range: f64, median: f64) -> String {
    format!("{:.2}%", range / median)
}

struct YcsbJob {
    backend: Backend,
    runs: u32,
    records: u64,
    ops: u64,
}

impl YcsbJob {
    fn maven_env(rctx: &RunCtx) -> Result<Vec<(String, String)>> {
        let maven = rctx.src("maven");
        if !maven.is_dir() {
            return Err(BenchError::MissingFile(maven)).context("Maven could not be found");
        }
        Ok(vec![
            env_set("M2_HOME", &maven.to_string_lossy()),
            env_set("M2", &maven.join("bin").to_string_lossy()),
        ])
    }

    fn service_dir(&self, rctx: &RunCtx) -> PathBuf {
        match self.backend {
            Backend::Cassandra => rctx.src("cassandra"),
            Backend::MySql => rctx.src("mysql"),
        }
    }

    /// Present once the "ycsb" table has been created and loaded.
    fn table_dir(&self, rctx: &RunCtx) -> PathBuf {
        match self.backend {
            Backend::Cassandra => rctx.src("cassandra/data/data/ycsb"),
            Backend::MySql => rctx.src("mysql/mysql-files/ycsb"),
        }
    }

    fn start_service(&self, rctx: &RunCtx, env: &[(String, String)]) -> Result<Daemon> {
        let dir = self.service_dir(rctx);
        if !dir.is_dir() {
            return Err(BenchError::MissingFile(dir.clone()))
                .with_context(|| format!("Cannot start {}", self.backend.service()));
        }
        match self.backend {
            Backend::Cassandra => Daemon::start(
                "Cassandra",
                &format!("./bin/cassandra -R -p {}", CASSANDRA_PIDFILE),
                CASSANDRA_PIDFILE,
                &dir,
                env,
                SERVICE_SETTLE,
            )?
            .verify(),
            Backend::MySql => {
                let data = dir.join("mysql-files");
                Daemon::start(
                    "MySQL",
                    &format!(
                        "{0}/bin/mysqld_safe --user=root --basedir={0} --datadir={1} \
                         --plugin-dir={0}/lib/plugin --pid-file={2} --log-error=ycsb.err",
                        dir.display(),
                        data.display(),
                        MYSQL_PIDFILE
                    ),
                    MYSQL_PIDFILE,
                    &dir,
                    env,
                    SERVICE_SETTLE,
                )?
                .verify()
            }
        }
    }

    fn ycsb_source(rctx: &RunCtx) -> Source {
        let ver = &rctx.versions.ycsb;
        let archive = format!("ycsb-{}.tar.gz", ver);
        Source::new(
            "YCSB",
            &format!(
                "https://github.com/brianfrankcooper/YCSB/releases/download/{0}/{1}",
                ver, &archive
            ),
            &archive,
            &format!("ycsb-{}", ver),
            "ycsb",
        )
    }

    fn jconnect_source(rctx: &RunCtx) -> Source {
        let base = format!("mysql-connector-java-{}", &rctx.versions.jconnect);
        Source::new(
            "MySQL Connector/J",
            &format!(
                "https://dev.mysql.com/get/Downloads/Connector-J/{}.tar.gz",
                &base
            ),
            &format!("{}.tar.gz", &base),
            &base,
            "mysql-connector-java",
        )
    }

    fn create_table(&self, rctx: &mut RunCtx, env: &[(String, String)]) -> Result<()> {
        let dir = self.service_dir(rctx);
        let output = match self.backend {
            Backend::Cassandra => {
                let schema = rctx.src("ycsb/create-table.cql");
                write_file(&schema, CASSANDRA_SCHEMA, false)?;
                let cmd = format!("./bin/cqlsh -f {}", schema.display());
                rctx.record_cmd(&format!("Setup: {}", &cmd));
                shell_output_lenient(&cmd, Some(&dir), env)?
            }
            Backend::MySql => {
                let schema = rctx.src("ycsb/create-table.mysql");
                write_file(&schema, MYSQL_SCHEMA, false)?;
                let cmd = format!("./bin/mysql -uroot --skip-password < {}", schema.display());
                rctx.record_cmd(&format!("Setup: {}", &cmd));
                shell_output_lenient(&cmd, Some(&dir), env)?
            }
        };
        debug!("ycsb: Schema output:\n{}", output.trim_end());
        Ok(())
    }

    /// Make the JDBC binding see the MySQL connector.
    fn install_jconnect(rctx: &RunCtx) -> Result<()> {
        let jar = format!("mysql-connector-java-{}-bin.jar", &rctx.versions.jconnect);
        let src = rctx.src("mysql-connector-java").join(&jar);
        let dst = rctx.src("ycsb/jdbc-binding/lib").join(&jar);
        if !src.exists() {
            bail!(BenchError::MissingFile(src));
        }
        fs::copy(&src, &dst).with_context(|| format!("Copying {:?} to {:?}", &src, &dst))?;
        Ok(())
    }

    fn log_mysql_errors(&self, rctx: &RunCtx) {
        if self.backend != Backend::MySql {
            return;
        }
        let errlog = rctx.src("mysql/mysql-files/ycsb.err");
        if let Ok(text) = read_file(&errlog) {
            debug!("ycsb: {:?}:\n{}", &errlog, text.trim_end());
        }
    }
}

impl Job for YcsbJob {
    fn setup(&mut self, rctx: &mut RunCtx) -> Result<()> {
        Self::ycsb_source(rctx).prepare(rctx)?;
        if self.backend == Backend::MySql {
            Self::jconnect_source(rctx).prepare(rctx)?;
        }
        let env = Self::maven_env(rctx)?;

        if self.table_dir(rctx).exists() {
            debug!(
                "ycsb: Skipping {} setup, the \"ycsb\" table already exists",
                self.backend.service()
            );
            return Ok(());
        }

        rctx.set_status(&format!("Starting {}", self.backend.service()));
        let _svc = self.start_service(rctx, &env)?;

        rctx.set_status("Creating the \"ycsb\" table");
        self.create_table(rctx, &env)?;
        self.log_mysql_errors(rctx);
        if self.backend == Backend::MySql {
            Self::install_jconnect(rctx)?;
        }

        let load_cmd =
            self.backend
                .ycsb_cmd("load", rctx.nr_threads(), "recordcount", self.records);
        rctx.record_cmd(&format!("Load: {}", &load_cmd));
        rctx.set_status(&format!("Loading {} records", self.records));
        let output = shell_output(&load_cmd, Some(&rctx.src("ycsb")), &env)?;
        debug!("ycsb: Load output:\n{}", output.trim_end());
        self.log_mysql_errors(rctx);
        Ok(())
    }

    fn run(&mut self, rctx: &mut RunCtx) -> Result<serde_json::Value> {
        let env = Self::maven_env(rctx)?;
        if !self.table_dir(rctx).exists() {
            bail!(
                "Unable to find \"ycsb\" table in {}.",
                self.backend.service()
            );
        }
        let kind = self.backend.kind();
        let out_dir = rctx.job_dir(&format!("ycsb_{}", kind))?;
        let ycsb_dir = rctx.src("ycsb");

        rctx.set_status(&format!("Starting {}", self.backend.service()));
        let svc = self.start_service(rctx, &env)?;

        let run_cmd = self
            .backend
            .ycsb_cmd("run", rctx.nr_threads(), "operationcount", self.ops);
        rctx.record_cmd(&format!("Run: {}", &run_cmd));

        let mut result = serde_json::Map::new();
        result.insert(
            "unit".into(),
            json!({"throughput": "ops/sec", "latency": "us"}),
        );
        let (mut tputs, mut reads, mut updates) = (vec![], vec![], vec![]);
        for run in 1..=self.runs {
            rctx.prerun()?;
            sleep_unless_exiting(RUN_SETTLE)?;
            rctx.set_status(&format!("Run {}/{}", run, self.runs));
            let output = shell_output_lenient(&run_cmd, Some(&ycsb_dir), &env)?;
            write_file(
                out_dir.join(format!("ycsb-{}_run{}.txt", kind, run)),
                &output,
                false,
            )?;

            match parse_run(&output)? {
                Some(res) => {
                    debug!("ycsb: Run {} {:?}", run, &res);
                    result.insert(format!("run{}", run), serde_json::to_value(&res)?);
                    tputs.push(res.throughput);
                    reads.push(res.read_latency);
                    updates.push(res.update_latency);
                }
                None => warn!("ycsb: Run {} produced incomplete results", run),
            }
        }
        drop(svc);

        if tputs.is_empty() {
            bail!(BenchError::NoResult("YCSB throughput".into()));
        }
        insert_field_summaries(
            &mut result,
            &[
                ("throughput", tputs),
                ("read_latency", reads),
                ("update_latency", updates),
            ],
        );
        info!("ycsb: {} {}", kind, serde_json::Value::Object(result.clone()));
        Ok(serde_json::Value::Object(result))
    }

    fn format<'a>(
        &self,
        out: &mut Box<dyn Write + 'a>,
        result: &serde_json::Value,
        full: bool,
    ) -> Result<()> {
        let tp_unit = result["unit"]["throughput"].as_str().unwrap_or("");
        let lat_unit = result["unit"]["latency"].as_str().unwrap_or("");
        let rows = |out: &mut Box<dyn Write + 'a>, res: &serde_json::Value, sfx: &str| {
            if let Some(v) = res["throughput"].as_f64() {
                let val = match sfx {
                    "" => format!("{}", v as u64),
                    _ => format!("{:.2}", v),
                };
                let val = match tp_unit {
                    "" => val,
                    unit => format!("{} {}", val, unit),
                };
                write!(out, "{}", row(&format!("{}{}", THROUGHPUT, sfx), &val))?;
            }
            for (field, title) in [("read_latency", READ_LATENCY), ("update_latency", UPDATE_LATENCY)]
                .iter()
            {
                if let Some(v) = res[*field].as_f64() {
                    let title = format!("{}{}", title, sfx);
                    write!(out, "{}", row(&title, &pretty_small_time(v, lat_unit)))?;
                }
            }
            Ok::<(), anyhow::Error>(())
        };

        if full {
            for key in run_keys(result).iter() {
                let sfx = format!(": Run {}", key.trim_start_matches("run"));
                rows(out, &result[key], &sfx)?;
                write!(out, "{}", separator())?;
            }
            rows(out, &result["median"], ": Median")?;
        } else {
            rows(out, &result["median"], "")?;
        }

        if let (Some(range), Some(median)) = (
            result["range"]["throughput"].as_f64(),
            result["median"]["throughput"].as_f64(),
        ) {
            write!(
                out,
                "{}",
                row("Thoughput Variance", &variance_pct(range, median))
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "[OVERALL], RunTime(ms), 98812
[OVERALL], Throughput(ops/sec), 101202.28717159859
[READ], Operations, 4999283
[READ], AverageLatency(us), 512.7
[READ], 95thPercentileLatency(us), 1023
[UPDATE], Operations, 5000717
[UPDATE], 95thPercentileLatency(us), 1187
[UPDATE], Return=OK, 5000717
";

    #[test]
    fn test_parse_run() {
        let res = parse_run(OUTPUT).unwrap().unwrap();
        assert_eq!(
            res,
            YcsbRun {
                throughput: 101202.28717159859,
                read_latency: 1023.0,
                update_latency: 1187.0,
            }
        );

        let partial = "[OVERALL], Throughput(ops/sec), 100.0\n";
        assert_eq!(parse_run(partial).unwrap(), None);

        let failed = format!("{}[UPDATE-FAILED], Operations, 12\n", OUTPUT);
        assert!(parse_run(&failed).is_err());
    }

    #[test]
    fn test_cmds() {
        assert_eq!(
            Backend::Cassandra.ycsb_cmd("run", 80, "operationcount", 10_000_000),
            "./bin/ycsb run cassandra-cql -s -P workloads/workloada -p hosts=\"localhost\" \
             -threads 80 -p operationcount=10000000"
        );
        let load = Backend::MySql.ycsb_cmd("load", 8, "recordcount", 1_000_000);
        assert!(load.starts_with("./bin/ycsb load jdbc -s -P workloads/workloada -p db.driver="));
        assert!(load.ends_with("-threads 8 -p recordcount=1000000"));
    }

    #[test]
    fn test_parse() {
        let mut spec = JobSpec::dfl("sql");
        spec.props[0].insert("ops".into(), "5000".into());
        assert!(YcsbBench::sql().parse(&spec).is_ok());
        spec.props[0].insert("records".into(), "0".into());
        assert!(YcsbBench::sql().parse(&spec).is_err());
        assert!(YcsbBench::sql().desc().heavy_boundary);
        assert!(!YcsbBench::nosql().desc().heavy_boundary);
    }

    #[test]
    fn test_format() {
        let job = YcsbJob {
            backend: Backend::Cassandra,
            runs: 2,
            records: 1,
            ops: 1,
        };
        let result = json!({
            "unit": {"throughput": "ops/sec", "latency": "us"},
            "run1": {"throughput": 100000.5, "read_latency": 1000.0, "update_latency": 1500.0},
            "run2": {"throughput": 102000.0, "read_latency": 900.0, "update_latency": 1400.0},
            "median": {"throughput": 101000.25, "read_latency": 950.0, "update_latency": 1450.0},
            "range": {"throughput": 1999.5, "read_latency": 100.0, "update_latency": 100.0},
        });

        let mut buf = String::new();
        {
            let mut out: Box<dyn Write> = Box::new(&mut buf);
            job.format(&mut out, &result, false).unwrap();
        }
        let lines: Vec<&str> = buf.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Throughput ") && lines[0].ends_with(" 101000 ops/sec"));
        assert!(lines[1].ends_with(" 950 us"));
        assert!(lines[2].ends_with(" 1.45 ms"));
        assert!(lines[3].starts_with("Thoughput Variance ") && lines[3].ends_with(" 0.02%"));

        let mut buf = String::new();
        {
            let mut out: Box<dyn Write> = Box::new(&mut buf);
            job.format(&mut out, &result, true).unwrap();
        }
        let lines: Vec<&str> = buf.lines().collect();
        assert_eq!(lines.len(), 12);
        assert!(lines[0].starts_with("Throughput: Run 1 ") && lines[0].ends_with(" 100000.50 ops/sec"));
        assert_eq!(lines[3], "-".repeat(79));
        assert!(lines[8].starts_with("Throughput: Median "));
    }
}
