// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;
use std::thread::spawn;

const DFL_CONTAINERS: u32 = 100;
const DOCKERD_PIDFILE: &str = "/tmp/docker.pid";
const DOCKERD_SETTLE: Duration = Duration::from_secs(20);
const RUN_SETTLE: Duration = Duration::from_secs(10);
const IMAGE: &str = "compile_kernel";
const ULIMIT: &str = "--ulimit nofile=1048576:1048576";
const DOCKERFILE: &str = include_str!("../../provided/Dockerfile");
const TITLE: &str = "Linux Kernel Compilation: Average";

pub struct DockerBench {}

impl Bench for DockerBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new("docker", "Docker")
            .header(
                "Compilation performance with up to 100 containers using Docker. \
                 More containers and lower time is better.",
            )
            .placeholders(&[TITLE])
    }

    fn parse(&self, spec: &JobSpec) -> Result<Box<dyn Job>> {
        let mut job = DockerJob {
            containers: DFL_CONTAINERS,
        };
        for (k, v) in spec.props[0].iter() {
            match k.as_str() {
                "containers" => match v.parse::<u32>()? {
                    0 => bail!("containers must be positive"),
                    v => job.containers = v,
                },
                k => bail!("unknown property key {:?}", k),
            }
        }
        Ok(Box::new(job))
    }
}

struct DockerJob {
    containers: u32,
}

/// A container prints the seconds its kernel build took. Anything else
/// means it didn't finish.
fn parse_time(output: &str) -> Option<f64> {
    output.trim().parse::<f64>().ok()
}

impl DockerJob {
    fn env(rctx: &RunCtx) -> Vec<(String, String)> {
        vec![
            env_prepend("PATH", &rctx.src("docker").to_string_lossy()),
            env_set("CFLAGS", &rctx.cflags()),
        ]
    }

    fn start_dockerd(rctx: &RunCtx, env: &[(String, String)]) -> Result<Daemon> {
        let dir = rctx.src("docker");
        let dockerd = dir.join("dockerd");
        if !dockerd.exists() {
            return Err(BenchError::MissingFile(dockerd)).context("Docker directory not found");
        }
        let data_root = rctx.src("docker-data");
        fs::create_dir_all(&data_root)?;
        Daemon::start(
            "dockerd",
            &format!(
                "{} --pidfile {} --data-root {}",
                dockerd.display(),
                DOCKERD_PIDFILE,
                data_root.display()
            ),
            DOCKERD_PIDFILE,
            &dir,
            env,
            DOCKERD_SETTLE,
        )
    }

    fn image_built(rctx: &RunCtx, env: &[(String, String)]) -> Result<bool> {
        let output = shell_output("docker images", Some(&rctx.src("docker")), env)?;
        Ok(!grep_text(&output, IMAGE)?.is_empty())
    }

    /// Remove every container, stopping the running ones first if `stop`.
    fn remove_containers(rctx: &RunCtx, env: &[(String, String)], stop: bool) {
        let dir = rctx.src("docker");
        let docker = dir.join("docker").display().to_string();
        let res = shell_output(&format!("{} ps -a -q", &docker), Some(&dir), env).and_then(
            |containers| {
                if containers.trim().is_empty() {
                    return Ok(());
                }
                if stop {
                    shell_output(
                        &format!("{0} stop $({0} ps -a -q)", &docker),
                        Some(&dir),
                        env,
                    )?;
                }
                shell_output(&format!("{0} rm $({0} ps -a -q)", &docker), Some(&dir), env)?;
                Ok(())
            },
        );
        if let Err(e) = res {
            debug!("docker: Failed to remove containers ({:#})", &e);
        }
    }
}

impl Job for DockerJob {
    fn setup(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let archive = format!("docker-{}-ce.tgz", &rctx.versions.docker);
        let dir = Source::new(
            "Docker",
            &format!(
                "https://download.docker.com/linux/static/stable/x86_64/{}",
                &archive
            ),
            &archive,
            "docker",
            "docker",
        )
        .prepare(rctx)?;

        let dockerfile = dir.join("Dockerfile");
        if !dockerfile.exists() {
            write_file(&dockerfile, DOCKERFILE, false)?;
        }

        let linux = rctx.versions.linux.clone();
        let url = format!(
            "http://www.kernel.org/pub/linux/kernel/v{}.x/linux-{}.tar.gz",
            ver_prefix(&linux, 1),
            &linux
        );
        let cmd = format!(
            "docker build --build-arg cores={} --build-arg cflags=\"{}\" {} \
             --build-arg url={} --build-arg version={} -t {} {}",
            rctx.nr_cores(),
            rctx.cflags(),
            ULIMIT,
            &url,
            &linux,
            IMAGE,
            dir.display()
        );
        rctx.record_cmd(&format!("Build: {}", &cmd));

        let env = Self::env(rctx);
        rctx.set_status("Starting the Docker daemon");
        let _dockerd = Self::start_dockerd(rctx, &env)?;

        // Containers need more addresses than the default bridge hands out.
        if find_bin("ifconfig", Option::<&str>::None).is_some() {
            shell_output_lenient(
                "ifconfig docker0 down && ifconfig docker0 172.17.0.1/16 up",
                None,
                &[],
            )?;
        }

        if !Self::image_built(rctx, &env)? {
            info!("docker: Building the {} image", IMAGE);
            rctx.set_status("Building the image");
            let output = shell_output_lenient(&cmd, Some(&dir), &env)?;
            debug!("docker: Build output:\n{}", output.trim_end());
            if !Self::image_built(rctx, &env)? {
                bail!("Docker image {:?} failed to build", IMAGE);
            }
        }
        info!("docker: {} image built", IMAGE);
        Ok(())
    }

    fn run(&mut self, rctx: &mut RunCtx) -> Result<serde_json::Value> {
        let dir = rctx.src("docker");
        let out_dir = rctx.job_dir("docker")?;
        let dockerfile = dir.join("Dockerfile");
        if dockerfile.exists() {
            fs::copy(&dockerfile, out_dir.join("Dockerfile"))?;
        }

        let env = Self::env(rctx);
        rctx.set_status("Starting the Docker daemon");
        let dockerd = Self::start_dockerd(rctx, &env)?;
        if !Self::image_built(rctx, &env)? {
            bail!("Docker image {:?} not found", IMAGE);
        }

        Self::remove_containers(rctx, &env, false);
        rctx.prerun()?;
        sleep_unless_exiting(RUN_SETTLE)?;

        let (cores, cflags) = (rctx.nr_cores(), rctx.cflags());
        let docker = dir.join("docker").display().to_string();
        let run_cmd = |idx: u32| {
            format!(
                "{} run {} -e \"cores={}\" -e \"cflags={}\" --name {}_test{} {}",
                &docker, ULIMIT, cores, &cflags, IMAGE, idx, IMAGE
            )
        };
        rctx.record_cmd(&format!("Run: {}", run_cmd(0)));
        info!("docker: Starting {} containers", self.containers);
        rctx.set_status(&format!("Compiling in {} containers", self.containers));

        let jhs: Vec<_> = (0..self.containers)
            .map(|idx| {
                let (cmd, dir, env) = (run_cmd(idx), dir.clone(), env.clone());
                spawn(move || shell_output_lenient(&cmd, Some(&dir), &env))
            })
            .collect();

        let times_path = out_dir.join("times.txt");
        let mut times = vec![];
        for (idx, jh) in jhs.into_iter().enumerate() {
            let output = match jh.join() {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    warn!("docker: Container {} failed ({:#})", idx, &e);
                    continue;
                }
                Err(_) => {
                    warn!("docker: Container {} thread panicked", idx);
                    continue;
                }
            };
            match parse_time(&output) {
                Some(time) => {
                    write_file(&times_path, &format!("{}\n", time), true)?;
                    times.push(time);
                }
                None => debug!(
                    "docker: Container {} failed to finish:\n{}",
                    idx,
                    output.trim_end()
                ),
            }
        }

        Self::remove_containers(rctx, &env, true);
        drop(dockerd);

        if times.is_empty() {
            bail!(BenchError::NoResult("container time".into()));
        }
        info!(
            "docker: {}/{} containers finished",
            times.len(),
            self.containers
        );
        let mut result = serde_json::Map::new();
        result.insert("unit".into(), json!("s"));
        result.insert("times".into(), json!(&times));
        insert_summary(&mut result, &times);
        Ok(serde_json::Value::Object(result))
    }

    fn format<'a>(
        &self,
        out: &mut Box<dyn Write + 'a>,
        result: &serde_json::Value,
        _full: bool,
    ) -> Result<()> {
        let count = result["times"]
            .as_array()
            .ok_or_else(|| anyhow!("no container times"))?
            .len();
        let average = result["average"]
            .as_f64()
            .ok_or_else(|| anyhow!("no average"))?;
        let value = format!("{} Containers @ {:.2}", count, average);
        let value = match unit_of(result) {
            "" => value,
            unit => format!("{} {}", value, unit),
        };
        write!(out, "{}", row(TITLE, &value))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("612.48\n"), Some(612.48));
        assert_eq!(parse_time("  85\n"), Some(85.0));
        assert_eq!(parse_time("make: *** [vmlinux] Error 2\n"), None);
        assert_eq!(parse_time(""), None);
    }

    #[test]
    fn test_parse() {
        let mut spec = JobSpec::dfl("docker");
        spec.props[0].insert("containers".into(), "20".into());
        assert!(DockerBench {}.parse(&spec).is_ok());
        spec.props[0].insert("containers".into(), "0".into());
        assert!(DockerBench {}.parse(&spec).is_err());
    }

    #[test]
    fn test_format() {
        let job = DockerJob { containers: 3 };
        let result = json!({
            "unit": "s", "times": [600.0, 610.0, 620.5],
            "average": 610.1666, "median": 610.0, "variance": 105.0, "range": 20.5,
        });
        let mut buf = String::new();
        {
            let mut out: Box<dyn Write> = Box::new(&mut buf);
            job.format(&mut out, &result, true).unwrap();
        }
        assert!(buf.starts_with("Linux Kernel Compilation: Average "));
        assert!(buf.ends_with(" 3 Containers @ 610.17 s\n"));
        assert_eq!(buf.len(), 80);

        let mut buf = String::new();
        {
            let mut out: Box<dyn Write> = Box::new(&mut buf);
            assert!(job.format(&mut out, &json!({"unit": "s"}), false).is_err());
        }
    }
}
