// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Context, Result};
use crossbeam::channel::{self, Sender};
use log::{debug, warn};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{sleep, spawn};
use std::time::{Duration, Instant};

/// A shell command which ran but exited with an error. The combined output
/// is kept so that callers can report or inspect it.
#[derive(Debug, thiserror::Error)]
#[error("{:?} failed ({}): {}", .cmd, .status, tail(.output))]
pub struct ShellError {
    pub cmd: String,
    pub status: ExitStatus,
    pub output: String,
}

fn tail(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    lines[lines.len().saturating_sub(3)..].join(" / ")
}

fn shell_command(cmd: &str, cwd: Option<&Path>, env: &[(String, String)]) -> Command {
    let mut command = Command::new("bash");
    command.arg("-c").arg(cmd);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    for (k, v) in env.iter() {
        command.env(k, v);
    }
    command
}

/// Forward `pipe` line by line. Bytes which aren't valid UTF-8 are replaced
/// so that the rest of the output still comes through.
fn child_reader_thread<R: Read>(name: String, pipe: R, tx: Sender<String>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = vec![];
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).to_string();
                if let Err(e) = tx.send(line) {
                    debug!("{}: Reader thread terminating ({:?})", &name, &e);
                    break;
                }
            }
            Err(e) => {
                warn!("{}: Failed to read output ({:?})", &name, &e);
                break;
            }
        }
    }
}

/// Run `cmd` through bash and return stdout and stderr interleaved in the
/// order the lines arrived.
pub fn shell_output(cmd: &str, cwd: Option<&Path>, env: &[(String, String)]) -> Result<String> {
    debug!("exec: {} (cwd={:?})", cmd, cwd);

    let mut child = shell_command(cmd, cwd, env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start {:?}", cmd))?;

    let (tx, rx) = channel::unbounded::<String>();
    let mut jhs = vec![];
    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        jhs.push(spawn(move || child_reader_thread("stdout".into(), stdout, tx)));
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        jhs.push(spawn(move || child_reader_thread("stderr".into(), stderr, tx)));
    }
    drop(tx);

    let mut output = String::new();
    for line in rx.iter() {
        debug!("  | {}", &line);
        output += &line;
        output += "\n";
    }
    for jh in jhs.into_iter() {
        let _ = jh.join();
    }

    let status = child.wait()?;
    if !status.success() {
        return Err(ShellError {
            cmd: cmd.to_string(),
            status,
            output,
        }
        .into());
    }
    Ok(output)
}

/// Like `shell_output()` but a non-zero exit status is only logged and the
/// output is returned anyway. The caller checks the artifacts instead.
pub fn shell_output_lenient(
    cmd: &str,
    cwd: Option<&Path>,
    env: &[(String, String)],
) -> Result<String> {
    match shell_output(cmd, cwd, env) {
        Ok(output) => Ok(output),
        Err(e) => match e.downcast::<ShellError>() {
            Ok(se) => {
                warn!("exec: {:?} exited with {}", &se.cmd, &se.status);
                Ok(se.output)
            }
            Err(e) => Err(e),
        },
    }
}

/// Run `cmd` and return how many seconds it took.
pub fn shell_timed(cmd: &str, cwd: Option<&Path>, env: &[(String, String)]) -> Result<f64> {
    let started_at = Instant::now();
    shell_output(cmd, cwd, env)?;
    Ok(started_at.elapsed().as_secs_f64())
}

/// Start a daemon in the background. The caller owns the child and should
/// `reap_child()` it once the daemon is stopped.
pub fn shell_spawn(cmd: &str, cwd: Option<&Path>, env: &[(String, String)]) -> Result<Child> {
    debug!("spawn: {} (cwd={:?})", cmd, cwd);
    shell_command(cmd, cwd, env)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to start {:?}", cmd))
}

/// Wait up to `timeout` for `child` to exit. A child which is still around
/// after that is SIGKILL'd. Either way it's reaped.
pub fn reap_child(child: &mut Child, timeout: Duration) -> Result<ExitStatus> {
    let until = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= until {
            warn!("exec: {} still running after {:.1}s, killing", child.id(), timeout.as_secs_f64());
            child.kill()?;
            return Ok(child.wait()?);
        }
        sleep(Duration::from_millis(100));
    }
}

/// SIGTERM `pid`. A process which is already gone is not an error.
pub fn kill_pid(pid: i32) -> Result<()> {
    if pid <= 0 {
        bail!("Invalid pid {}", pid);
    }
    if unsafe { libc::kill(pid, libc::SIGTERM) } < 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            bail!("Failed to kill {} ({})", pid, &err);
        }
    }
    Ok(())
}

/// Kill the daemon whose pid is recorded in `path`. Returns whether a pid
/// file was found.
pub fn kill_pidfile<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(false);
    }
    let pid = super::read_one_line(path)?
        .trim()
        .parse::<i32>()
        .with_context(|| format!("Parsing pid file {:?}", path))?;
    debug!("exec: Killing {} from {:?}", pid, path);
    kill_pid(pid)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_output() {
        let out = shell_output("echo out; echo err 1>&2", None, &[]).unwrap();
        assert!(out.contains("out\n"));
        assert!(out.contains("err\n"));

        let env = vec![("SPET_TEST_VAR".to_string(), "42".to_string())];
        let dir = tempfile::tempdir().unwrap();
        let out = shell_output("echo $SPET_TEST_VAR; pwd", Some(dir.path()), &env).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "42");
        assert!(lines[1].ends_with(dir.path().file_name().unwrap().to_str().unwrap()));
    }

    #[test]
    fn test_shell_failure() {
        let err = shell_output("echo partial; exit 3", None, &[]).unwrap_err();
        let se = err.downcast_ref::<ShellError>().unwrap();
        assert_eq!(se.status.code(), Some(3));
        assert_eq!(se.output, "partial\n");
    }

    #[test]
    fn test_shell_output_lenient() {
        let out = shell_output_lenient("echo partial; exit 3", None, &[]).unwrap();
        assert_eq!(out, "partial\n");
        assert_eq!(shell_output_lenient("echo ok", None, &[]).unwrap(), "ok\n");
    }

    #[test]
    fn test_shell_timed() {
        let secs = shell_timed("sleep 0.2", None, &[]).unwrap();
        assert!(secs >= 0.2 && secs < 5.0);
    }

    #[test]
    fn test_kill_pidfile() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("daemon.pid");
        assert!(!kill_pidfile(&pidfile).unwrap());

        let mut child = shell_spawn("exec sleep 30", None, &[]).unwrap();
        crate::write_file(&pidfile, &format!("{}\n", child.id()), false).unwrap();
        assert!(kill_pidfile(&pidfile).unwrap());
        let status = reap_child(&mut child, Duration::from_secs(10)).unwrap();
        assert!(!status.success());
        assert!(!Path::new(&format!("/proc/{}", child.id())).exists());
        assert!(kill_pid(0).is_err());
    }

    #[test]
    fn test_reap_child() {
        let mut child = shell_spawn("exit 0", None, &[]).unwrap();
        assert!(reap_child(&mut child, Duration::from_secs(10)).unwrap().success());

        let started_at = Instant::now();
        let mut child = shell_spawn("exec sleep 30", None, &[]).unwrap();
        let status = reap_child(&mut child, Duration::from_millis(200)).unwrap();
        assert!(!status.success());
        assert!(started_at.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_utf8_output() {
        let out = shell_output(r"printf 'before\n\xff\xfe\nafter\n'", None, &[]).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "before");
        assert_eq!(lines[1], "\u{fffd}\u{fffd}");
        assert_eq!(lines[2], "after");
    }
}
