use std::{
    ffi::OsStr,
    io::{BufRead, BufReader},
    path::Path,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::{
    executor::{ProcessError, ProcessOutcome},
    shutdown::Shutdown,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs external tools to completion while watching the shutdown flag.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    shutdown: Shutdown,
    grace: Duration,
}

impl ProcessRunner {
    /// `grace` is how long a process gets after SIGTERM before it is killed.
    pub fn new(shutdown: Shutdown, grace: Duration) -> Self {
        Self { shutdown, grace }
    }

    pub fn run<I, S>(&self, program: &Path, args: I) -> Result<ProcessOutcome, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let name = program
            .file_name()
            .unwrap_or(program.as_os_str())
            .to_string_lossy()
            .to_string();

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: name.clone(),
                source,
            })?;

        log::debug!("{} spawned (PID: {})", name, child.id());

        let stderr_handle = child.stderr.take().map(|stderr| {
            let name = name.clone();
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    if !line.is_empty() {
                        log::info!("{}: {}", name, line);
                    }
                }
            })
        });

        let outcome = self.monitor(&mut child, &name)?;
        if let (ProcessOutcome::Exited(_), Some(handle)) = (outcome, stderr_handle) {
            // the pipe is closed once the process is gone
            let _ = handle.join();
        }
        Ok(outcome)
    }

    fn monitor(&self, child: &mut Child, name: &str) -> Result<ProcessOutcome, ProcessError> {
        let wait_err = |source| ProcessError::Wait {
            program: name.to_string(),
            source,
        };
        loop {
            let status = match child.try_wait() {
                Ok(status) => status,
                Err(e) => {
                    abandon(child, name);
                    return Err(wait_err(e));
                }
            };
            if let Some(status) = status {
                let code = status.code().unwrap_or(-1);
                log::debug!("{} completed with exit code: {}", name, code);
                return Ok(ProcessOutcome::Exited(code));
            }
            if self.shutdown.is_triggered() {
                self.terminate(child, name).map_err(wait_err)?;
                return Ok(ProcessOutcome::Cancelled);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// SIGTERM, wait up to the grace period, then SIGKILL.
    fn terminate(&self, child: &mut Child, name: &str) -> std::io::Result<()> {
        log::info!("Stopping {} (PID: {})", name, child.id());
        request_stop(child);

        let deadline = Instant::now() + self.grace;
        while Instant::now() < deadline {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }

        log::warn!(
            "{} did not stop within {:?}, killing it",
            name,
            self.grace
        );
        child.kill()?;
        child.wait()?;
        Ok(())
    }
}

/// Kills and reaps a child whose state can no longer be observed.
fn abandon(child: &mut Child, name: &str) {
    log::error!("Lost track of {} (PID: {}), killing it", name, child.id());
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill {}: {}", child.id(), e);
    }
    let _ = child.wait();
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
        log::warn!("Failed to send SIGTERM to {}: {}", child.id(), e);
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to stop {}: {}", child.id(), e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh() -> &'static Path {
        Path::new("/bin/sh")
    }

    fn runner(shutdown: &Shutdown, grace_ms: u64) -> ProcessRunner {
        ProcessRunner::new(shutdown.clone(), Duration::from_millis(grace_ms))
    }

    #[test]
    fn abandoned_process_is_reaped() {
        let mut child = Command::new(sh()).args(["-c", "sleep 30"]).spawn().unwrap();
        let started = Instant::now();
        abandon(&mut child, "sh");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn reports_exit_code() {
        let shutdown = Shutdown::new();
        let outcome = runner(&shutdown, 1000)
            .run(sh(), ["-c", "echo working >&2; exit 3"])
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Exited(3));
        assert!(!outcome.success());

        let outcome = runner(&shutdown, 1000).run(sh(), ["-c", "true"]).unwrap();
        assert!(outcome.success());
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let shutdown = Shutdown::new();
        let result = runner(&shutdown, 1000).run(Path::new("/nonexistent/meteor_demod"), ["-h"]);
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }

    #[test]
    fn shutdown_terminates_process() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trigger.trigger();
        });

        let outcome = runner(&shutdown, 5000)
            .run(sh(), ["-c", "exec sleep 30"])
            .unwrap();
        handle.join().unwrap();

        assert_eq!(outcome, ProcessOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn stubborn_process_is_killed_after_grace() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            trigger.trigger();
        });

        let outcome = runner(&shutdown, 300)
            .run(sh(), ["-c", "trap '' TERM; exec sleep 30"])
            .unwrap();
        handle.join().unwrap();

        assert_eq!(outcome, ProcessOutcome::Cancelled);
        assert!(started.elapsed() >= Duration::from_millis(600));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
