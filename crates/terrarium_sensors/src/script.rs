//! External script protocol.
//!
//! Script sensors and script relays share one contract. The configured
//! address is a comma separated list: the executable followed by its
//! arguments. The executable must carry one of the permission modes allowed
//! for its role, otherwise binding fails before anything runs.
//!
//! A run that exits non-zero, times out or prints something that is not a
//! float counts as "hardware absent". Printing `-1` means "no fresh reading":
//! sensors keep their previous value and relays keep their previous state.
//!
//! ```no_run
//! # use terrarium_sensors::script::{ScriptCommand, ScriptRole};
//! # use std::time::Duration;
//! let relay = ScriptCommand::load(
//!     "/opt/terrarium/heater.sh, --zone=1",
//!     ScriptRole::Relay,
//!     Duration::from_secs(10),
//! )?;
//! relay.set_state(100)?;
//! let state = relay.read_state(0.0)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{AcquireError, LoadingError};
use crate::types::HardwareType;
use log::debug;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Output meaning "no reading possible right now".
pub const NO_READING: f64 = -1.0;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Who is invoking the script. Decides which permission modes are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptRole {
    Sensor,
    Relay,
}

impl ScriptRole {
    /// Accepted `rwx` permission bits.
    pub fn allowed_modes(&self) -> &'static [u32] {
        match self {
            ScriptRole::Sensor => &[0o777, 0o775, 0o755],
            ScriptRole::Relay => &[
                0o777, 0o775, 0o755, 0o744, 0o544, 0o554, 0o555, 0o550, 0o540, 0o770, 0o750,
                0o740,
            ],
        }
    }
}

/// A validated script invocation.
#[derive(Debug, Clone)]
pub struct ScriptCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ScriptCommand {
    /// Parses `address` and checks the executable.
    ///
    /// # Errors
    ///
    /// [`LoadingError::ScriptNotFound`] when the file does not exist and
    /// [`LoadingError::ScriptNotExecutable`] when its mode is not allowed for
    /// `role`.
    pub fn load(address: &str, role: ScriptRole, timeout: Duration) -> Result<Self, LoadingError> {
        let mut parts = address
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string);

        let program = parts
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| LoadingError::InvalidAddress {
                hardware: HardwareType::Script,
                address: address.to_string(),
                reason: "no executable given".to_string(),
            })?;
        let args: Vec<String> = parts.collect();

        if !program.exists() {
            return Err(LoadingError::ScriptNotFound(program));
        }
        check_mode(&program, role)?;

        Ok(Self {
            program,
            args,
            timeout,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Runs the executable with its configured arguments plus `extra` and
    /// returns the trimmed stdout.
    pub fn run(&self, extra: &[String]) -> Result<String, AcquireError> {
        let mut args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        args.extend(extra.iter().map(String::as_str));
        self.execute(&args)
    }

    /// Runs the executable with its configured arguments and parses the
    /// output as a float.
    pub fn query(&self) -> Result<f64, AcquireError> {
        parse_output(&self.run(&[])?)
    }

    /// Reads a relay state. The executable runs without arguments; the
    /// sentinel maps to `previous`.
    pub fn read_state(&self, previous: f64) -> Result<f64, AcquireError> {
        let value = parse_output(&self.execute(&[])?)?;
        Ok(if value == NO_READING { previous } else { value })
    }

    /// Switches a relay by appending `--value=<state>`.
    pub fn set_state<S: fmt::Display>(&self, state: S) -> Result<(), AcquireError> {
        self.run(&[format!("--value={}", state)]).map(|_| ())
    }

    fn execute(&self, args: &[&str]) -> Result<String, AcquireError> {
        debug!("Running script {} {:?}", self.program.display(), args);

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AcquireError::Absent("script stdout not captured".to_string()))?;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut output = String::new();
            let _ = tx.send(stdout.read_to_string(&mut output).map(|_| output));
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                if let Err(e) = child.kill() {
                    debug!("Could not kill {}: {}", self.program.display(), e);
                }
                let _ = child.wait();
                return Err(AcquireError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            return Err(AcquireError::ScriptFailed {
                code: status.code(),
            });
        }

        // A backgrounded grandchild can hold stdout open past the exit.
        let output = match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(output) => output?,
            Err(RecvTimeoutError::Timeout) => return Err(AcquireError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(AcquireError::Absent("script output reader stopped".to_string()))
            }
        };
        Ok(output.trim().to_string())
    }
}

fn parse_output(output: &str) -> Result<f64, AcquireError> {
    output
        .trim()
        .parse::<f64>()
        .map_err(|_| AcquireError::Parse(output.to_string()))
}

#[cfg(unix)]
fn check_mode(program: &Path, role: ScriptRole) -> Result<(), LoadingError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(program)
        .map_err(|_| LoadingError::ScriptNotFound(program.to_path_buf()))?
        .permissions()
        .mode()
        & 0o777;

    if role.allowed_modes().contains(&mode) {
        Ok(())
    } else {
        Err(LoadingError::ScriptNotExecutable {
            path: program.to_path_buf(),
            mode,
        })
    }
}

#[cfg(not(unix))]
fn check_mode(_program: &Path, _role: ScriptRole) -> Result<(), LoadingError> {
    Ok(())
}
