//! Open vSwitch control through `ovs-vsctl`.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::SwitchControl;
use crate::error::PlatformError;
use crate::vlan::PortSetting;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Pushes port attributes with `ovs-vsctl set port <port> <column>=<value>`.
#[derive(Debug, Clone)]
pub struct VsctlSwitchControl {
    program: PathBuf,
}

impl Default for VsctlSwitchControl {
    fn default() -> Self {
        Self::new()
    }
}

impl VsctlSwitchControl {
    pub fn new() -> Self {
        Self::with_program("ovs-vsctl")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        VsctlSwitchControl {
            program: program.into(),
        }
    }

    /// Arguments for one attribute assignment.
    pub fn args(port: &str, setting: &PortSetting) -> Vec<String> {
        vec!["set".to_string(), "port".to_string(), port.to_string(), setting.assignment()]
    }
}

impl SwitchControl for VsctlSwitchControl {
    fn set_port(
        &mut self,
        switch: &str,
        port: &str,
        setting: &PortSetting,
        timeout: Duration,
    ) -> Result<(), PlatformError> {
        let args = Self::args(port, setting);
        debug!("{}: {} {}", switch, self.program.display(), args.join(" "));
        let mut command = Command::new(&self.program);
        command.args(&args);
        run_with_timeout(&mut command, timeout)?;
        Ok(())
    }
}

/// Run `command` to completion, killing it if it outlives `timeout`.
///
/// Both pipes are drained on their own threads so a chatty child cannot
/// block on a full pipe. Returns stdout on success.
pub(crate) fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<String, PlatformError> {
    let display = format!("{:?}", command);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| PlatformError::Unavailable(format!("cannot start {}: {}", display, e)))?;

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                if let Err(e) = child.kill() {
                    warn!("Failed to kill {} after {:?}: {}", display, timeout, e);
                }
                if let Err(e) = child.wait() {
                    warn!("Failed to reap {}: {}", display, e);
                }
                // readers finish once the pipes close; nothing waits on them
                return Err(PlatformError::Timeout(timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(PlatformError::Unavailable(format!("waiting on {}: {}", display, e))),
        }
    };

    let stdout = join_reader(stdout);
    let stderr = join_reader(stderr);
    if !status.success() {
        return Err(PlatformError::CommandFailed {
            command: display,
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(stdout)
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_string(&mut text) {
                warn!("Failed to read child output: {}", e);
            }
        }
        text
    })
}

fn join_reader(reader: JoinHandle<String>) -> String {
    reader.join().unwrap_or_else(|_| {
        warn!("Output reader thread panicked");
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vlan::{VlanId, VlanMode};

    #[test]
    fn test_args() {
        let trunks = PortSetting::Trunks(vec![VlanId::new(4).unwrap(), VlanId::new(9).unwrap()]);
        assert_eq!(VsctlSwitchControl::args("s0-eth1", &trunks), vec!["set", "port", "s0-eth1", "trunks=4,9"]);
        let mode = PortSetting::Mode(VlanMode::NativeTagged);
        assert_eq!(VsctlSwitchControl::args("s2-eth3", &mode)[3], "vlan_mode=native-tagged");
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let mut control = VsctlSwitchControl::with_program("/nonexistent/ovs-vsctl");
        let err = control
            .set_port("s0", "s0-eth1", &PortSetting::Mode(VlanMode::Access), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, PlatformError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_timeout() {
        let out = run_with_timeout(Command::new("sh").args(["-c", "echo ok"]), Duration::from_secs(5)).unwrap();
        assert_eq!(out.trim(), "ok");

        let err = run_with_timeout(Command::new("sh").args(["-c", "echo bad >&2; exit 3"]), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, PlatformError::CommandFailed { ref stderr, .. } if stderr == "bad"));

        let err = run_with_timeout(Command::new("sleep").arg("5"), Duration::from_millis(100)).unwrap_err();
        assert_eq!(err, PlatformError::Timeout(Duration::from_millis(100)));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_larger_than_pipe_buffer() {
        let out = run_with_timeout(
            Command::new("sh").args(["-c", "head -c 200000 /dev/zero | tr '\\0' a"]),
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(out.len(), 200_000);
        assert!(out.bytes().all(|b| b == b'a'));

        let err = run_with_timeout(
            Command::new("sh").args(["-c", "head -c 200000 /dev/zero | tr '\\0' e >&2; exit 1"]),
            Duration::from_secs(10),
        )
        .unwrap_err();
        assert!(matches!(err, PlatformError::CommandFailed { ref stderr, .. } if stderr.len() == 200_000));
    }
}
