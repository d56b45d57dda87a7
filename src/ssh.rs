//! SSH-backed node.
//!
//! Commands run through the local OpenSSH client in batch mode. Each session
//! is a child process leading its own group, held open as a `LiveSession`
//! for the lifetime of the command.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, Output, Stdio};
use std::thread;

use crate::config::NodeSpec;
use crate::error::{Result, RolloverError};
use crate::node::{CephNode, CommandOutput, RemoteCommand};
use crate::process_guard::{LiveSession, SessionCommand};
use crate::types::{NodeVolume, PkgType, RoleSet};

/// Seconds before an idle, non-long-running session is considered dead
const SERVER_ALIVE_INTERVAL: u32 = 30;
const SERVER_ALIVE_COUNT_MAX: u32 = 10;

/// A test node reached over ssh
#[derive(Debug, Clone)]
pub struct SshNode {
    hostname: String,
    shortname: String,
    ip_address: String,
    username: Option<String>,
    port: Option<u16>,
    pkg_type: PkgType,
    roles: RoleSet,
    eth_interface: Option<String>,
    volumes: Vec<NodeVolume>,
}

impl SshNode {
    pub fn from_spec(spec: &NodeSpec) -> Self {
        Self {
            hostname: spec.hostname.clone(),
            shortname: spec.shortname.clone(),
            ip_address: spec.ip_address.clone(),
            username: spec.username.clone(),
            port: spec.ssh_port,
            pkg_type: spec.pkg_type,
            roles: spec.roles.clone(),
            eth_interface: spec.eth_interface.clone(),
            volumes: spec.initial_volumes(),
        }
    }

    fn destination(&self) -> String {
        match &self.username {
            Some(user) => format!("{}@{}", user, self.ip_address),
            None => self.ip_address.clone(),
        }
    }

    /// Base `ssh` invocation; the remote command line is appended by callers.
    fn ssh_command(&self, long_running: bool) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=no"]);
        if !long_running {
            cmd.args([
                "-o".to_string(),
                format!("ServerAliveInterval={}", SERVER_ALIVE_INTERVAL),
                "-o".to_string(),
                format!("ServerAliveCountMax={}", SERVER_ALIVE_COUNT_MAX),
            ]);
        }
        if let Some(port) = self.port {
            cmd.args(["-p".to_string(), port.to_string()]);
        }
        cmd.arg(self.destination());
        cmd
    }

    /// Spawn `cmd`, optionally feeding `input` on stdin, and collect its
    /// output. `label` is the remote command line, kept in the session
    /// registry while the child runs. With `stream`, stdout is logged line
    /// by line as it arrives.
    fn run_session(
        &self,
        mut cmd: Command,
        label: &str,
        input: Option<&str>,
        stream: bool,
    ) -> Result<CommandOutput> {
        cmd.stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .as_session_leader();

        let mut child = cmd
            .spawn()
            .map_err(|e| RolloverError::transport(&self.shortname, format!("failed to spawn ssh: {}", e)))?;
        let _session = LiveSession::open(child.id(), &self.shortname, label);

        // stdin is dropped at the end of this block, which closes the remote tee
        let written = match (input, child.stdin.take()) {
            (Some(data), Some(mut stdin)) => stdin
                .write_all(data.as_bytes())
                .and_then(|_| stdin.flush()),
            _ => Ok(()),
        };

        let output = if stream {
            self.stream_output(child)
        } else {
            child.wait_with_output()
        };

        written?;
        let output = output?;
        // ssh reports its own failures (unreachable host, auth) as 255
        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code == 255 {
            return Err(RolloverError::transport(
                &self.shortname,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
        })
    }

    /// Log stdout lines while the child runs; stderr is drained on a
    /// separate thread so neither pipe can fill up.
    fn stream_output(&self, mut child: Child) -> std::io::Result<Output> {
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });

        let mut stdout = Vec::new();
        if let Some(pipe) = child.stdout.take() {
            for line in BufReader::new(pipe).split(b'\n').map_while(|l| l.ok()) {
                log::info!("[{}] {}", self.shortname, String::from_utf8_lossy(&line));
                stdout.extend_from_slice(&line);
                stdout.push(b'\n');
            }
        }

        let status = child.wait()?;
        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        Ok(Output {
            status,
            stdout,
            stderr,
        })
    }
}

impl CephNode for SshNode {
    fn shortname(&self) -> &str {
        &self.shortname
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn ip_address(&self) -> &str {
        &self.ip_address
    }

    fn pkg_type(&self) -> PkgType {
        self.pkg_type
    }

    fn roles(&self) -> &RoleSet {
        &self.roles
    }

    fn roles_mut(&mut self) -> &mut RoleSet {
        &mut self.roles
    }

    fn eth_interface(&self) -> Option<&str> {
        self.eth_interface.as_deref()
    }

    fn set_eth_interface(&mut self, iface: &str) {
        self.eth_interface = Some(iface.to_string());
    }

    fn volumes(&self) -> &[NodeVolume] {
        &self.volumes
    }

    fn volumes_mut(&mut self) -> &mut [NodeVolume] {
        &mut self.volumes
    }

    fn exec(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        let line = command.command_line();
        let mut cmd = self.ssh_command(command.long_running);
        cmd.arg(&line);
        // Playbook output is the test log, so it is logged while it runs
        self.run_session(cmd, &line, None, command.long_running)
    }

    fn write_file(&self, path: &str, contents: &str, sudo: bool) -> Result<()> {
        let tee = if sudo {
            format!("sudo tee {} > /dev/null", path)
        } else {
            format!("tee {} > /dev/null", path)
        };
        let mut cmd = self.ssh_command(false);
        cmd.arg(&tee);
        let output = self.run_session(cmd, &tee, Some(contents), false)?;
        if !output.success() {
            return Err(RolloverError::CommandFailed {
                node: self.shortname.clone(),
                command: tee,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn spec() -> NodeSpec {
        NodeSpec {
            hostname: "node1.example.com".to_string(),
            shortname: "node1".to_string(),
            ip_address: "10.0.0.1".to_string(),
            roles: RoleSet::from([Role::Osd]),
            pkg_type: PkgType::Deb,
            volumes: 3,
            username: Some("cephuser".to_string()),
            ssh_port: Some(2222),
            eth_interface: None,
        }
    }

    #[test]
    fn test_from_spec() {
        let node = SshNode::from_spec(&spec());
        assert_eq!(node.shortname(), "node1");
        assert_eq!(node.allocated_volume_count(), 3);
        assert_eq!(node.pkg_type(), PkgType::Deb);
        assert!(node.has_role(Role::Osd));
        assert_eq!(node.destination(), "cephuser@10.0.0.1");
    }

    #[test]
    fn test_ssh_command_arguments() {
        let node = SshNode::from_spec(&spec());
        let cmd = node.ssh_command(true);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"2222".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("cephuser@10.0.0.1"));
        assert!(!args.iter().any(|a| a.starts_with("ServerAliveInterval")));
    }

    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn test_streamed_session_keeps_output() {
        let node = SshNode::from_spec(&spec());
        let output = node
            .run_session(shell("echo one; echo two >&2; echo three; exit 4"), "sh", None, true)
            .expect("session runs");
        assert_eq!(output.stdout, "one\nthree\n");
        assert_eq!(output.stderr, "two\n");
        assert_eq!(output.exit_code, 4);
    }

    #[test]
    fn test_session_feeds_stdin() {
        let node = SshNode::from_spec(&spec());
        let output = node
            .run_session(shell("cat"), "cat", Some("contents\n"), false)
            .expect("session runs");
        assert_eq!(output.stdout, "contents\n");
        assert!(output.success());
    }

    #[test]
    fn test_exit_255_is_a_transport_error() {
        let node = SshNode::from_spec(&spec());
        let err = node
            .run_session(shell("echo refused >&2; exit 255"), "sh", None, false)
            .expect_err("255 is ssh's own failure");
        assert!(matches!(err, RolloverError::Transport { .. }));
    }
}
