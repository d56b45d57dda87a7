//! In-memory node for dry runs and tests.
//!
//! `FakeNode` never touches the network. Every command and file write is
//! recorded; command results come from scripted responses matched by
//! substring, and default to a successful, empty output.

use std::sync::Mutex;

use crate::config::NodeSpec;
use crate::error::Result;
use crate::node::{CephNode, CommandOutput, RemoteCommand};
use crate::types::{NodeVolume, PkgType, Role, RoleSet};

#[derive(Debug, Clone)]
struct Response {
    pattern: String,
    output: CommandOutput,
    /// `None` answers forever; `Some(n)` answers `n` more times
    remaining: Option<usize>,
}

/// A recording node with scripted command responses
#[derive(Debug)]
pub struct FakeNode {
    hostname: String,
    shortname: String,
    ip_address: String,
    pkg_type: PkgType,
    roles: RoleSet,
    eth_interface: Option<String>,
    volumes: Vec<NodeVolume>,
    responses: Mutex<Vec<Response>>,
    commands: Mutex<Vec<RemoteCommand>>,
    files: Mutex<Vec<(String, String)>>,
}

impl FakeNode {
    pub fn new(shortname: &str, roles: &[Role]) -> Self {
        Self {
            hostname: format!("{}.test.local", shortname),
            shortname: shortname.to_string(),
            ip_address: "127.0.0.1".to_string(),
            pkg_type: PkgType::Rpm,
            roles: RoleSet::from(roles.to_vec()),
            eth_interface: None,
            volumes: Vec::new(),
            responses: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            files: Mutex::new(Vec::new()),
        }
    }

    pub fn from_spec(spec: &NodeSpec) -> Self {
        let mut node = Self::new(&spec.shortname, &[]);
        node.hostname = spec.hostname.clone();
        node.ip_address = spec.ip_address.clone();
        node.pkg_type = spec.pkg_type;
        node.roles = spec.roles.clone();
        node.eth_interface = spec.eth_interface.clone();
        node.volumes = spec.initial_volumes();
        node
    }

    pub fn with_pkg_type(mut self, pkg_type: PkgType) -> Self {
        self.pkg_type = pkg_type;
        self
    }

    pub fn with_volumes(mut self, free: usize) -> Self {
        self.volumes = vec![NodeVolume::free(); free];
        self
    }

    /// Answer commands containing `pattern` with `stdout` and exit code 0.
    pub fn respond(self, pattern: &str, stdout: &str) -> Self {
        self.push_response(pattern, ok_output(stdout), None);
        self
    }

    /// Answer commands containing `pattern` with `exit_code`.
    pub fn fail(self, pattern: &str, exit_code: i32) -> Self {
        self.push_response(
            pattern,
            CommandOutput {
                stdout: String::new(),
                stderr: format!("{} failed", pattern),
                exit_code,
            },
            None,
        );
        self
    }

    /// Fail the next `times` commands containing `pattern` with `exit_code`.
    pub fn fail_times(self, pattern: &str, exit_code: i32, times: usize) -> Self {
        self.push_response(
            pattern,
            CommandOutput {
                stdout: String::new(),
                stderr: format!("{} failed", pattern),
                exit_code,
            },
            Some(times),
        );
        self
    }

    /// Answer the next `times` commands containing `pattern` with `stdout`,
    /// ahead of any permanent response for the same pattern.
    pub fn respond_times(self, pattern: &str, stdout: &str, times: usize) -> Self {
        self.push_response(pattern, ok_output(stdout), Some(times));
        self
    }

    fn push_response(&self, pattern: &str, output: CommandOutput, remaining: Option<usize>) {
        if let Ok(mut responses) = self.responses.lock() {
            let response = Response {
                pattern: pattern.to_string(),
                output,
                remaining,
            };
            // Counted responses take precedence over permanent ones
            if remaining.is_some() {
                responses.insert(0, response);
            } else {
                responses.push(response);
            }
        }
    }

    /// Command lines executed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .map(|c| c.iter().map(RemoteCommand::command_line).collect())
            .unwrap_or_default()
    }

    /// Full command records executed so far, in order.
    pub fn command_records(&self) -> Vec<RemoteCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn ran(&self, fragment: &str) -> bool {
        self.commands().iter().any(|c| c.contains(fragment))
    }

    /// Files written so far as `(path, contents)`, in write order.
    pub fn files(&self) -> Vec<(String, String)> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Last contents written to `path`.
    pub fn file(&self, path: &str) -> Option<String> {
        self.files()
            .into_iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, contents)| contents)
    }
}

fn ok_output(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: 0,
    }
}

impl CephNode for FakeNode {
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
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.clone());
        }

        let line = command.command_line();
        let mut responses = match self.responses.lock() {
            Ok(responses) => responses,
            Err(_) => return Ok(ok_output("")),
        };
        let found = responses
            .iter_mut()
            .find(|r| r.remaining != Some(0) && line.contains(&r.pattern));
        let output = match found {
            Some(response) => {
                if let Some(n) = response.remaining.as_mut() {
                    *n -= 1;
                }
                response.output.clone()
            }
            None => ok_output(""),
        };
        Ok(output)
    }

    fn write_file(&self, path: &str, contents: &str, _sudo: bool) -> Result<()> {
        if let Ok(mut files) = self.files.lock() {
            files.push((path.to_string(), contents.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_commands_and_files() {
        let node = FakeNode::new("node1", &[Role::Mon]);
        node.exec_command(&RemoteCommand::sudo("yum install -y ceph-ansible"))
            .expect("default success");
        node.write_file("/tmp/hosts", "[mons]\nnode1", true).expect("write");

        assert_eq!(node.commands(), vec!["sudo yum install -y ceph-ansible"]);
        assert!(node.ran("ceph-ansible"));
        assert_eq!(node.file("/tmp/hosts").as_deref(), Some("[mons]\nnode1"));
    }

    #[test]
    fn test_scripted_failure_is_checked() {
        let node = FakeNode::new("node1", &[]).fail("apt-get", 100);
        let err = node
            .exec_command(&RemoteCommand::sudo("apt-get install -y ntp"))
            .expect_err("checked command fails");
        assert!(err.to_string().contains("exit code 100"));

        let out = node
            .exec_command(&RemoteCommand::sudo("apt-get install -y ntp").unchecked())
            .expect("unchecked command returns output");
        assert_eq!(out.exit_code, 100);
    }

    #[test]
    fn test_counted_responses_run_out() {
        let node = FakeNode::new("node1", &[])
            .respond("ceph -s", "healthy")
            .respond_times("ceph -s", "starting", 2);

        let cmd = RemoteCommand::new("ceph -s");
        let outputs: Vec<String> = (0..3)
            .map(|_| node.exec(&cmd).expect("exec").stdout)
            .collect();
        assert_eq!(outputs, vec!["starting", "starting", "healthy"]);
    }
}
