//! Remote node contract.
//!
//! `CephNode` is the capability set the orchestration needs from a test
//! machine: run a shell command, write a file, and keep role, interface, and
//! volume bookkeeping. `RemoteCommand` is the typed description of one
//! command invocation, in the same spirit as typed script arguments: the
//! struct is the contract, not an ad-hoc argument list.

use crate::error::{Result, RolloverError};
use crate::types::{NodeVolume, PkgType, Role, RoleSet, VolumeStatus};

/// A single command to execute on a remote node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// Shell command line, executed by the remote login shell.
    pub cmd: String,
    /// Run through `sudo`.
    pub sudo: bool,
    /// Command may run for a long time (no output timeout).
    pub long_running: bool,
    /// Treat a non-zero exit code as an error.
    pub check_exit: bool,
}

impl RemoteCommand {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            sudo: false,
            long_running: false,
            check_exit: true,
        }
    }

    /// Shorthand for a checked command run through sudo.
    pub fn sudo(cmd: impl Into<String>) -> Self {
        Self::new(cmd).with_sudo()
    }

    pub fn with_sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }

    /// Return the exit code to the caller instead of failing on non-zero.
    pub fn unchecked(mut self) -> Self {
        self.check_exit = false;
        self
    }

    /// The command line as the remote shell receives it.
    pub fn command_line(&self) -> String {
        if self.sudo && !self.cmd.starts_with("sudo ") {
            format!("sudo {}", self.cmd)
        } else {
            self.cmd.clone()
        }
    }
}

/// Output from a remote command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A test machine taking part in the deployment.
///
/// Implementors provide transport (`exec`, `write_file`) and storage for the
/// bookkeeping fields; the checked execution path and the volume helpers are
/// provided on top of those.
pub trait CephNode {
    /// Short host name, used as the inventory host identifier.
    fn shortname(&self) -> &str;

    /// Fully qualified host name.
    fn hostname(&self) -> &str;

    fn ip_address(&self) -> &str;

    fn pkg_type(&self) -> PkgType;

    fn roles(&self) -> &RoleSet;

    fn roles_mut(&mut self) -> &mut RoleSet;

    fn eth_interface(&self) -> Option<&str>;

    fn set_eth_interface(&mut self, iface: &str);

    fn volumes(&self) -> &[NodeVolume];

    fn volumes_mut(&mut self) -> &mut [NodeVolume];

    /// Execute a command and return its output, whatever the exit code.
    ///
    /// Only transport failures are errors here.
    fn exec(&self, command: &RemoteCommand) -> Result<CommandOutput>;

    /// Write `contents` to `path`; the data is flushed when this returns.
    fn write_file(&self, path: &str, contents: &str, sudo: bool) -> Result<()>;

    /// Execute a command, failing on non-zero exit when the command is checked.
    fn exec_command(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        log::debug!("[{}] {}", self.shortname(), command.command_line());
        let output = self.exec(command)?;
        if command.check_exit && !output.success() {
            return Err(RolloverError::CommandFailed {
                node: self.shortname().to_string(),
                command: command.command_line(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn has_role(&self, role: Role) -> bool {
        self.roles().contains(role)
    }

    fn update_roles(&mut self, roles: &[Role]) {
        self.roles_mut().update(roles);
    }

    fn free_volume_count(&self) -> usize {
        self.volumes().iter().filter(|v| v.is_free()).count()
    }

    fn allocated_volume_count(&self) -> usize {
        self.volumes()
            .iter()
            .filter(|v| v.status == VolumeStatus::Allocated)
            .count()
    }

    /// Allocate `count` free volumes, taking them from the end of the free list.
    fn allocate_volumes(&mut self, count: usize) -> Result<()> {
        let found = self.free_volume_count();
        if count > found {
            return Err(RolloverError::InsufficientVolumes {
                node: self.shortname().to_string(),
                required: count,
                found,
            });
        }
        self.volumes_mut()
            .iter_mut()
            .rev()
            .filter(|v| v.is_free())
            .take(count)
            .for_each(|v| v.status = VolumeStatus::Allocated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_adds_sudo_once() {
        assert_eq!(RemoteCommand::sudo("yum install -y x").command_line(), "sudo yum install -y x");
        assert_eq!(
            RemoteCommand::sudo("sudo apt-get install -y python").command_line(),
            "sudo apt-get install -y python"
        );
        assert_eq!(RemoteCommand::new("ls").command_line(), "ls");
    }

    #[test]
    fn test_builder_flags() {
        let cmd = RemoteCommand::new("ansible-playbook site.yml").long_running().unchecked();
        assert!(cmd.long_running);
        assert!(!cmd.check_exit);
        assert!(!cmd.sudo);
    }
}
