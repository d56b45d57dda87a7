//! Playbook staging and execution on the installer node.

use crate::config::AnsibleVars;
use crate::error::Result;
use crate::node::{CephNode, RemoteCommand};
use crate::types::PkgType;

pub fn hosts_path(ansible_dir: &str) -> String {
    format!("{}/hosts", ansible_dir)
}

pub fn group_vars_path(ansible_dir: &str) -> String {
    format!("{}/group_vars/all.yml", ansible_dir)
}

/// Write the rendered inventory to `<ansible_dir>/hosts`.
pub fn write_inventory(installer: &dyn CephNode, ansible_dir: &str, hosts: &str) -> Result<()> {
    log::info!("Generated hosts file:\n{}", hosts);
    installer.write_file(&hosts_path(ansible_dir), hosts, true)
}

/// Put the bundled sample playbook in place as `site.yml`.
pub fn install_site_playbook(
    installer: &dyn CephNode,
    ansible_dir: &str,
    containerized: bool,
) -> Result<()> {
    let sample = if containerized {
        "site-docker.yml.sample"
    } else {
        "site.yml.sample"
    };
    installer.exec_command(&RemoteCommand::sudo(format!(
        "cp -R {dir}/{sample} {dir}/site.yml",
        dir = ansible_dir,
        sample = sample
    )))?;
    Ok(())
}

/// Write the group variables, defaulting the fetch directory first.
pub fn write_group_vars(
    installer: &dyn CephNode,
    ansible_dir: &str,
    vars: &AnsibleVars,
) -> Result<()> {
    let mut vars = vars.clone();
    vars.normalize_fetch_directory();
    let text = vars.to_yaml()?;
    log::info!("global vars\n{}", text);
    installer.write_file(&group_vars_path(ansible_dir), &text, true)
}

/// Log which ceph packages the installer node can see. Informational only.
pub fn log_ceph_versions(installer: &dyn CephNode) -> Result<()> {
    let query = match installer.pkg_type() {
        PkgType::Rpm => RemoteCommand::new("rpm -qa | grep ceph"),
        PkgType::Deb => RemoteCommand::sudo("apt-cache search ceph"),
    };
    let out = installer.exec_command(&query.unchecked())?;
    log::info!("Ceph versions\n{}", out.stdout.trim_end());
    Ok(())
}

pub fn playbook_command(ansible_dir: &str) -> RemoteCommand {
    RemoteCommand::new(format!(
        "cd {} ; ANSIBLE_STDOUT_CALLBACK=debug; ansible-playbook -vv -i hosts site.yml",
        ansible_dir
    ))
    .long_running()
    .unchecked()
}

/// Run `site.yml` against the inventory and return the playbook's exit code.
pub fn run_playbook(installer: &dyn CephNode, ansible_dir: &str) -> Result<i32> {
    let out = installer.exec_command(&playbook_command(ansible_dir))?;
    if !out.success() {
        log::error!("Failed during deployment (exit code {})", out.exit_code);
        if !out.stderr.trim().is_empty() {
            log::error!("{}", out.stderr.trim_end());
        }
    }
    Ok(out.exit_code)
}
