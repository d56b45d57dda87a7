//! Post-deployment validation: default pool creation and health polling.
//!
//! Health is read from the plain-text `ceph -s` report. The poll first waits
//! for placement groups to settle (nothing peering, activating, or creating,
//! and at least one `active+clean`), then compares OSD and monitor counts
//! with what the inventory deployed.

use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::error::{Result, RolloverError};
use crate::node::{CephNode, RemoteCommand};

const PENDING_PG_STATES: &[&str] = &["peering", "activating", "creating"];

const OSD_COUNTS: &str = r"(\d+)\s+osds:\s+(\d+)\s+up(?:\s+\([^)]*\))?,\s+(\d+)\s+in";
const MON_QUORUM: &str = r"(\d+)\s+daemons,\s+quorum";
const MON_MAP: &str = r"(\d+)\s+mons\s+at";

/// Counts the deployment is expected to reach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedCluster {
    pub num_osds: usize,
    pub num_mons: usize,
}

/// What one `ceph -s` report says
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub health_err: bool,
    pub pgs_pending: bool,
    pub active_clean: bool,
    /// `(total, up, in)`
    pub osds: Option<(usize, usize, usize)>,
    pub mons: Option<usize>,
}

impl HealthReport {
    pub fn pgs_settled(&self) -> bool {
        !self.pgs_pending && self.active_clean
    }

    /// Reasons the report does not match `expected`; empty when healthy.
    /// The overall health flag is not consulted, only daemon counts.
    pub fn problems(&self, expected: ExpectedCluster) -> Vec<String> {
        let mut problems = Vec::new();
        match self.osds {
            Some((total, up, inn)) => {
                if total != expected.num_osds {
                    problems.push(format!(
                        "expected {} osds, cluster has {}",
                        expected.num_osds, total
                    ));
                }
                if up != inn {
                    problems.push(format!("{} osds up but {} in", up, inn));
                }
            }
            None => problems.push("no osd summary in status".to_string()),
        }
        match self.mons {
            Some(mons) if mons != expected.num_mons => problems.push(format!(
                "expected {} monitors in quorum, found {}",
                expected.num_mons, mons
            )),
            Some(_) => {}
            None => problems.push("no monitor summary in status".to_string()),
        }
        problems
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| RolloverError::health(format!("bad status pattern: {}", e)))
}

fn capture_count(re: &Regex, text: &str) -> Option<Vec<usize>> {
    let caps = re.captures(text)?;
    caps.iter()
        .skip(1)
        .map(|m| m.and_then(|m| m.as_str().parse().ok()))
        .collect()
}

/// Parse the text output of `ceph -s`.
pub fn parse_status(text: &str) -> Result<HealthReport> {
    let osd_counts = compile(OSD_COUNTS)?;
    let quorum = compile(MON_QUORUM)?;
    let monmap = compile(MON_MAP)?;

    let osds = capture_count(&osd_counts, text).and_then(|c| match c.as_slice() {
        [total, up, inn] => Some((*total, *up, *inn)),
        _ => None,
    });
    let mons = capture_count(&quorum, text)
        .or_else(|| capture_count(&monmap, text))
        .and_then(|c| c.first().copied());

    Ok(HealthReport {
        health_err: text.contains("HEALTH_ERR"),
        pgs_pending: PENDING_PG_STATES.iter().any(|s| text.contains(s)),
        active_clean: text.contains("active+clean"),
        osds,
        mons,
    })
}

/// Build a `ceph` invocation for the mon node, inside its container when the
/// deployment is containerized.
pub fn ceph_command(mon: &dyn CephNode, containerized: bool, args: &str) -> RemoteCommand {
    if containerized {
        RemoteCommand::sudo(format!("docker exec ceph-mon-{} ceph {}", mon.hostname(), args))
    } else {
        RemoteCommand::sudo(format!("ceph {}", args))
    }
}

/// Create the `rbd` pool and tag it for rbd use.
pub fn create_default_pool(mon: &dyn CephNode, containerized: bool) -> Result<()> {
    mon.exec_command(&ceph_command(mon, containerized, "osd pool create rbd 64 64"))?;
    mon.exec_command(&ceph_command(
        mon,
        containerized,
        "osd pool application enable rbd rbd --yes-i-really-mean-it",
    ))?;
    Ok(())
}

/// Poll `ceph -s` until placement groups settle, then check counts.
///
/// Returns `Ok(false)` when the timeout passes first or the settled cluster
/// does not match `expected`. At least one status is always taken.
pub fn check_ceph_healthy(
    mon: &dyn CephNode,
    expected: ExpectedCluster,
    containerized: bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<bool> {
    // ceph -s fails outright while the monitors are still electing
    let status = ceph_command(mon, containerized, "-s").unchecked();
    let started = Instant::now();
    let mut attempt = 0u32;

    let report = loop {
        attempt += 1;
        let out = mon.exec_command(&status)?;
        if out.success() {
            let report = parse_status(&out.stdout)?;
            if report.pgs_settled() {
                break report;
            }
        } else {
            log::warn!(
                "ceph -s exited {} on {}: {}",
                out.exit_code,
                mon.shortname(),
                out.stderr.trim()
            );
        }
        if started.elapsed() >= timeout {
            log::error!(
                "Placement groups did not settle within {}s ({} polls)",
                timeout.as_secs(),
                attempt
            );
            log::error!("Last status:\n{}{}", out.stdout, out.stderr);
            return Ok(false);
        }
        log::info!("Waiting for placement groups to settle (poll {})", attempt);
        thread::sleep(poll_interval);
    };

    if report.health_err {
        log::warn!("Cluster reports HEALTH_ERR; judging by daemon counts only");
    }
    let problems = report.problems(expected);
    if problems.is_empty() {
        log::info!(
            "Cluster healthy: {} osds, {} monitors in quorum",
            expected.num_osds,
            expected.num_mons
        );
        return Ok(true);
    }
    for problem in &problems {
        log::error!("Health check: {}", problem);
    }
    Ok(false)
}
