//! Topology additions.
//!
//! Applies the `add` requests of a test configuration to the provisioned
//! nodes: each request names exactly one node by pattern and lists the
//! daemons it should gain. OSD daemons consume free volumes.

use regex::Regex;

use crate::config::AddRequest;
use crate::error::{Result, RolloverError};
use crate::node::CephNode;

/// Find the single node whose short name matches `pattern`.
///
/// The pattern is anchored at the start of the short name only, so
/// `node1` matches `node1` and `node10`.
pub fn resolve_node<N: CephNode>(nodes: &[N], pattern: &str) -> Result<usize> {
    let anchored = format!("^(?:{})", pattern);
    let matcher = Regex::new(&anchored).map_err(|source| RolloverError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let matched: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| matcher.is_match(node.shortname()))
        .map(|(idx, _)| idx)
        .collect();

    match matched.as_slice() {
        [] => Err(RolloverError::NoMatch {
            pattern: pattern.to_string(),
        }),
        [idx] => Ok(*idx),
        _ => Err(RolloverError::MultipleMatches {
            pattern: pattern.to_string(),
            matches: matched
                .iter()
                .map(|&i| nodes[i].shortname().to_string())
                .collect(),
        }),
    }
}

/// Apply one addition: allocate a volume per requested OSD, then merge the
/// requested daemons into the node's roles.
pub fn apply_addition<N: CephNode>(nodes: &mut [N], request: &AddRequest) -> Result<()> {
    let idx = resolve_node(nodes, &request.node_name)?;
    let node = &mut nodes[idx];

    node.allocate_volumes(request.osds_required())?;
    node.update_roles(&request.daemons);

    log::info!(
        "Added {:?} to {} (roles now {})",
        request.daemons,
        node.shortname(),
        node.roles()
    );
    Ok(())
}

/// Apply all additions in order. The first failure aborts the run.
pub fn apply_additions<'a, N, I>(nodes: &mut [N], requests: I) -> Result<()>
where
    N: CephNode,
    I: IntoIterator<Item = &'a AddRequest>,
{
    for request in requests {
        apply_addition(nodes, request)?;
    }
    Ok(())
}
