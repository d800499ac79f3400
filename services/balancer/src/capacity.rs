//! Queue capacity collection from `pbsnodes`.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::tools::{lenient_count, query_json, PbsTools, Tool, ToolError, ToolRunner};

/// Arguments for a JSON dump of every node.
pub const PBSNODES_ARGS: &[&str] = &["-a", "-F", "json"];

/// CPU capacity of one configured queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueCapacity {
    pub name: String,
    /// Sum of the CPUs of every node serving the queue.
    pub total_cpus: i64,
    /// Sum of unassigned CPUs on those nodes. Zero when unknown.
    pub available_cpus: i64,
}

impl QueueCapacity {
    /// Capacity entry with no CPUs, used when live data is missing.
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            total_cpus: 0,
            available_cpus: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodeListing {
    #[serde(default)]
    nodes: HashMap<String, Node>,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    queue: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pcpus: Option<i64>,
    #[serde(default)]
    resources_available: Option<NodeResources>,
    #[serde(default)]
    resources_assigned: Option<NodeResources>,
}

#[derive(Debug, Deserialize)]
struct NodeResources {
    #[serde(default, deserialize_with = "lenient_count")]
    ncpus: Option<i64>,
}

impl Node {
    fn total_cpus(&self) -> i64 {
        self.pcpus
            .or_else(|| self.resources_available.as_ref().and_then(|r| r.ncpus))
            .unwrap_or(0)
    }

    /// Unassigned CPUs, or 0 if either figure is missing.
    fn free_cpus(&self) -> i64 {
        let available = self.resources_available.as_ref().and_then(|r| r.ncpus);
        let assigned = self.resources_assigned.as_ref().and_then(|r| r.ncpus);
        match (available, assigned) {
            (Some(available), Some(assigned)) => available - assigned,
            _ => 0,
        }
    }
}

/// Capacity map with a zeroed entry for every configured queue.
pub fn zeroed(queues: &[String]) -> HashMap<String, QueueCapacity> {
    queues
        .iter()
        .map(|q| (q.clone(), QueueCapacity::empty(q)))
        .collect()
}

/// Query per-queue CPU capacity for the configured queues.
///
/// Nodes outside the configured queues are ignored. Any tool problem yields
/// zeroed capacities, which makes the balancer skip first-fit placement.
pub async fn collect_capacity(
    runner: &dyn ToolRunner,
    tools: &PbsTools,
    queues: &[String],
) -> HashMap<String, QueueCapacity> {
    let mut capacity = zeroed(queues);

    match query_json::<NodeListing>(runner, tools, Tool::Pbsnodes, PBSNODES_ARGS).await {
        Ok(listing) => accumulate(&mut capacity, &listing),
        Err(ToolError::NotFound(tool)) => {
            warn!(tool = %tool, "no live capacity data, assuming zero free CPUs");
        }
        Err(e) => {
            error!(error = %e, "failed to query node capacity");
        }
    }

    for queue in queues {
        if let Some(c) = capacity.get(queue) {
            debug!(
                queue = %c.name,
                total_cpus = c.total_cpus,
                available_cpus = c.available_cpus,
                "queue capacity"
            );
        }
    }

    capacity
}

fn accumulate(capacity: &mut HashMap<String, QueueCapacity>, listing: &NodeListing) {
    for node in listing.nodes.values() {
        let Some(queue) = node.queue.as_deref() else {
            continue;
        };
        if let Some(entry) = capacity.get_mut(queue) {
            entry.total_cpus += node.total_cpus();
            entry.available_cpus += node.free_cpus();
        }
    }
}
