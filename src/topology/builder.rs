//! Procedural switch graph construction.

use log::{debug, info};

use super::plan::TopologyPlan;
use super::shape::ShapeGenerator;
use super::types::{LinkConfig, LinkId, SwitchConfig, SwitchId};
use crate::error::{Result, ScenarioError};

/// Switch names are derived from the switch's index in the generated graph.
pub fn switch_name(index: usize) -> String {
    format!("s{}", index)
}

/// Lay out `node_count` switches in the graph produced by `shape`.
///
/// Node `i` of the graph becomes switch `s<i>`, configured by
/// `switch_factory(i)`. Edge `k` becomes link `k` of the returned list,
/// joining the switches of its two endpoints. Nothing is added to the plan
/// unless the graph is valid and every switch name is still free.
pub fn build<G, F>(
    plan: &mut TopologyPlan,
    node_count: usize,
    shape: &G,
    mut switch_factory: F,
) -> Result<(Vec<SwitchId>, Vec<LinkId>)>
where
    G: ShapeGenerator + ?Sized,
    F: FnMut(usize) -> SwitchConfig,
{
    let graph = shape.generate(node_count);
    if graph.node_count() != node_count {
        return Err(ScenarioError::TopologyShape(format!(
            "generator produced {} nodes, expected {}",
            graph.node_count(),
            node_count
        )));
    }
    if let Some(&(a, b)) = graph.edges().iter().find(|(a, b)| *a >= node_count || *b >= node_count) {
        return Err(ScenarioError::TopologyShape(format!(
            "edge ({}, {}) refers to a node outside 0..{}",
            a, b, node_count
        )));
    }
    if let Some(&(a, _)) = graph.edges().iter().find(|(a, b)| a == b) {
        return Err(ScenarioError::TopologyShape(format!("self-loop on node {}", a)));
    }
    if shape.requires_connectivity() && !graph.is_connected() {
        return Err(ScenarioError::TopologyShape(format!(
            "graph of {} nodes is not connected",
            node_count
        )));
    }
    for i in graph.nodes() {
        plan.ensure_unique(&switch_name(i))?;
    }

    let switches = graph
        .nodes()
        .map(|i| plan.add_switch(switch_name(i), switch_factory(i)))
        .collect::<Result<Vec<_>>>()?;
    let links = graph
        .edges()
        .iter()
        .map(|&(a, b)| plan.add_link(switches[a], switches[b], LinkConfig::default()))
        .collect::<Result<Vec<_>>>()?;

    for (link, &(a, b)) in links.iter().zip(graph.edges()) {
        debug!("Link {} joins {} and {}", link.0, switch_name(a), switch_name(b));
    }
    info!("Built {} switches and {} links", switches.len(), links.len());
    Ok((switches, links))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::shape::{Shape, TopologyGraph};
    use crate::topology::types::{HostKind, NodeRef, StpMode};

    #[test]
    fn test_path_of_five() {
        let mut plan = TopologyPlan::new(None);
        let (switches, links) = build(&mut plan, 5, &Shape::Path, |_| SwitchConfig::default()).unwrap();
        assert_eq!(switches.len(), 5);
        assert_eq!(links.len(), 4);
        for (i, link) in links.iter().enumerate() {
            let link = plan.link(*link).unwrap();
            assert_eq!(link.left.node, format!("s{}", i));
            assert_eq!(link.right.node, format!("s{}", i + 1));
        }
        assert_eq!(plan.switch(switches[2]).unwrap().name, "s2");
        assert_eq!(plan.links_of(NodeRef::Switch(switches[0])).count(), 1);
        assert_eq!(plan.links_of(NodeRef::Switch(switches[2])).count(), 2);
    }

    #[test]
    fn test_factory_receives_index() {
        let mut plan = TopologyPlan::new(None);
        let mut seen = Vec::new();
        build(&mut plan, 3, &Shape::Cycle, |i| {
            seen.push(i);
            SwitchConfig::rstp()
        })
        .unwrap();
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(plan.switches().iter().all(|s| s.config.stp == StpMode::Rstp));
        assert_eq!(plan.links().len(), 3);
    }

    #[test]
    fn test_disconnected_graph_rejected() {
        let mut plan = TopologyPlan::new(None);
        let islands = |n: usize| TopologyGraph::new(n, Vec::new());
        let result = build(&mut plan, 3, &islands, |_| SwitchConfig::default());
        assert!(matches!(result, Err(ScenarioError::TopologyShape(_))));
        assert!(plan.switches().is_empty());
    }

    #[test]
    fn test_name_collision_leaves_plan_untouched() {
        let mut plan = TopologyPlan::new(None);
        plan.add_host("s2", HostKind::Host, None).unwrap();
        let result = build(&mut plan, 4, &Shape::Path, |_| SwitchConfig::default());
        assert!(matches!(result, Err(ScenarioError::TopologyShape(_))));
        assert!(plan.switches().is_empty());
        assert!(plan.links().is_empty());
        assert_eq!(plan.hosts().len(), 1);
    }

    #[test]
    fn test_wrong_node_count_rejected() {
        let mut plan = TopologyPlan::new(None);
        let off_by_one = |n: usize| Shape::Path.generate(n + 1);
        assert!(build(&mut plan, 4, &off_by_one, |_| SwitchConfig::default()).is_err());

        let out_of_range = |n: usize| TopologyGraph::new(n, vec![(0, n)]);
        assert!(build(&mut plan, 2, &out_of_range, |_| SwitchConfig::default()).is_err());
        assert!(plan.switches().is_empty());
    }
}
