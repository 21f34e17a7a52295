//! Resolves agent dependencies into execution layers.
//!
//! Agents within a layer have no dependency relationship between them and
//! may run concurrently; every agent's dependencies are guaranteed to sit
//! in an earlier layer.

use std::collections::HashSet;

use caseforge_domain::AgentName;
use thiserror::Error;

/// Failures raised while validating or resolving the agent graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DagError {
    /// An agent depends on one not present in the graph being resolved.
    #[error("{agent} depends on {missing}, which is not in the agent set")]
    MissingDependency {
        /// The agent with the dangling dependency.
        agent: AgentName,
        /// The dependency that could not be found.
        missing: AgentName,
    },

    /// The dependency graph contains a cycle.
    #[error("circular dependency involving {agent}")]
    CircularDependency {
        /// One agent on the cycle (DFS reports the back-edge target).
        agent: AgentName,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Validates the full, fixed agent set once at startup.
///
/// Every [`AgentName`] variant and its declared [`AgentName::dependencies`]
/// must resolve within [`AgentName::ALL`]; this is the one-time check spec'd
/// separately from the cheaper per-plan [`layers`] call.
///
/// # Errors
///
/// [`DagError::MissingDependency`] if a dependency isn't in `AgentName::ALL`
/// (cannot currently happen given how the enum is authored, but this guards
/// against a future agent being added with a dangling dependency).
/// [`DagError::CircularDependency`] if the static graph has a cycle.
pub fn validate_full_graph() -> Result<(), DagError> {
    for agent in AgentName::ALL {
        for dep in agent.dependencies() {
            if !AgentName::ALL.contains(dep) {
                return Err(DagError::MissingDependency {
                    agent,
                    missing: *dep,
                });
            }
        }
    }
    detect_cycle(&AgentName::ALL)?;
    Ok(())
}

fn detect_cycle(subset: &[AgentName]) -> Result<(), DagError> {
    let mut colors: Vec<(AgentName, Color)> =
        subset.iter().map(|a| (*a, Color::White)).collect();

    fn visit(
        agent: AgentName,
        subset: &[AgentName],
        colors: &mut [(AgentName, Color)],
    ) -> Result<(), DagError> {
        let idx = colors.iter().position(|(a, _)| *a == agent).expect("agent in subset");
        match colors[idx].1 {
            Color::Black => return Ok(()),
            Color::Grey => return Err(DagError::CircularDependency { agent }),
            Color::White => {}
        }
        colors[idx].1 = Color::Grey;
        for dep in agent.dependencies() {
            if subset.contains(dep) {
                visit(*dep, subset, colors)?;
            }
        }
        let idx = colors.iter().position(|(a, _)| *a == agent).expect("agent in subset");
        colors[idx].1 = Color::Black;
        Ok(())
    }

    for agent in subset {
        visit(*agent, subset, &mut colors)?;
    }
    Ok(())
}

/// Partitions `subset` into execution layers.
///
/// Dependencies that fall outside `subset` (an agent disabled for a plan)
/// are treated as already satisfied rather than missing — per-plan agent
/// lists are validated against the full graph separately, at startup, via
/// [`validate_full_graph`].
///
/// # Errors
///
/// [`DagError::CircularDependency`] if `subset`'s induced subgraph has a
/// cycle. Cannot return [`DagError::MissingDependency`]; that check only
/// applies to the full, fixed agent set.
pub fn layers(subset: &[AgentName]) -> Result<Vec<Vec<AgentName>>, DagError> {
    detect_cycle(subset)?;

    let mut resolved: HashSet<AgentName> = HashSet::new();
    let mut remaining: Vec<AgentName> = subset.to_vec();
    let mut out = Vec::new();

    while !remaining.is_empty() {
        let (ready, pending): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|agent| {
            agent
                .dependencies()
                .iter()
                .filter(|dep| subset.contains(dep))
                .all(|dep| resolved.contains(dep))
        });
        // detect_cycle already ran above, so `ready` can't be empty here
        // unless subset itself is empty.
        resolved.extend(&ready);
        out.push(ready);
        remaining = pending;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_graph_validates() {
        assert!(validate_full_graph().is_ok());
    }

    #[test]
    fn production_agent_set_produces_four_layers() {
        let plan = layers(&AgentName::ALL).unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0], vec![AgentName::Analyst]);
        let mut layer2 = plan[1].clone();
        layer2.sort_by_key(|a| a.to_string());
        assert_eq!(layer2, vec![AgentName::Commercial, AgentName::Market]);
        assert_eq!(plan[2], vec![AgentName::Financial]);
        assert_eq!(plan[3], vec![AgentName::Reviewer]);
    }

    #[test]
    fn disabled_agent_is_silently_excluded_not_missing() {
        // Free plan's enabled set per caseforge_domain::PLAN_DEFINITIONS.
        let subset = [AgentName::Analyst, AgentName::Commercial, AgentName::Reviewer];
        let plan = layers(&subset).unwrap();
        // reviewer's unsatisfied deps (market, financial) are outside the
        // subset, so it still lands in the layer right after commercial.
        assert_eq!(plan[0], vec![AgentName::Analyst]);
        assert_eq!(plan[1], vec![AgentName::Commercial]);
        assert_eq!(plan[2], vec![AgentName::Reviewer]);
    }

    #[test]
    fn single_agent_subset_is_one_layer() {
        let plan = layers(&[AgentName::Analyst]).unwrap();
        assert_eq!(plan, vec![vec![AgentName::Analyst]]);
    }
}
