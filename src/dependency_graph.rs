/*!
Dependency analysis for sound node rendering

Determines the order in which nodes must render so that every modulation
source and gain input is current before its consumer reads it.

# Graph Structure
- Nodes: sound nodes (oscillators, gains)
- Edges: data flow from input → dependent

Unlike a patch with delay lines, nothing here can hold a previous block, so a
cycle has no meaningful order and is rejected.
*/

use crate::error::{SndError, SndResult};
use crate::sound_node::{NodeId, SoundNode};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

/// Directed acyclic graph of node dependencies
pub struct DependencyGraph {
    graph: DiGraph<NodeId, ()>,
}

impl DependencyGraph {
    /// Build the dependency graph for the arena slots in `nodes`
    ///
    /// Empty slots are skipped.
    ///
    /// # Errors
    /// `SndError::UnknownNode` if a node names an input that is not in the arena
    pub fn build(nodes: &[Option<Box<dyn SoundNode>>]) -> SndResult<Self> {
        let mut graph = DiGraph::new();
        let mut index: Vec<Option<NodeIndex>> = vec![None; nodes.len()];

        for (id, slot) in nodes.iter().enumerate() {
            if slot.is_some() {
                index[id] = Some(graph.add_node(id));
            }
        }

        for (id, slot) in nodes.iter().enumerate() {
            let Some(node) = slot else { continue };
            let Some(dependent) = index[id] else { continue };

            for input in node.inputs() {
                match index.get(input).copied().flatten() {
                    // Edge: input → dependent
                    Some(source) => {
                        graph.add_edge(source, dependent, ());
                    }
                    None => return Err(SndError::UnknownNode(input)),
                }
            }
        }

        Ok(Self { graph })
    }

    /// Render order: every node appears after all of its inputs
    ///
    /// # Errors
    /// `SndError::Cycle` naming a node on the cycle
    pub fn execution_order(&self) -> SndResult<Vec<NodeId>> {
        toposort(&self.graph, None)
            .map(|order| order.iter().map(|&idx| self.graph[idx]).collect())
            .map_err(|cycle| SndError::Cycle(self.graph[cycle.node_id()]))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
