//! SoundGraph - arena of sound nodes rendered once per tick
//!
//! The graph owns every node. Nodes refer to each other only by [`NodeId`],
//! so one modulator can feed any number of consumers. Rendering walks the
//! nodes in dependency order, then the root node's block is the tick's output.

use crate::config::EngineConfig;
use crate::dependency_graph::DependencyGraph;
use crate::error::{SndError, SndResult};
use crate::nodes::{GainNode, OscillatorNode};
use crate::sound_node::{NodeId, SoundNode, Upstream};
use crate::wave_table::WaveTable;
use tracing::debug;

/// Node arena with a designated root
///
/// # Example
/// ```
/// use sndgraph::sound_graph::SoundGraph;
/// use sndgraph::wave_table::WaveTable;
///
/// let mut graph = SoundGraph::new(4.0, 8);
/// let table = WaveTable::new(vec![1.0, 0.0, -1.0, 0.0]).unwrap();
/// let osc = graph.oscillator(table, 1.0, None).unwrap();
/// let gain = graph.gain(0.5, osc).unwrap();
/// graph.set_root(gain).unwrap();
///
/// graph.render(1).unwrap();
/// assert_eq!(
///     graph.root_samples().unwrap(),
///     &[0.5, 0.0, -0.5, 0.0, 0.5, 0.0, -0.5, 0.0]
/// );
/// ```
pub struct SoundGraph {
    /// Slots are only `None` while their node is rendering
    nodes: Vec<Option<Box<dyn SoundNode>>>,
    root: Option<NodeId>,
    sample_rate: f32,
    frames: usize,
    /// Cached render order; cleared whenever a node may have been rewired
    order: Option<Vec<NodeId>>,
}

impl SoundGraph {
    /// Create an empty graph
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate shared by every node (e.g., 44100.0)
    /// * `frames` - Block length shared by every node
    pub fn new(sample_rate: f32, frames: usize) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            sample_rate,
            frames,
            order: None,
        }
    }

    /// Empty graph using `config`'s sample rate and block length
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.sample_rate, config.frames_per_buffer)
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node and return its handle
    ///
    /// # Errors
    /// - `SndError::FrameMismatch` if the node's block length differs from the graph's
    /// - `SndError::SampleRateMismatch` if its sample rate differs
    /// - `SndError::UnknownNode` if it names an input not yet in the graph
    pub fn add_node(&mut self, node: Box<dyn SoundNode>) -> SndResult<NodeId> {
        if node.frames() != self.frames {
            return Err(SndError::FrameMismatch {
                expected: self.frames,
                found: node.frames(),
            });
        }
        if node.sample_rate() != self.sample_rate {
            return Err(SndError::SampleRateMismatch {
                expected: self.sample_rate,
                found: node.sample_rate(),
            });
        }
        if let Some(&missing) = node.inputs().iter().find(|&&id| id >= self.nodes.len()) {
            return Err(SndError::UnknownNode(missing));
        }

        let id = self.nodes.len();
        debug!(id, node = node.name(), "added sound node");
        self.nodes.push(Some(node));
        self.order = None;
        Ok(id)
    }

    /// Add an oscillator sized for this graph
    pub fn oscillator(
        &mut self,
        table: WaveTable,
        freq: f64,
        freq_mod: Option<NodeId>,
    ) -> SndResult<NodeId> {
        let node = OscillatorNode::new(table, freq, freq_mod, self.sample_rate, self.frames);
        self.add_node(Box::new(node))
    }

    /// Add a gain stage over `input`
    pub fn gain(&mut self, multiplier: f32, input: NodeId) -> SndResult<NodeId> {
        let node = GainNode::new(multiplier, input, self.sample_rate, self.frames);
        self.add_node(Box::new(node))
    }

    /// Choose the node whose block is played
    pub fn set_root(&mut self, id: NodeId) -> SndResult<()> {
        if id >= self.nodes.len() {
            return Err(SndError::UnknownNode(id));
        }
        self.root = Some(id);
        Ok(())
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Root node, if one is set
    pub fn root_node(&self) -> Option<&dyn SoundNode> {
        self.root.and_then(|id| self.node(id))
    }

    pub fn node(&self, id: NodeId) -> Option<&dyn SoundNode> {
        self.nodes.get(id).and_then(|slot| slot.as_deref())
    }

    /// Mutable access to a node; the render order is recomputed before the next render
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut (dyn SoundNode + 'static)> {
        self.order = None;
        self.nodes.get_mut(id).and_then(|slot| slot.as_deref_mut())
    }

    /// Typed access, e.g. `graph.get::<OscillatorNode>(id)`
    pub fn get<T: SoundNode + 'static>(&self, id: NodeId) -> Option<&T> {
        self.node(id).and_then(|node| node.as_any().downcast_ref::<T>())
    }

    /// Typed mutable access, e.g. to call `OscillatorNode::set_frequency`
    pub fn get_mut<T: SoundNode + 'static>(&mut self, id: NodeId) -> Option<&mut T> {
        self.node_mut(id)
            .and_then(|node| node.as_any_mut().downcast_mut::<T>())
    }

    /// Mute or unmute a node
    pub fn set_muted(&mut self, id: NodeId, muted: bool) -> SndResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .and_then(|slot| slot.as_deref_mut())
            .ok_or(SndError::UnknownNode(id))?;
        node.set_muted(muted);
        Ok(())
    }

    /// Check that the current wiring can be rendered
    ///
    /// # Errors
    /// `SndError::UnknownNode` or `SndError::Cycle`
    pub fn validate(&mut self) -> SndResult<()> {
        self.ensure_order()
    }

    fn ensure_order(&mut self) -> SndResult<()> {
        if self.order.is_none() {
            let order = DependencyGraph::build(&self.nodes)?.execution_order()?;
            self.order = Some(order);
        }
        Ok(())
    }

    /// Render every node for logical tick `tick`
    ///
    /// Each node is taken out of its slot while it renders, so it can write
    /// its own block while reading the blocks of everything upstream.
    ///
    /// # Errors
    /// `SndError::Cycle` or `SndError::UnknownNode` if a setter rewired the
    /// graph into something that cannot be ordered
    pub fn render(&mut self, tick: u64) -> SndResult<()> {
        self.ensure_order()?;
        let order = self.order.take().unwrap_or_default();

        for &id in &order {
            if let Some(mut node) = self.nodes[id].take() {
                node.render(tick, &Upstream::new(&self.nodes));
                self.nodes[id] = Some(node);
            }
        }
        self.order = Some(order);
        Ok(())
    }

    /// Current block of the root node
    pub fn root_samples(&self) -> Option<&[f32]> {
        self.root_node().map(|node| node.samples())
    }
}
