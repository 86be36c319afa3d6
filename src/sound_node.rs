//! Block-based sound nodes
//!
//! Every synthesis stage implements [`SoundNode`]. A node renders one block of
//! samples per tick into an output block it owns, and names the upstream
//! nodes it reads from by [`NodeId`]. Upstream blocks are reached through an
//! [`Upstream`] view supplied by the graph, so modulation sources can be
//! shared by several consumers without any node owning another.

use std::any::Any;

/// Handle of a node inside a [`SoundGraph`](crate::sound_graph::SoundGraph)
pub type NodeId = usize;

/// State shared by every node: sample rate, channel count, output block, mute
#[derive(Debug, Clone)]
pub struct SoundCore {
    sample_rate: f32,
    channels: usize,
    out: Vec<f32>,
    muted: bool,
}

impl SoundCore {
    /// Mono node state with a zeroed block of `frames` samples
    pub fn mono(sample_rate: f32, frames: usize) -> Self {
        Self::with_channels(sample_rate, frames, 1)
    }

    /// Node state declaring `channels` output channels
    ///
    /// The block stays `frames` long; the channel count only selects the PCM
    /// format when the node is attached to a session.
    pub fn with_channels(sample_rate: f32, frames: usize, channels: usize) -> Self {
        Self {
            sample_rate,
            channels,
            out: vec![0.0; frames],
            muted: false,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Block length in samples; fixed for the lifetime of the node
    pub fn frames(&self) -> usize {
        self.out.len()
    }

    pub fn samples(&self) -> &[f32] {
        &self.out
    }

    /// Mutable view of the block. Length cannot change through a slice.
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.out
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }
}

const NO_NODES: &[Option<Box<dyn SoundNode>>] = &[];

/// Read-only access to the current blocks of upstream nodes
///
/// Lookups of unknown ids (or of the node currently rendering) yield silence.
pub struct Upstream<'a> {
    nodes: &'a [Option<Box<dyn SoundNode>>],
}

impl<'a> Upstream<'a> {
    pub fn new(nodes: &'a [Option<Box<dyn SoundNode>>]) -> Self {
        Self { nodes }
    }

    /// View with no nodes, for rendering a source in isolation
    pub fn empty() -> Upstream<'static> {
        Upstream { nodes: NO_NODES }
    }

    /// Current block of `id`, if present
    pub fn samples(&self, id: NodeId) -> Option<&'a [f32]> {
        self.nodes
            .get(id)
            .and_then(|slot| slot.as_deref())
            .map(|node| node.core().samples())
    }

    /// Sample `i` of node `id`'s current block, 0.0 when unavailable
    pub fn sample(&self, id: NodeId, i: usize) -> f32 {
        self.samples(id)
            .and_then(|block| block.get(i).copied())
            .unwrap_or(0.0)
    }
}

/// Core trait for synthesis stages
///
/// A node is rendered once per tick, after every node listed by
/// [`inputs`](SoundNode::inputs) has been rendered for the same tick.
pub trait SoundNode: Send {
    fn core(&self) -> &SoundCore;

    fn core_mut(&mut self) -> &mut SoundCore;

    /// Fill the output block for logical tick `tick`
    fn render(&mut self, tick: u64, upstream: &Upstream<'_>);

    /// Upstream nodes this node reads during `render`
    ///
    /// Used to order rendering so every input block is current.
    fn inputs(&self) -> Vec<NodeId>;

    /// Human-readable name (for logs)
    fn name(&self) -> &str {
        "SoundNode"
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn sample_rate(&self) -> f32 {
        self.core().sample_rate()
    }

    fn channels(&self) -> usize {
        self.core().channels()
    }

    fn frames(&self) -> usize {
        self.core().frames()
    }

    fn samples(&self) -> &[f32] {
        self.core().samples()
    }

    fn sample(&self, i: usize) -> f32 {
        self.core().samples()[i]
    }

    fn is_muted(&self) -> bool {
        self.core().is_muted()
    }

    fn set_muted(&mut self, muted: bool) {
        self.core_mut().set_muted(muted)
    }
}
