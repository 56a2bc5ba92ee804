// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution order and the per-frame driver.
//!
//! A [`Schedule`] is derived from the graph topology and cached by the
//! [`Scheduler`] until the graph's revision changes. Each frame runs the
//! Reset, Setup and Execute passes over the schedule; nodes exchange values
//! through a slot table that lives for one frame only.

use crate::context::{RenderContext, SetupContext, TextureHandle};
use crate::error::{EngineError, FrameError, GraphError, NodeError, Result};
use crate::graph::{Graph, GraphId};
use crate::node::{FrameListener, NodeId, PipelineNode};
use crate::port::{PortType, PortValue};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// How the passes of a frame are dispatched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// One node at a time, in topological order
    #[default]
    Sequential,
    /// Nodes of a wave run concurrently on the engine's worker pool
    Parallel,
}

/// Per-frame lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramePhase {
    /// Clear per-frame state
    Reset,
    /// Allocate resources and publish descriptors
    Setup,
    /// Do the work
    Execute,
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reset => "Reset",
            Self::Setup => "Setup",
            Self::Execute => "Execute",
        })
    }
}

/// Compute a dependency-respecting node order.
///
/// Ties are broken by node insertion order. A cycle fails with
/// [`GraphError::CyclicGraph`], never with a partial order.
pub fn compute_order(graph: &Graph) -> Result<Vec<NodeId>> {
    graph.topological_order()
}

/// Source output feeding an input
type Binding = Option<(NodeId, usize)>;

/// Execution plan for one graph revision
#[derive(Debug, Clone)]
pub struct Schedule {
    graph: GraphId,
    revision: u64,
    order: Vec<NodeId>,
    waves: Vec<Vec<NodeId>>,
    bindings: HashMap<NodeId, Vec<Binding>>,
}

impl Schedule {
    /// Build the plan for the current topology of `graph`
    pub fn build(graph: &Graph) -> Result<Self> {
        let order = compute_order(graph)?;
        let mut bindings = HashMap::with_capacity(order.len());
        let mut levels: HashMap<NodeId, usize> = HashMap::with_capacity(order.len());
        let mut waves: Vec<Vec<NodeId>> = Vec::new();

        for &id in &order {
            let inputs = graph.node(id).map_or(0, PipelineNode::num_inputs);
            let node_bindings: Vec<Binding> = (0..inputs)
                .map(|port| {
                    graph
                        .input_link(id, port)
                        .map(|link| (link.source, link.source_port))
                })
                .collect();

            // Upstream nodes precede `id` in the order, so their level is known.
            let level = graph
                .links_into(id)
                .filter_map(|link| levels.get(&link.source))
                .map(|level| level + 1)
                .max()
                .unwrap_or(0);
            levels.insert(id, level);
            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[level].push(id);
            bindings.insert(id, node_bindings);
        }

        Ok(Self {
            graph: graph.id(),
            revision: graph.revision(),
            order,
            waves,
            bindings,
        })
    }

    /// Nodes in execution order
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Groups of mutually independent nodes; every dependency of a node lies in an earlier wave
    pub fn waves(&self) -> &[Vec<NodeId>] {
        &self.waves
    }

    /// Distinct nodes feeding `node`
    pub fn upstream(&self, node: NodeId) -> Vec<NodeId> {
        let mut upstream: Vec<NodeId> = self
            .inputs_of(node)
            .iter()
            .flatten()
            .map(|(source, _)| *source)
            .collect();
        upstream.sort();
        upstream.dedup();
        upstream
    }

    /// Whether this plan still matches the graph topology
    pub fn is_current(&self, graph: &Graph) -> bool {
        self.graph == graph.id() && self.revision == graph.revision()
    }

    fn inputs_of(&self, node: NodeId) -> &[Binding] {
        self.bindings.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Output values of the frame in flight, keyed by (node, output index)
#[derive(Debug, Default)]
struct FrameSlots {
    values: RwLock<HashMap<(NodeId, usize), PortValue>>,
}

/// A node's view of the frame slot table.
///
/// Inputs read the outputs of linked upstream nodes; outputs are written by
/// this node only.
pub struct NodeIo<'a> {
    node: NodeId,
    inputs: &'a [Binding],
    num_outputs: usize,
    slots: &'a FrameSlots,
}

impl<'a> NodeIo<'a> {
    fn new(node: NodeId, inputs: &'a [Binding], num_outputs: usize, slots: &'a FrameSlots) -> Self {
        Self {
            node,
            inputs,
            num_outputs,
            slots,
        }
    }

    /// Node this view belongs to
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Number of inputs of the node
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Whether an input has an incoming link
    pub fn is_linked(&self, index: usize) -> bool {
        matches!(self.inputs.get(index), Some(Some(_)))
    }

    /// Value on an input, if it is linked and upstream published one
    pub fn input(&self, index: usize) -> Option<PortValue> {
        let (source, port) = (*self.inputs.get(index)?)?;
        self.slots.values.read().get(&(source, port)).cloned()
    }

    /// Value on an input, or [`NodeError::MissingInput`]
    pub fn require_input(&self, index: usize) -> std::result::Result<PortValue, NodeError> {
        self.input(index).ok_or(NodeError::MissingInput(index))
    }

    /// Texture on an input
    pub fn input_texture(&self, index: usize) -> std::result::Result<TextureHandle, NodeError> {
        match self.require_input(index)? {
            PortValue::Texture(handle) => Ok(handle),
            other => Err(NodeError::UnexpectedValue {
                index,
                expected: PortType::Texture,
                found: other.port_type(),
            }),
        }
    }

    /// Publish a value on an output.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not an output of the node.
    pub fn set_output(&mut self, index: usize, value: PortValue) {
        assert!(
            index < self.num_outputs,
            "output {index} out of range ({} outputs)",
            self.num_outputs
        );
        self.slots.values.write().insert((self.node, index), value);
    }

    /// Value published on one of this node's outputs
    pub fn output(&self, index: usize) -> Option<PortValue> {
        self.slots.values.read().get(&(self.node, index)).cloned()
    }
}

impl fmt::Debug for NodeIo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIo")
            .field("node", &self.node)
            .field("inputs", &self.inputs)
            .field("num_outputs", &self.num_outputs)
            .finish()
    }
}

/// Summary of a completed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame index
    pub frame: u64,
    /// Nodes run
    pub nodes: usize,
    /// Waves in the schedule
    pub waves: usize,
    /// Commands recorded during Execute
    pub commands: usize,
    /// Transient textures of the previous frame returned to the pool
    pub released_textures: usize,
}

/// Everything a node call needs besides the node itself
struct FrameState<'f, 'e> {
    schedule: &'f Schedule,
    slots: FrameSlots,
    setup: &'f SetupContext<'e>,
    render: &'f RenderContext,
}

impl FrameState<'_, '_> {
    fn run(&self, node: &mut PipelineNode, phase: FramePhase) -> std::result::Result<(), FrameError> {
        let id = node.id();
        tracing::trace!("{phase} {} ({id})", node.name());

        let mut io = NodeIo::new(id, self.schedule.inputs_of(id), node.num_outputs(), &self.slots);
        let result = match phase {
            FramePhase::Reset => {
                node.body_mut().reset();
                Ok(())
            }
            FramePhase::Setup => node.body_mut().setup(&mut io, self.setup),
            FramePhase::Execute => node.body_mut().execute(&mut io, self.render),
        };
        result.map_err(|error| FrameError::Node {
            node: id,
            phase,
            error,
        })
    }
}

/// Drives frames over a graph
#[derive(Debug, Default)]
pub struct Scheduler {
    mode: ExecutionMode,
    cached: Option<Arc<Schedule>>,
}

impl Scheduler {
    /// Create a scheduler
    pub fn new(mode: ExecutionMode) -> Self {
        Self { mode, cached: None }
    }

    /// Current execution mode
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Change the execution mode
    pub fn set_mode(&mut self, mode: ExecutionMode) {
        self.mode = mode;
    }

    /// Schedule for the current topology of `graph`, rebuilt only when it changed
    pub fn schedule(&mut self, graph: &Graph) -> Result<Arc<Schedule>> {
        if let Some(schedule) = self.cached.as_ref().filter(|s| s.is_current(graph)) {
            return Ok(Arc::clone(schedule));
        }

        let schedule = Arc::new(Schedule::build(graph)?);
        tracing::debug!(
            "Rebuilt schedule for {} (revision {}): {} node(s) in {} wave(s)",
            graph.name,
            graph.revision(),
            schedule.order().len(),
            schedule.waves().len()
        );
        self.cached = Some(Arc::clone(&schedule));
        Ok(schedule)
    }

    /// Drop the cached schedule
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Run one frame: frame-begin listeners, Reset, Setup, Execute, frame-end listeners.
    ///
    /// Fails before any node runs when the graph cannot be scheduled or a
    /// required input is unbound. When a node fails the frame is abandoned:
    /// commands recorded so far are discarded and transient textures released.
    pub fn run_frame(
        &mut self,
        graph: &mut Graph,
        setup: &SetupContext<'_>,
        render: &RenderContext,
    ) -> std::result::Result<FrameReport, FrameError> {
        let engine = setup.engine();
        if !engine.is_running() {
            return Err(EngineError::ShutDown.into());
        }

        let schedule = self.schedule(graph).inspect_err(|e| {
            tracing::error!("Frame {} aborted: {e}", setup.frame());
        })?;
        if let Some(unbound) = graph.unbound_required_inputs().into_iter().next() {
            tracing::error!("Frame {} aborted: {unbound}", setup.frame());
            return Err(unbound.into());
        }

        let released_textures = engine.release_transients();
        let frame = setup.frame();
        notify_listeners(graph, &schedule, |listener| listener.on_frame_begin(frame));

        let state = FrameState {
            schedule: &schedule,
            slots: FrameSlots::default(),
            setup,
            render,
        };
        for phase in [FramePhase::Reset, FramePhase::Setup, FramePhase::Execute] {
            if let Err(error) = self.run_pass(graph, &state, phase) {
                render.discard();
                engine.release_transients();
                tracing::error!("Frame {frame} aborted: {error}");
                return Err(error);
            }
        }

        notify_listeners(graph, &schedule, |listener| listener.on_frame_end(frame));

        Ok(FrameReport {
            frame,
            nodes: schedule.order().len(),
            waves: schedule.waves().len(),
            commands: render.command_count(),
            released_textures,
        })
    }

    fn run_pass(
        &self,
        graph: &mut Graph,
        state: &FrameState<'_, '_>,
        phase: FramePhase,
    ) -> std::result::Result<(), FrameError> {
        match self.mode {
            ExecutionMode::Sequential => {
                for &id in state.schedule.order() {
                    let node = graph.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
                    state.run(node, phase)?;
                }
                Ok(())
            }
            ExecutionMode::Parallel => {
                let pool = state.setup.engine().worker_pool()?;
                let mut nodes: HashMap<NodeId, &mut PipelineNode> =
                    graph.nodes_mut().map(|node| (node.id(), node)).collect();

                for wave in state.schedule.waves() {
                    let mut batch = Vec::with_capacity(wave.len());
                    for id in wave {
                        batch.push(nodes.remove(id).ok_or(GraphError::NodeNotFound(*id))?);
                    }
                    pool.install(|| {
                        batch
                            .par_iter_mut()
                            .try_for_each(|node| state.run(node, phase))
                    })?;
                }
                Ok(())
            }
        }
    }
}

fn notify_listeners(
    graph: &mut Graph,
    schedule: &Schedule,
    mut notify: impl FnMut(&mut dyn FrameListener),
) {
    for &id in schedule.order() {
        if let Some(listener) = graph
            .node_mut(id)
            .and_then(|node| node.body_mut().frame_listener())
        {
            notify(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EngineConfig, EngineContext};
    use crate::testing::{probe_registry, CallLog};

    fn engine() -> EngineContext {
        EngineContext::initialize(&EngineConfig {
            worker_threads: Some(4),
        })
        .unwrap()
    }

    fn abc(log: &CallLog) -> (Graph, [NodeId; 3]) {
        let mut graph = Graph::new("Test", probe_registry(log));
        let a = graph.add_node("A").unwrap();
        let b = graph.add_node("B").unwrap();
        let c = graph.add_node("C").unwrap();
        graph.link(a, 0, b, 0).unwrap();
        graph.link(a, 0, c, 0).unwrap();
        graph.link(b, 0, c, 1).unwrap();
        (graph, [a, b, c])
    }

    fn run(
        scheduler: &mut Scheduler,
        graph: &mut Graph,
        engine: &EngineContext,
        frame: u64,
    ) -> (std::result::Result<FrameReport, FrameError>, RenderContext) {
        let setup = SetupContext::new(engine, frame, (16, 16));
        let render = RenderContext::new(frame);
        let result = scheduler.run_frame(graph, &setup, &render);
        (result, render)
    }

    #[test]
    fn test_waves_follow_dependencies() {
        let (graph, [a, b, c]) = abc(&CallLog::default());
        let schedule = Schedule::build(&graph).unwrap();
        assert_eq!(schedule.order(), &[a, b, c]);
        assert_eq!(schedule.waves(), &[vec![a], vec![b], vec![c]]);
        assert_eq!(schedule.upstream(c).len(), 2);
        assert!(schedule.upstream(a).is_empty());
        assert!(schedule.is_current(&graph));
    }

    #[test]
    fn test_independent_nodes_share_a_wave() {
        let mut graph = Graph::new("Test", probe_registry(&CallLog::default()));
        let first = graph.add_node("A").unwrap();
        let second = graph.add_node("A").unwrap();
        let sink = graph.add_node("C").unwrap();
        graph.link(first, 0, sink, 0).unwrap();
        graph.link(second, 0, sink, 1).unwrap();

        let schedule = Schedule::build(&graph).unwrap();
        assert_eq!(schedule.waves(), &[vec![first, second], vec![sink]]);
    }

    #[test]
    fn test_lifecycle_order() {
        let log = CallLog::default();
        let (mut graph, _) = abc(&log);
        let engine = engine();
        let mut scheduler = Scheduler::new(ExecutionMode::Sequential);

        let (result, render) = run(&mut scheduler, &mut graph, &engine, 0);
        let report = result.unwrap();
        assert_eq!(report.nodes, 3);
        assert_eq!(report.waves, 3);
        assert_eq!(report.commands, 3);
        assert_eq!(render.command_count(), 3);

        let calls = log.lock().clone();
        assert_eq!(
            calls,
            [
                "A:Reset", "B:Reset", "C:Reset", "A:Setup", "B:Setup", "C:Setup", "A:Execute",
                "B:Execute", "C:Execute",
            ]
        );
    }

    #[test]
    fn test_parallel_mode_matches_sequential() {
        let engine = engine();
        let mut results = Vec::new();
        for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
            let log = CallLog::default();
            let (mut graph, ids) = abc(&log);
            let mut scheduler = Scheduler::new(mode);
            let (result, render) = run(&mut scheduler, &mut graph, &engine, 0);
            let report = result.unwrap();

            let commands: Vec<NodeId> = render.into_commands().into_iter().map(|c| c.node).collect();
            // One node per wave, so even the parallel run is fully ordered.
            assert_eq!(commands, ids);
            results.push((report.nodes, report.commands, log.lock().len()));
        }
        assert_eq!(results[0], results[1]);
    }

    #[test]
    fn test_parallel_wave_runs_every_node_once() {
        let log = CallLog::default();
        let mut graph = Graph::new("Test", probe_registry(&log));
        let sink = graph.add_node("Variadic").unwrap();
        graph.set_num_inputs(sink, 6).unwrap();
        for port in 0..6 {
            let source = graph.add_node("A").unwrap();
            graph.link(source, 0, sink, port).unwrap();
        }

        let engine = engine();
        let mut scheduler = Scheduler::new(ExecutionMode::Parallel);
        let (result, _render) = run(&mut scheduler, &mut graph, &engine, 0);
        let report = result.unwrap();
        assert_eq!(report.waves, 2);
        assert_eq!(report.commands, 7);

        let calls = log.lock();
        assert_eq!(calls.iter().filter(|c| c.as_str() == "A:Execute").count(), 6);
        let last_source = calls.iter().rposition(|c| c.as_str() == "A:Execute").unwrap();
        let sink_execute = calls.iter().position(|c| c.as_str() == "Variadic:Execute").unwrap();
        assert!(last_source < sink_execute);
    }

    #[test]
    fn test_unbound_required_input_aborts_before_any_node() {
        let log = CallLog::default();
        let mut graph = Graph::new("Test", probe_registry(&log));
        let b = graph.add_node("B").unwrap();
        let engine = engine();
        let mut scheduler = Scheduler::default();

        let (result, _render) = run(&mut scheduler, &mut graph, &engine, 0);
        assert!(matches!(
            result,
            Err(FrameError::Graph(GraphError::RequiredInputUnbound { node, port: 0 })) if node == b
        ));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_cycle_aborts_frame() {
        let log = CallLog::default();
        let mut graph = Graph::new("Test", probe_registry(&log));
        let b = graph.add_node("B").unwrap();
        graph.link(b, 0, b, 0).unwrap();
        let engine = engine();

        let (result, _render) = run(&mut Scheduler::default(), &mut graph, &engine, 0);
        assert!(matches!(result, Err(FrameError::Graph(GraphError::CyclicGraph { .. }))));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_node_failure_discards_frame() {
        let log = CallLog::default();
        let mut graph = Graph::new("Test", probe_registry(&log));
        let listener = graph.add_node("Listener").unwrap();
        let failing = graph.add_node("Failing").unwrap();
        graph.link(listener, 0, failing, 0).unwrap();
        let engine = engine();

        let (result, render) = run(&mut Scheduler::default(), &mut graph, &engine, 5);
        assert!(matches!(
            result,
            Err(FrameError::Node { node, phase: FramePhase::Execute, .. }) if node == failing
        ));
        assert_eq!(render.command_count(), 0);
        assert_eq!(engine.live_textures(), 0);

        let calls = log.lock();
        assert!(calls.contains(&"Listener:begin 5".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("Listener:end")));
    }

    #[test]
    fn test_frame_listeners_bracket_the_frame() {
        let log = CallLog::default();
        let mut graph = Graph::new("Test", probe_registry(&log));
        graph.add_node("Listener").unwrap();
        let engine = engine();
        let mut scheduler = Scheduler::default();

        run(&mut scheduler, &mut graph, &engine, 7).0.unwrap();
        let calls = log.lock().clone();
        assert_eq!(
            calls,
            [
                "Listener:begin 7",
                "Listener:Reset",
                "Listener:Setup",
                "Listener:Execute",
                "Listener:end 7",
            ]
        );
    }

    #[test]
    fn test_values_do_not_leak_across_frames() {
        let log = CallLog::default();
        let (mut graph, _) = abc(&log);
        let engine = engine();
        let mut scheduler = Scheduler::default();

        let first = run(&mut scheduler, &mut graph, &engine, 0).0.unwrap();
        assert_eq!(first.released_textures, 0);
        let live = engine.live_textures();
        assert!(live > 0);

        let second = run(&mut scheduler, &mut graph, &engine, 1).0.unwrap();
        assert_eq!(second.released_textures, live);
        assert_eq!(engine.live_textures(), live);
        assert!(engine.reused_textures() > 0);
    }

    #[test]
    fn test_schedule_cache_follows_revision() {
        let (mut graph, [a, _, _]) = abc(&CallLog::default());
        let mut scheduler = Scheduler::default();
        let first = scheduler.schedule(&graph).unwrap();
        let again = scheduler.schedule(&graph).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let extra = graph.add_node("B").unwrap();
        graph.link(a, 0, extra, 0).unwrap();
        let rebuilt = scheduler.schedule(&graph).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.order().len(), 4);

        scheduler.invalidate();
        let fresh = scheduler.schedule(&graph).unwrap();
        assert!(!Arc::ptr_eq(&rebuilt, &fresh));
    }

    #[test]
    fn test_resizing_ports_rebuilds_schedule() {
        let log = CallLog::default();
        let mut graph = Graph::new("Test", probe_registry(&log));
        let a = graph.add_node("A").unwrap();
        let b = graph.add_node("A").unwrap();
        let sink = graph.add_node("Variadic").unwrap();
        graph.link(a, 0, sink, 0).unwrap();
        graph.link(b, 0, sink, 1).unwrap();

        let mut scheduler = Scheduler::default();
        let engine = engine();
        let before = scheduler.schedule(&graph).unwrap();
        assert_eq!(before.upstream(sink).len(), 2);

        assert_eq!(graph.set_num_inputs(sink, 1).unwrap(), 1);
        let after = scheduler.schedule(&graph).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.upstream(sink), vec![a]);
        assert!(graph.validate().is_ok());

        let (result, _) = run(&mut scheduler, &mut graph, &engine, 0);
        assert_eq!(result.unwrap().nodes, 3);
    }

    #[test]
    fn test_shut_down_engine_rejects_frames() {
        let (mut graph, _) = abc(&CallLog::default());
        let mut engine = engine();
        engine.shutdown();
        let (result, _render) = run(&mut Scheduler::default(), &mut graph, &engine, 0);
        assert!(matches!(result, Err(FrameError::Engine(EngineError::ShutDown))));
    }

    #[test]
    fn test_node_io_reads_upstream_values() {
        let slots = FrameSlots::default();
        let source = NodeId::new();
        let sink = NodeId::new();
        let bindings = [Some((source, 0)), None];

        let mut source_io = NodeIo::new(source, &[], 1, &slots);
        source_io.set_output(0, PortValue::Int(4));
        assert!(matches!(source_io.output(0), Some(PortValue::Int(4))));

        let sink_io = NodeIo::new(sink, &bindings, 0, &slots);
        assert!(sink_io.is_linked(0));
        assert!(!sink_io.is_linked(1));
        assert!(matches!(sink_io.input(0), Some(PortValue::Int(4))));
        assert!(matches!(sink_io.require_input(1), Err(NodeError::MissingInput(1))));
        assert!(matches!(
            sink_io.input_texture(0),
            Err(NodeError::UnexpectedValue { index: 0, found: PortType::Int, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_set_output_out_of_range_panics() {
        let slots = FrameSlots::default();
        let mut io = NodeIo::new(NodeId::new(), &[], 1, &slots);
        io.set_output(1, PortValue::Bool(true));
    }
}
