//! Sparse per-function flow graphs.
//!
//! Every instruction becomes a node in an arena; node 0 is the synthetic entry that
//! seeds the function's arguments. Two kinds of edges connect nodes:
//!
//! - *successor* edges follow control flow and carry heap facts,
//! - *user* edges follow SSA def-use chains and carry top-level facts.
//!
//! Nodes that neither define nor consume points-to facts ("preserving" nodes) are
//! then removed by two reductions, applied until nothing changes:
//!
//! - **T2**: a preserving node with a single predecessor (or a single successor)
//!   is spliced out, its edges moved to that neighbour.
//! - **T4**: a cycle made only of preserving nodes is merged into one node.

use std::collections::{BTreeSet, HashMap};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::ir::{Callee, FuncId, InstId, InstKind, Program, Value};
use crate::reference::Ref;
use crate::scc::tarjan;

pub type NodeId = usize;

/// The synthetic entry node of every graph.
pub const ENTRY: NodeId = 0;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NodeKind {
    Entry,
    Alloc,
    Copy,
    Load,
    Store,
    Call,
    Return,
    Preserving,
}

impl NodeKind {
    fn of(kind: &InstKind) -> NodeKind {
        match kind {
            InstKind::Alloc => NodeKind::Alloc,
            InstKind::Copy { .. } => NodeKind::Copy,
            InstKind::Load { .. } => NodeKind::Load,
            InstKind::Store { .. } => NodeKind::Store,
            InstKind::Call { .. } => NodeKind::Call,
            InstKind::Return { .. } => NodeKind::Return,
            InstKind::Other { .. } => NodeKind::Preserving,
        }
    }

    /// Does a node of this kind define a top-level value?
    pub fn is_definition(self) -> bool {
        matches!(self, NodeKind::Alloc | NodeKind::Copy | NodeKind::Load | NodeKind::Call)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub inst: Option<InstId>,
    pub succs: BTreeSet<NodeId>,
    pub preds: BTreeSet<NodeId>,
    pub users: BTreeSet<NodeId>,
    alive: bool,

    /// Heap facts flowing into the node.
    pub heap_in: Ref,
    /// Heap facts flowing out of the node.
    pub heap_out: Ref,
    /// Heap facts pushed back by callee returns (calls only).
    pub returned: Ref,
    /// Set when a load found nothing to read.
    pub uninit: bool,
}

impl Node {
    fn new(kind: NodeKind, inst: Option<InstId>, empty: Ref) -> Self {
        Self {
            kind,
            inst,
            succs: BTreeSet::new(),
            preds: BTreeSet::new(),
            users: BTreeSet::new(),
            alive: true,
            heap_in: empty,
            heap_out: empty,
            returned: empty,
            uninit: false,
        }
    }
}

#[derive(Debug)]
pub struct FlowGraph {
    func: FuncId,
    nodes: Vec<Node>,
    returns: Vec<NodeId>,
    inst_nodes: HashMap<InstId, NodeId>,
}

impl FlowGraph {
    /// Build the (unreduced) graph of a defined function.
    ///
    /// `empty` is the empty relation every heap state starts from.
    pub fn build(program: &Program, func: FuncId, empty: Ref) -> Result<Self> {
        let f = program.function(func);
        if f.is_declaration() {
            return Err(Error::InvalidProgram(format!("function `{}` has no body", f.name)));
        }

        let mut graph = FlowGraph {
            func,
            nodes: vec![Node::new(NodeKind::Entry, None, empty)],
            returns: Vec::new(),
            inst_nodes: HashMap::new(),
        };

        let mut bounds = Vec::with_capacity(f.blocks.len());
        for (bi, block) in f.blocks.iter().enumerate() {
            if block.insts.is_empty() {
                return Err(Error::InvalidProgram(format!("block {} of `{}` is empty", bi, f.name)));
            }
            let mut prev = None;
            for &inst in &block.insts {
                let Some(body) = f.insts.get(inst.0 as usize) else {
                    return Err(Error::InvalidProgram(format!(
                        "block {} of `{}` refers to a missing instruction {}",
                        bi, f.name, inst.0
                    )));
                };
                let id = graph.nodes.len();
                if graph.inst_nodes.insert(inst, id).is_some() {
                    return Err(Error::InvalidProgram(format!(
                        "instruction `{}` of `{}` is placed twice",
                        body.name, f.name
                    )));
                }
                check_references(program, func, inst)?;
                let kind = NodeKind::of(&body.kind);
                graph.nodes.push(Node::new(kind, Some(inst), empty));
                if kind == NodeKind::Return {
                    graph.returns.push(id);
                }
                if let Some(p) = prev {
                    graph.add_edge(p, id);
                }
                prev = Some(id);
            }
            let first = graph.inst_nodes[&block.insts[0]];
            bounds.push((first, graph.nodes.len() - 1));
        }

        graph.add_edge(ENTRY, bounds[0].0);
        for (bi, block) in f.blocks.iter().enumerate() {
            for succ in &block.succs {
                let Some(&(first, _)) = bounds.get(succ.0 as usize) else {
                    return Err(Error::InvalidProgram(format!(
                        "block {} of `{}` jumps to a missing block {}",
                        bi, f.name, succ.0
                    )));
                };
                graph.add_edge(bounds[bi].1, first);
            }
        }

        for user in 1..graph.nodes.len() {
            if graph.nodes[user].kind == NodeKind::Preserving {
                continue;
            }
            let Some(inst) = graph.nodes[user].inst else { continue };
            for op in f.inst(inst).kind.operands() {
                let def = match op {
                    Value::Inst(g, i) if g == func => match graph.inst_nodes.get(&i) {
                        Some(&def) => def,
                        None => {
                            return Err(Error::InvalidProgram(format!(
                                "`{}` uses an instruction outside of any block",
                                program.value_name(Value::Inst(func, inst))
                            )))
                        }
                    },
                    Value::Arg(g, _) if g == func => ENTRY,
                    Value::Inst(..) | Value::Arg(..) => {
                        return Err(Error::InvalidProgram(format!(
                            "`{}` uses `{}` from another function",
                            program.value_name(Value::Inst(func, inst)),
                            program.value_name(op)
                        )))
                    }
                    _ => continue,
                };
                if def != user && (def == ENTRY || graph.nodes[def].kind.is_definition()) {
                    graph.nodes[def].users.insert(user);
                }
            }
        }

        debug!("Built graph for `{}` with {} nodes", f.name, graph.nodes.len());
        Ok(graph)
    }

    pub fn func(&self) -> FuncId {
        self.func
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Ids of nodes still present after reduction.
    pub fn live_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter(|&n| self.nodes[n].alive)
    }

    pub fn len(&self) -> usize {
        self.live_nodes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return nodes of the function.
    pub fn returns(&self) -> &[NodeId] {
        &self.returns
    }

    /// Node of an instruction, if it survived reduction.
    pub fn node_of(&self, inst: InstId) -> Option<NodeId> {
        self.inst_nodes.get(&inst).copied().filter(|&n| self.nodes[n].alive)
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from].succs.insert(to);
        self.nodes[to].preds.insert(from);
    }

    fn remove_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        let removed = self.nodes[from].succs.remove(&to);
        self.nodes[to].preds.remove(&from);
        removed
    }

    fn delete(&mut self, n: NodeId) {
        for p in std::mem::take(&mut self.nodes[n].preds) {
            self.nodes[p].succs.remove(&n);
        }
        for s in std::mem::take(&mut self.nodes[n].succs) {
            self.nodes[s].preds.remove(&n);
        }
        self.nodes[n].alive = false;
    }

    /// Apply T2 and T4 until neither changes the graph. Returns the number of removed nodes.
    pub fn reduce(&mut self) -> usize {
        let before = self.len();
        let mut removed = 0;
        loop {
            removed += self.collapse_chains();
            let merged = self.collapse_cycles();
            removed += merged;
            if merged == 0 {
                break;
            }
        }
        info!(
            "Reduced graph of function {}: {} -> {} nodes",
            self.func.0,
            before,
            self.len()
        );
        removed
    }

    /// T2: splice out preserving nodes with a single predecessor or a single successor.
    fn collapse_chains(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let mut changed = false;
            for n in 1..self.nodes.len() {
                if !self.nodes[n].alive || self.nodes[n].kind != NodeKind::Preserving {
                    continue;
                }
                if self.remove_edge(n, n) {
                    changed = true;
                }

                let node = &self.nodes[n];
                if node.preds.len() == 1 {
                    let p = *node.preds.iter().next().unwrap_or(&n);
                    for s in node.succs.clone() {
                        self.add_edge(p, s);
                    }
                } else if node.succs.len() == 1 {
                    let s = *node.succs.iter().next().unwrap_or(&n);
                    for p in node.preds.clone() {
                        self.add_edge(p, s);
                    }
                } else if !(node.preds.is_empty() && node.succs.is_empty()) {
                    continue;
                }

                debug!("T2: removing node {}", n);
                self.delete(n);
                removed += 1;
                changed = true;
            }
            if !changed {
                break;
            }
        }
        removed
    }

    /// T4: merge every cycle made only of preserving nodes into its first member.
    fn collapse_cycles(&mut self) -> usize {
        let live = self.live_nodes().collect::<Vec<_>>();
        let sccs = tarjan(&live, |v| self.nodes[v].succs.iter().copied().collect::<Vec<_>>());

        let mut removed = 0;
        for scc in sccs {
            if scc.len() < 2 || !scc.iter().all(|&v| self.nodes[v].kind == NodeKind::Preserving) {
                continue;
            }
            let header = scc[0];
            let members = scc.iter().copied().collect::<BTreeSet<_>>();
            debug!("T4: merging {:?} into {}", scc, header);
            for &m in &scc[1..] {
                for p in self.nodes[m].preds.clone() {
                    if !members.contains(&p) {
                        self.add_edge(p, header);
                    }
                }
                for s in self.nodes[m].succs.clone() {
                    if !members.contains(&s) {
                        self.add_edge(header, s);
                    }
                }
                self.delete(m);
                removed += 1;
            }
            self.remove_edge(header, header);
        }
        removed
    }

    /// Log the graph structure.
    pub fn dump(&self, program: &Program) {
        let f = program.function(self.func);
        debug!("Graph of `{}`:", f.name);
        for n in self.live_nodes() {
            let node = &self.nodes[n];
            let label = match node.inst {
                Some(inst) => program.value_name(Value::Inst(self.func, inst)),
                None => "entry".to_string(),
            };
            debug!(
                "  [{}] {:?} {}: succs={:?} users={:?}",
                n, node.kind, label, node.succs, node.users
            );
        }
    }
}

/// Globals and functions named by an instruction must exist.
fn check_references(program: &Program, func: FuncId, inst: InstId) -> Result<()> {
    let f = program.function(func);
    let kind = &f.inst(inst).kind;
    let mut values = kind.operands();
    if let InstKind::Call { callee: Callee::Direct(c), .. } = kind {
        values.push(Value::Function(*c));
    }
    for value in values {
        let missing = match value {
            Value::Global(g) => program.globals.get(g.0 as usize).is_none(),
            Value::Function(c) => program.functions.get(c.0 as usize).is_none(),
            _ => false,
        };
        if missing {
            return Err(Error::InvalidProgram(format!(
                "instruction `{}` of `{}` refers to a missing {:?}",
                f.inst(inst).name,
                f.name,
                value
            )));
        }
    }
    Ok(())
}
