//! Fixpoint driver.
//!
//! The whole-program top-level relation is threaded through every step as `top: &mut Ref`;
//! per-node heap relations live in the flow graphs. Two worklists drive the computation:
//! pending functions, and per function the pending nodes. Once both drain, loads that
//! still read nothing are given the sentinel and the fixpoint is resumed.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::graph::{FlowGraph, NodeId, NodeKind, ENTRY};
use crate::ir::{Callee, Const, FuncId, GlobalInit, InstId, InstKind, Program, Value};
use crate::location::{Location, LocationMap};
use crate::reference::Ref;
use crate::relation::{Column, Relations};
use crate::worklist::Worklist;

/// A call node that may transfer control to some function.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CallSite {
    pub caller: FuncId,
    pub node: NodeId,
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub locations: u32,
    pub functions: usize,
    pub nodes: usize,
    pub reduced_nodes: usize,
    pub node_visits: usize,
    pub repairs: usize,
    pub repair_rounds: usize,
    pub bdd_nodes: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

pub(crate) struct Solver<'p> {
    pub(crate) program: &'p Program,
    pub(crate) config: AnalysisConfig,
    pub(crate) locs: LocationMap,
    pub(crate) rel: Relations,
    pub(crate) graphs: Vec<Option<FlowGraph>>,
    pub(crate) call_sites: HashMap<FuncId, BTreeSet<CallSite>>,
    /// Storage cells of all globals, as a target-column set.
    pub(crate) globals_storage: Ref,
    pub(crate) functions: Worklist<FuncId>,
    pub(crate) nodes: Vec<Worklist<NodeId>>,
    pub(crate) stats: Stats,
}

impl<'p> Solver<'p> {
    fn new(program: &'p Program, config: AnalysisConfig) -> Result<Self> {
        let locs = LocationMap::build(program)?;
        let rel = Relations::new(locs.len(), config.storage_bits);

        let mut stats = Stats {
            locations: locs.len(),
            ..Stats::default()
        };

        let mut graphs = Vec::with_capacity(program.functions.len());
        for f in program.function_ids() {
            if program.function(f).is_declaration() {
                graphs.push(None);
                continue;
            }
            let mut graph = FlowGraph::build(program, f, rel.empty())?;
            stats.nodes += graph.len();
            stats.reduced_nodes += graph.reduce();
            graph.dump(program);
            stats.functions += 1;
            graphs.push(Some(graph));
        }
        info!(
            "Built {} flow graphs: {} nodes, {} removed by reduction",
            stats.functions, stats.nodes, stats.reduced_nodes
        );

        let globals_storage = rel.set(
            Column::Target,
            program
                .global_ids()
                .map(|g| locs.lookup(Value::Global(g)).storage()),
        );

        Ok(Self {
            program,
            nodes: vec![Worklist::new(); program.functions.len()],
            config,
            locs,
            rel,
            graphs,
            call_sites: HashMap::new(),
            globals_storage,
            functions: Worklist::new(),
            stats,
        })
    }

    pub(crate) fn graph(&self, f: FuncId) -> Result<&FlowGraph> {
        self.graphs[f.0 as usize]
            .as_ref()
            .ok_or_else(|| Error::MissingGraph(self.program.function(f).name.clone()))
    }

    pub(crate) fn graph_mut(&mut self, f: FuncId) -> Result<&mut FlowGraph> {
        let program = self.program;
        self.graphs[f.0 as usize]
            .as_mut()
            .ok_or_else(|| Error::MissingGraph(program.function(f).name.clone()))
    }

    /// Human-readable name of a location, for logging.
    pub(crate) fn name(&self, loc: Location) -> &str {
        self.locs.name(loc)
    }

    pub(crate) fn enqueue(&mut self, f: FuncId, n: NodeId) {
        self.nodes[f.0 as usize].push(n);
        self.functions.push(f);
    }

    pub(crate) fn enqueue_users(&mut self, f: FuncId, n: NodeId) -> Result<()> {
        let users = self.graph(f)?.node(n).users.iter().copied().collect::<Vec<_>>();
        for user in users {
            self.enqueue(f, user);
        }
        Ok(())
    }

    /// Record that `site` may call `callee`. Returns `true` if the site is new.
    pub(crate) fn add_call_site(&mut self, callee: FuncId, site: CallSite) -> Result<bool> {
        if !self.call_sites.entry(callee).or_default().insert(site) {
            return Ok(false);
        }
        debug!(
            "New call site of `{}` in `{}` (node {})",
            self.program.function(callee).name,
            self.program.function(site.caller).name,
            site.node
        );
        // Returns must report back to the new caller.
        let returns = self.graph(callee)?.returns().to_vec();
        for r in returns {
            self.enqueue(callee, r);
        }
        Ok(true)
    }

    /// Seed the initial facts and fill the worklists.
    fn seed(&mut self, top: &mut Ref) -> Result<()> {
        let program = self.program;

        // Every global and function points to its own storage / identity.
        let mut seeds = Vec::new();
        for g in program.global_ids() {
            let loc = self.locs.lookup(Value::Global(g));
            seeds.push(self.rel.pair(loc, loc.storage()));
        }
        let callable = callable_functions(program);
        for f in program.function_ids() {
            let loc = self.locs.lookup(Value::Function(f));
            seeds.push(self.rel.pair(loc, loc.storage()));
            if callable.contains(&f) {
                // Parameters get their facts from the call sites.
                continue;
            }
            for i in 0..program.function(f).signature.params.len() as u32 {
                let arg = self.locs.lookup(Value::Arg(f, i));
                seeds.push(self.rel.pair(arg, arg.storage()));
            }
        }
        *top = self.rel.bdd().apply_or_many(seeds);

        // Initial contents of global storage.
        let mut heap = self.rel.empty();
        for g in program.global_ids() {
            let cell = self.locs.lookup(Value::Global(g)).storage();
            let target = match &program.global(g).init {
                None | Some(GlobalInit::Address(Value::Const(Const::Null))) => continue,
                Some(GlobalInit::Address(Value::Global(h))) => self.locs.lookup(Value::Global(*h)).storage(),
                Some(GlobalInit::Address(Value::Function(f))) => {
                    self.locs.identity(*f).unwrap_or(Location::EVERYTHING)
                }
                Some(GlobalInit::Address(_)) | Some(GlobalInit::Opaque) => Location::EVERYTHING,
            };
            debug!("Global initializer: {} -> {}", self.name(cell), self.name(target));
            heap = self.rel.union(heap, self.rel.pair(cell, target));
        }

        for f in program.function_ids() {
            let Some(graph) = self.graphs[f.0 as usize].as_mut() else { continue };
            graph.node_mut(ENTRY).heap_in = heap;

            let live = graph.live_nodes().collect::<Vec<_>>();
            let mut direct = Vec::new();
            for n in live {
                let node = graph.node(n);
                if node.kind == NodeKind::Return {
                    continue;
                }
                if let Some(inst) = node.inst {
                    if let InstKind::Call { callee: Callee::Direct(callee), args, .. } = &program.function(f).inst(inst).kind {
                        direct.push((*callee, args.len(), n));
                    }
                }
                self.nodes[f.0 as usize].push(n);
            }
            self.functions.push(f);

            for (callee, actual, n) in direct {
                self.check_arity(callee, actual)?;
                if !program.function(callee).is_declaration() {
                    self.add_call_site(callee, CallSite { caller: f, node: n })?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn check_arity(&self, callee: FuncId, actual: usize) -> Result<()> {
        let sig = &self.program.function(callee).signature;
        let expected = sig.params.len();
        if actual == expected || (sig.variadic && actual >= expected) {
            Ok(())
        } else {
            Err(Error::ArityMismatch {
                callee: self.program.function(callee).name.clone(),
                expected,
                actual,
            })
        }
    }

    /// Drain both worklists.
    fn solve(&mut self, top: &mut Ref) -> Result<()> {
        while let Some(f) = self.functions.pop() {
            debug!("Processing function `{}`", self.program.function(f).name);
            while let Some(n) = self.nodes[f.0 as usize].pop() {
                self.stats.node_visits += 1;
                self.process(top, f, n)?;
            }
        }
        Ok(())
    }

    fn process(&mut self, top: &mut Ref, f: FuncId, n: NodeId) -> Result<()> {
        let kind = self.graph(f)?.node(n).kind;
        match kind {
            NodeKind::Entry | NodeKind::Preserving => self.process_preserving(f, n),
            NodeKind::Alloc => self.process_alloc(top, f, n),
            NodeKind::Copy => self.process_copy(top, f, n),
            NodeKind::Load => self.process_load(top, f, n),
            NodeKind::Store => self.process_store(top, f, n),
            NodeKind::Call => self.process_call(top, f, n),
            NodeKind::Return => self.process_return(top, f, n),
        }
    }

    /// Loads that read nothing although their pointer was resolved.
    fn unresolved_loads(&self, top: Ref) -> Result<Vec<(FuncId, NodeId, Location)>> {
        let mut loads = Vec::new();
        for f in self.program.function_ids() {
            let Some(graph) = self.graphs[f.0 as usize].as_ref() else { continue };
            for n in graph.live_nodes() {
                let node = graph.node(n);
                if node.kind != NodeKind::Load || !node.uninit {
                    continue;
                }
                let Some(inst) = node.inst else { continue };
                let x = self
                    .locs
                    .get(Value::Inst(f, inst))
                    .ok_or_else(|| Error::MissingLocation(self.program.value_name(Value::Inst(f, inst))))?;
                if self.rel.is_empty(self.rel.restrict(top, Column::Source, x)) {
                    loads.push((f, n, x));
                }
            }
        }
        Ok(loads)
    }

    /// Main fixpoint with the uninitialized-load repair loop around it.
    fn run(&mut self, top: &mut Ref) -> Result<()> {
        loop {
            self.solve(top)?;

            let loads = self.unresolved_loads(*top)?;
            for graph in self.graphs.iter_mut().flatten() {
                let live = graph.live_nodes().collect::<Vec<_>>();
                for n in live {
                    graph.node_mut(n).uninit = false;
                }
            }
            if loads.is_empty() {
                break;
            }

            if self.stats.repair_rounds >= self.config.max_repair_rounds {
                let loads = loads.iter().map(|&(_, _, x)| self.name(x).to_string()).collect();
                return Err(Error::NotConverged {
                    rounds: self.stats.repair_rounds,
                    loads,
                });
            }

            self.stats.repair_rounds += 1;
            for (f, n, x) in loads {
                warn!("Load `{}` reads uninitialized memory, assuming it may point anywhere", self.name(x));
                *top = self.rel.union(*top, self.rel.pair(x, Location::EVERYTHING));
                self.stats.repairs += 1;
                self.enqueue_users(f, n)?;
            }
        }

        let bdd = self.rel.bdd();
        self.stats.bdd_nodes = bdd.num_nodes();
        (self.stats.cache_hits, self.stats.cache_misses) = bdd.cache_stats();
        info!(
            "Fixpoint reached after {} node visits and {} repair rounds ({} BDD nodes)",
            self.stats.node_visits, self.stats.repair_rounds, self.stats.bdd_nodes
        );
        Ok(())
    }
}

/// Functions some call in the program may bind: direct callees and functions whose
/// identity is taken, either as an operand or by a global initializer.
fn callable_functions(program: &Program) -> HashSet<FuncId> {
    let mut callable = HashSet::new();
    for inst in program.functions.iter().flat_map(|func| func.insts.iter()) {
        if let InstKind::Call { callee: Callee::Direct(c), .. } = &inst.kind {
            callable.insert(*c);
        }
        for value in inst.kind.operands() {
            if let Value::Function(f) = value {
                callable.insert(f);
            }
        }
    }
    for global in &program.globals {
        if let Some(GlobalInit::Address(Value::Function(f))) = &global.init {
            callable.insert(*f);
        }
    }
    callable
}

/// Result of the analysis: a read-only view of the final relations.
pub struct PointsTo<'p> {
    pub(crate) program: &'p Program,
    pub(crate) locs: LocationMap,
    pub(crate) rel: Relations,
    pub(crate) top: Ref,
    graphs: Vec<Option<FlowGraph>>,
    stats: Stats,
}

/// Analyze `program` with the default configuration.
pub fn analyze(program: &Program) -> Result<PointsTo<'_>> {
    analyze_with(program, AnalysisConfig::default())
}

pub fn analyze_with(program: &Program, config: AnalysisConfig) -> Result<PointsTo<'_>> {
    info!(
        "Analyzing {} globals and {} functions",
        program.globals.len(),
        program.functions.len()
    );
    config.validate()?;
    let mut solver = Solver::new(program, config)?;
    let mut top = solver.rel.empty();
    solver.seed(&mut top)?;
    solver.run(&mut top)?;

    Ok(PointsTo {
        program,
        locs: solver.locs,
        rel: solver.rel,
        top,
        graphs: solver.graphs,
        stats: solver.stats,
    })
}

impl PointsTo<'_> {
    pub fn program(&self) -> &Program {
        self.program
    }

    pub fn locations(&self) -> &LocationMap {
        &self.locs
    }

    pub fn relations(&self) -> &Relations {
        &self.rel
    }

    /// The final top-level relation.
    pub fn top_level(&self) -> Ref {
        self.top
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Targets of a value as a target-column set (the sentinel for untracked values).
    pub(crate) fn image(&self, value: Value) -> Ref {
        match value {
            Value::Const(Const::Null) => self.rel.empty(),
            _ => match self.locs.get(value) {
                Some(loc) => self.rel.restrict(self.top, Column::Source, loc),
                None => self.rel.singleton(Column::Target, Location::EVERYTHING),
            },
        }
    }

    /// Locations `value` may point to.
    pub fn points_to(&self, value: Value) -> Vec<Location> {
        self.rel.elements(self.image(value), Column::Target)
    }

    pub fn points_to_everything(&self, value: Value) -> bool {
        self.rel.contains(self.image(value), Column::Target, Location::EVERYTHING)
    }

    /// Heap relation right after instruction `inst` of `func`, if it is part of the reduced graph.
    pub fn heap_after(&self, func: FuncId, inst: InstId) -> Option<Ref> {
        let graph = self.graphs.get(func.0 as usize)?.as_ref()?;
        graph.node_of(inst).map(|n| graph.node(n).heap_out)
    }

    /// What the storage cell `cell` holds right after instruction `inst` of `func`.
    pub fn cell_after(&self, func: FuncId, inst: InstId, cell: Location) -> Option<Vec<Location>> {
        let heap = self.heap_after(func, inst)?;
        let contents = self.rel.restrict(heap, Column::Source, cell);
        Some(self.rel.elements(contents, Column::Target))
    }

    /// Function-call graph edges discovered by the analysis: `(caller, callee)`.
    pub fn call_edges(&self) -> Vec<(FuncId, FuncId)> {
        let mut edges = BTreeSet::new();
        for caller in self.program.function_ids() {
            let Some(graph) = self.graphs[caller.0 as usize].as_ref() else { continue };
            for n in graph.live_nodes() {
                let Some(inst) = graph.node(n).inst else { continue };
                let InstKind::Call { callee, signature, .. } = &self.program.function(caller).inst(inst).kind else {
                    continue;
                };
                match callee {
                    Callee::Direct(c) => {
                        edges.insert((caller, *c));
                    }
                    Callee::Indirect(fptr) => {
                        let image = self.image(*fptr);
                        let any = self.rel.contains(image, Column::Target, Location::EVERYTHING);
                        for t in self.program.function_ids() {
                            if self.program.function(t).signature != *signature {
                                continue;
                            }
                            let hit = self
                                .locs
                                .identity(t)
                                .is_some_and(|id| self.rel.contains(image, Column::Target, id));
                            if any || hit {
                                edges.insert((caller, t));
                            }
                        }
                    }
                }
            }
        }
        edges.into_iter().collect()
    }
}
