//! Per-node transfer functions.
//!
//! Every function receives the top-level relation explicitly and updates the node's
//! heap state in its flow graph. Changes are pushed forward eagerly: a grown top-level
//! fact enqueues the node's users, a grown heap enqueues the successors.

use log::debug;

use crate::analysis::{CallSite, Solver};
use crate::config::HeapFilter;
use crate::error::{Error, Result};
use crate::graph::{NodeId, ENTRY};
use crate::ir::{Callee, Const, FuncId, InstId, InstKind, Signature, Value};
use crate::location::Location;
use crate::reference::Ref;
use crate::relation::Column;

impl<'p> Solver<'p> {
    /// Image of `value` as a target-column set, and whether the value is tracked at all.
    ///
    /// Untracked values may point anywhere; `null` points nowhere.
    pub(crate) fn top_of(&self, top: Ref, value: Value) -> (Ref, bool) {
        match value {
            Value::Const(Const::Null) => (self.rel.empty(), true),
            _ => match self.locs.get(value) {
                Some(loc) => (self.rel.restrict(top, Column::Source, loc), true),
                None => (self.everything(), false),
            },
        }
    }

    fn everything(&self) -> Ref {
        self.rel.singleton(Column::Target, Location::EVERYTHING)
    }

    fn describe(&self, set: Ref, column: Column) -> String {
        let names = self
            .rel
            .elements(set, column)
            .into_iter()
            .map(|loc| self.name(loc).to_string())
            .collect::<Vec<_>>();
        format!("{{{}}}", names.join(", "))
    }

    fn inst_id(&self, f: FuncId, n: NodeId) -> Result<InstId> {
        self.graph(f)?
            .node(n)
            .inst
            .ok_or_else(|| Error::InvalidProgram(format!("node {} of `{}` has no instruction", n, self.program.function(f).name)))
    }

    fn kind(&self, f: FuncId, n: NodeId) -> Result<&'p InstKind> {
        let program = self.program;
        Ok(&program.function(f).inst(self.inst_id(f, n)?).kind)
    }

    /// Location defined by the instruction of node `n`.
    fn def(&self, f: FuncId, n: NodeId) -> Result<Location> {
        let value = Value::Inst(f, self.inst_id(f, n)?);
        self.locs
            .get(value)
            .ok_or_else(|| Error::MissingLocation(self.program.value_name(value)))
    }

    fn mismatch(&self, f: FuncId, n: NodeId) -> Error {
        Error::InvalidProgram(format!(
            "node {} of `{}` does not match its instruction",
            n,
            self.program.function(f).name
        ))
    }

    /// Add `facts` to the top-level relation; on growth enqueue the users of `n`.
    pub(crate) fn propagate_top(&mut self, top: &mut Ref, f: FuncId, n: NodeId, facts: Ref) -> Result<bool> {
        let new = self.rel.union(*top, facts);
        if new == *top {
            return Ok(false);
        }
        *top = new;
        self.enqueue_users(f, n)?;
        Ok(true)
    }

    /// Union the heap out-state of `n` into its successors; enqueue those that grew.
    pub(crate) fn propagate_heap(&mut self, f: FuncId, n: NodeId) -> Result<bool> {
        let graph = self.graph(f)?;
        let out = graph.node(n).heap_out;
        let updates = graph
            .node(n)
            .succs
            .iter()
            .filter_map(|&s| {
                let old = graph.node(s).heap_in;
                let new = self.rel.union(old, out);
                (new != old).then_some((s, new))
            })
            .collect::<Vec<_>>();

        let graph = self.graph_mut(f)?;
        for &(s, new) in &updates {
            graph.node_mut(s).heap_in = new;
        }
        for &(s, _) in &updates {
            self.enqueue(f, s);
        }
        Ok(!updates.is_empty())
    }

    fn set_out(&mut self, f: FuncId, n: NodeId, out: Ref) -> Result<()> {
        self.graph_mut(f)?.node_mut(n).heap_out = out;
        Ok(())
    }

    /// `out = in`, then propagate.
    fn pass_through(&mut self, f: FuncId, n: NodeId) -> Result<()> {
        let heap_in = self.graph(f)?.node(n).heap_in;
        self.set_out(f, n, heap_in)?;
        self.propagate_heap(f, n)?;
        Ok(())
    }

    /// Entry and preserving nodes only forward the heap.
    pub(crate) fn process_preserving(&mut self, f: FuncId, n: NodeId) -> Result<()> {
        self.pass_through(f, n)
    }

    /// `x = alloc`: x points to its own storage cell.
    pub(crate) fn process_alloc(&mut self, top: &mut Ref, f: FuncId, n: NodeId) -> Result<()> {
        let x = self.def(f, n)?;
        let facts = self.rel.pair(x, x.storage());
        if self.propagate_top(top, f, n, facts)? {
            debug!("alloc: {} -> {}", self.name(x), self.name(x.storage()));
        }
        self.pass_through(f, n)
    }

    /// `x = merge(v1, ..., vk)`: x points to whatever any operand points to.
    pub(crate) fn process_copy(&mut self, top: &mut Ref, f: FuncId, n: NodeId) -> Result<()> {
        let InstKind::Copy { sources } = self.kind(f, n)? else {
            return Err(self.mismatch(f, n));
        };
        let x = self.def(f, n)?;

        let mut operands = Vec::with_capacity(sources.len());
        let mut unresolved = false;
        for &v in sources {
            match v {
                Value::Const(Const::Null) => {}
                _ => match self.locs.get(v) {
                    Some(loc) => operands.push(loc),
                    None => unresolved = true,
                },
            }
        }

        let operands = self.rel.set(Column::Source, operands);
        let mut image = self.rel.compose(*top, operands, Column::Source);
        if unresolved {
            image = self.rel.union(image, self.everything());
        }

        let facts = self.rel.product(self.rel.singleton(Column::Source, x), image);
        if self.propagate_top(top, f, n, facts)? {
            debug!("copy: {} -> {}", self.name(x), self.describe(image, Column::Target));
        }
        self.pass_through(f, n)
    }

    /// `x = *p`: x points to whatever the cells p may point to hold.
    ///
    /// Cells written through an unknown address (the sentinel cell) may be read through any pointer.
    pub(crate) fn process_load(&mut self, top: &mut Ref, f: FuncId, n: NodeId) -> Result<()> {
        let InstKind::Load { ptr } = self.kind(f, n)? else {
            return Err(self.mismatch(f, n));
        };
        let x = self.def(f, n)?;
        let (targets, resolved) = self.top_of(*top, *ptr);

        let cells = self
            .rel
            .shift(self.rel.union(targets, self.everything()), Column::Target, Column::Source);
        let heap_in = self.graph(f)?.node(n).heap_in;
        let mut image = self.rel.compose(heap_in, cells, Column::Source);
        if self.rel.contains(targets, Column::Target, Location::EVERYTHING) {
            image = self.rel.union(image, self.everything());
        }

        let uninit = resolved && self.rel.is_empty(image);
        self.graph_mut(f)?.node_mut(n).uninit = uninit;

        let facts = self.rel.product(self.rel.singleton(Column::Source, x), image);
        if self.propagate_top(top, f, n, facts)? {
            debug!(
                "load: {} <- *{} = {}",
                self.name(x),
                self.describe(targets, Column::Target),
                self.describe(image, Column::Target)
            );
        }
        self.pass_through(f, n)
    }

    /// `*p = v`: strong update when p surely names one known cell, weak update otherwise.
    pub(crate) fn process_store(&mut self, top: &mut Ref, f: FuncId, n: NodeId) -> Result<()> {
        let InstKind::Store { value, ptr } = self.kind(f, n)? else {
            return Err(self.mismatch(f, n));
        };
        let (targets, resolved) = self.top_of(*top, *ptr);
        let (values, _) = self.top_of(*top, *value);

        let cells = self.rel.shift(targets, Column::Target, Column::Source);
        let written = self.rel.product(cells, values);
        let heap_in = self.graph(f)?.node(n).heap_in;

        let strong = resolved
            && !self.rel.contains(targets, Column::Target, Location::EVERYTHING)
            && self.rel.is_singleton(targets);
        let out = if strong {
            self.rel.union(self.rel.difference(heap_in, cells), written)
        } else {
            self.rel.union(heap_in, written)
        };
        debug!(
            "store ({}): *{} = {}",
            if strong { "strong" } else { "weak" },
            self.describe(targets, Column::Target),
            self.describe(values, Column::Target)
        );

        self.set_out(f, n, out)?;
        self.propagate_heap(f, n)?;
        Ok(())
    }

    /// Functions an indirect call through `fptr` with the declared `signature` may reach.
    pub(crate) fn resolve_targets(&self, top: Ref, fptr: Value, signature: &Signature) -> Vec<FuncId> {
        let program = self.program;
        let (image, resolved) = self.top_of(top, fptr);
        let any = !resolved || self.rel.contains(image, Column::Target, Location::EVERYTHING);
        program
            .function_ids()
            .filter(|&t| program.function(t).signature == *signature)
            .filter(|&t| {
                any || self
                    .locs
                    .identity(t)
                    .is_some_and(|id| self.rel.contains(image, Column::Target, id))
            })
            .collect()
    }

    /// Part of the caller's heap the callee may observe.
    pub(crate) fn heap_filter(&self, heap: Ref, top: Ref, args: &[Value]) -> Ref {
        if self.config.heap_filter == HeapFilter::Full {
            return heap;
        }

        let mut reach = self.globals_storage;
        for &a in args {
            let (image, _) = self.top_of(top, a);
            reach = self.rel.union(reach, image);
        }
        loop {
            if self.rel.contains(reach, Column::Target, Location::EVERYTHING) {
                return heap;
            }
            let cells = self.rel.shift(reach, Column::Target, Column::Source);
            let next = self.rel.union(reach, self.rel.compose(heap, cells, Column::Source));
            if next == reach {
                break;
            }
            reach = next;
        }

        // Facts stored through unknown pointers are always visible.
        let cells = self.rel.shift(self.rel.union(reach, self.everything()), Column::Target, Column::Source);
        self.rel.intersect(heap, cells)
    }

    /// Bind the formals of `callee` to the images of the actuals.
    ///
    /// Variadic extras have no formal and are dropped.
    fn bind_params(&mut self, top: &mut Ref, callee: FuncId, args: &[Value]) -> Result<()> {
        let params = self.program.function(callee).signature.params.len();
        let mut changed = false;
        for (i, &actual) in args.iter().take(params).enumerate() {
            let param = self.locs.lookup(Value::Arg(callee, i as u32));
            let (image, _) = self.top_of(*top, actual);
            let new = self
                .rel
                .union(*top, self.rel.product(self.rel.singleton(Column::Source, param), image));
            if new != *top {
                *top = new;
                changed = true;
            }
        }
        if changed {
            debug!("bound parameters of `{}`", self.program.function(callee).name);
            self.enqueue_users(callee, ENTRY)?;
        }
        Ok(())
    }

    /// `x = call f(a1, ..., ak)`.
    pub(crate) fn process_call(&mut self, top: &mut Ref, f: FuncId, n: NodeId) -> Result<()> {
        let program = self.program;
        let inst = self.inst_id(f, n)?;
        let InstKind::Call { callee, args, signature } = &program.function(f).inst(inst).kind else {
            return Err(self.mismatch(f, n));
        };

        let targets = match callee {
            Callee::Direct(c) => vec![*c],
            Callee::Indirect(fptr) => self.resolve_targets(*top, *fptr, signature),
        };
        let result = self.locs.get(Value::Inst(f, inst));
        let node = self.graph(f)?.node(n);
        let (heap_in, returned) = (node.heap_in, node.returned);

        let has_body = targets.iter().any(|&t| !program.function(t).is_declaration());
        let filter = if has_body {
            self.heap_filter(heap_in, *top, args)
        } else {
            self.rel.empty()
        };

        for t in targets {
            self.check_arity(t, args.len())?;
            if program.function(t).is_declaration() {
                // Unknown code may return anything.
                if let Some(x) = result {
                    let facts = self.rel.pair(x, Location::EVERYTHING);
                    self.propagate_top(top, f, n, facts)?;
                }
                continue;
            }

            self.bind_params(top, t, args)?;

            let entry_in = self.graph(t)?.node(ENTRY).heap_in;
            let new_in = self.rel.union(entry_in, filter);
            if new_in != entry_in {
                self.graph_mut(t)?.node_mut(ENTRY).heap_in = new_in;
                self.enqueue(t, ENTRY);
            }

            self.add_call_site(t, CallSite { caller: f, node: n })?;
        }

        let out = if has_body {
            self.rel.union(self.rel.difference(heap_in, filter), returned)
        } else {
            heap_in
        };
        self.set_out(f, n, out)?;
        self.propagate_heap(f, n)?;
        Ok(())
    }

    /// `return v`: report the value and the heap back to every known call site.
    pub(crate) fn process_return(&mut self, top: &mut Ref, f: FuncId, n: NodeId) -> Result<()> {
        let InstKind::Return { value } = self.kind(f, n)? else {
            return Err(self.mismatch(f, n));
        };
        let image = value.map(|v| self.top_of(*top, v).0);

        let heap = self.graph(f)?.node(n).heap_in;
        self.set_out(f, n, heap)?;

        let sites = self
            .call_sites
            .get(&f)
            .map(|sites| sites.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        for site in sites {
            let call = self.graph(site.caller)?.node(site.node);
            let call_inst = call.inst;
            let returned = self.rel.union(call.returned, heap);
            if returned != call.returned {
                self.graph_mut(site.caller)?.node_mut(site.node).returned = returned;
                self.enqueue(site.caller, site.node);
            }

            let captured = call_inst.and_then(|inst| self.locs.get(Value::Inst(site.caller, inst)));
            if let (Some(x), Some(image)) = (captured, image) {
                let facts = self.rel.product(self.rel.singleton(Column::Source, x), image);
                if self.propagate_top(top, site.caller, site.node, facts)? {
                    debug!("return: {} <- {}", self.name(x), self.describe(image, Column::Target));
                }
            }
        }

        self.propagate_heap(f, n)?;
        Ok(())
    }
}
