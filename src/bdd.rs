//! Manager-centric reduced ordered BDD with complement edges.
//!
//! All nodes live in the [`Bdd`] manager's unique table, so equal functions always
//! get equal [`Ref`] handles. Variables are 1-indexed; index 0 is reserved for the terminal.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;

use log::debug;

use crate::cache::Cache;
use crate::reference::Ref;
use crate::table::Table;
use crate::utils::{pairing3, PerfectHash};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            variable: 0,
            low: Ref::positive(0),
            high: Ref::positive(0),
        }
    }
}

impl PerfectHash for Node {
    fn hash(&self) -> u64 {
        pairing3(self.variable as u64, self.low.raw() as u64, self.high.raw() as u64)
    }
}

type Storage = Table<Node>;

impl Storage {
    pub fn variable(&self, index: usize) -> u32 {
        self.value(index).variable
    }
    pub fn low(&self, index: usize) -> Ref {
        self.value(index).low
    }
    pub fn high(&self, index: usize) -> Ref {
        self.value(index).high
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OpKey {
    Ite(Ref, Ref, Ref),
    Exists(Ref, Ref),
    RelProduct(Ref, Ref, Ref),
}

/// Largest accepted `storage_bits`: node indices must fit a [`Ref`] next to its negation bit.
pub const MAX_STORAGE_BITS: usize = 31;

pub struct Bdd {
    storage: RefCell<Storage>,
    cache: RefCell<Cache<OpKey, Ref>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new(storage_bits: usize) -> Self {
        assert!(
            storage_bits <= MAX_STORAGE_BITS,
            "Storage bits should be in the range 0..={}",
            MAX_STORAGE_BITS
        );

        let cache_bits = storage_bits.min(16);

        let mut storage = Storage::new(storage_bits);

        // Allocate the terminal node:
        let one = storage.add(Node::default());
        assert_eq!(one, 1); // Make sure the terminal node is (1).
        let one = Ref::positive(one as u32);
        let zero = -one;

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(cache_bits)),
            zero,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(20)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.borrow();
        f.debug_struct("Bdd")
            .field("capacity", &storage.capacity())
            .field("size", &storage.size())
            .finish()
    }
}

impl Bdd {
    /// Number of nodes in the unique table (including the terminal).
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().size()
    }

    /// Computed-table statistics: `(hits, misses)`.
    pub fn cache_stats(&self) -> (usize, usize) {
        let cache = self.cache.borrow();
        (cache.hits(), cache.misses())
    }

    pub fn variable(&self, index: u32) -> u32 {
        self.storage.borrow().variable(index as usize)
    }
    pub fn low(&self, index: u32) -> Ref {
        self.storage.borrow().low(index as usize)
    }
    pub fn high(&self, index: u32) -> Ref {
        self.storage.borrow().high(index as usize)
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        self.is_zero(node) || self.is_one(node)
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        debug!("mk(v = {}, low = {}, high = {})", v, low, high);

        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity
        if high.is_negated() {
            debug!("mk: restoring canonicity");
            return -self.mk_node(v, -low, -high);
        }

        // Handle duplicates
        if low == high {
            debug!("mk: duplicates {} == {}", low, high);
            return low;
        }

        let i = self.storage.borrow_mut().put(Node { variable: v, low, high });
        Ref::positive(i as u32)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");
        self.mk_node(v, self.zero, self.one)
    }

    /// Conjunction of literals given in DIMACS form (negative means negated).
    pub fn cube(&self, literals: impl IntoIterator<Item = i32>) -> Ref {
        let mut literals = literals.into_iter().collect::<Vec<_>>();
        literals.sort_by_key(|&v| v.abs());
        debug!("cube(literals = {:?})", literals);
        literals.reverse();
        let mut current = self.one;
        for lit in literals {
            assert_ne!(lit, 0, "Variable index should not be zero");
            current = if lit < 0 {
                self.mk_node(lit.unsigned_abs(), current, self.zero)
            } else {
                self.mk_node(lit as u32, self.zero, current)
            };
        }
        current
    }

    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        assert_ne!(v, 0, "Variable index should not be zero");

        let i = node.index();
        if self.is_terminal(node) || v < self.variable(i) {
            return (node, node);
        }
        assert_eq!(v, self.variable(i));
        if node.is_negated() {
            (-self.low(i), -self.high(i))
        } else {
            (self.low(i), self.high(i))
        }
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    ///
    /// # Examples
    ///
    /// ```
    /// use fs_pta::bdd::Bdd;
    ///
    /// let bdd = Bdd::default();
    /// let x = bdd.mk_var(1);
    /// let y = bdd.mk_var(2);
    /// let z = bdd.mk_var(3);
    /// let f = bdd.apply_ite(x, y, z);
    /// let x_and_y = bdd.apply_and(x, y);
    /// let not_x_and_z = bdd.apply_and(-x, z);
    /// assert_eq!(f, bdd.apply_or(x_and_y, not_x_and_z));
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        debug!("apply_ite(f = {}, g = {}, h = {})", f, g, h);

        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }

        // From now on, F is known not to be a constant
        assert!(!self.is_terminal(f));

        // More base cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        //   ite(F,1,~F) => 1
        //   ite(F,F,1) => 1
        //   ite(F,~F,0) => 0
        //   ite(F,0,F) => F
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }
        if self.is_one(g) && h == -f {
            return self.one;
        }
        if g == f && self.is_one(h) {
            return self.one;
        }
        if g == -f && self.is_zero(h) {
            return self.zero;
        }
        if self.is_zero(g) && h == f {
            return f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.apply_ite(f, self.one, h);
        }
        if h == f {
            return self.apply_ite(f, g, self.zero);
        }
        if g == -f {
            return self.apply_ite(f, self.zero, h);
        }
        if h == -f {
            return self.apply_ite(f, g, self.one);
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let k = self.variable(h.index());
        assert_ne!(i, 0);

        // Equivalent pairs (choose the one with the lowest variable):
        //   ite(F,1,H) == ite(H,1,F) == F ∨ H
        //   ite(F,G,0) == ite(G,F,0) == F ∧ G
        //   ite(F,G,1) == ite(~G,~F,1) == F -> G
        //   ite(F,0,H) == ite(~H,0,~F) == ~F ∧ H
        //   ite(F,G,~G) == ite(G,F,~F)
        if self.is_one(g) && k < i {
            return self.apply_ite(h, self.one, f);
        }
        if self.is_zero(h) && j < i {
            return self.apply_ite(g, f, self.zero);
        }
        if self.is_one(h) && j < i {
            return self.apply_ite(-g, -f, self.one);
        }
        if self.is_zero(g) && k < i {
            return self.apply_ite(-h, self.zero, -f);
        }
        if g == -h && j < i {
            return self.apply_ite(g, f, -f);
        }

        // Make sure the first two pointers (f and g) are regular (not negated)
        let (mut f, mut g, mut h) = (f, g, h);

        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let key = OpKey::Ite(f, g, h);
        let cached = self.cache.borrow_mut().get(&key);
        if let Some(res) = cached {
            debug!("cache: apply_ite(f = {}, g = {}, h = {}) -> {}", f, g, h, res);
            return if n { -res } else { res };
        }

        // Determine the top variable:
        let mut m = self.variable(f.index());
        let j = self.variable(g.index());
        let k = self.variable(h.index());
        if j != 0 {
            m = m.min(j);
        }
        if k != 0 {
            m = m.min(k);
        }
        assert_ne!(m, 0);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);

        let res = self.mk_node(m, e, t);
        debug!("computed: apply_ite(f = {}, g = {}, h = {}) -> {}", f, g, h, res);
        self.cache.borrow_mut().insert(key, res);

        if n {
            -res
        } else {
            res
        }
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        debug!("apply_and(u = {}, v = {})", u, v);
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        debug!("apply_or(u = {}, v = {})", u, v);
        self.apply_ite(u, self.one, v)
    }

    /// Set difference `u ∧ ¬v`.
    pub fn apply_diff(&self, u: Ref, v: Ref) -> Ref {
        debug!("apply_diff(u = {}, v = {})", u, v);
        self.apply_ite(v, self.zero, u)
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.zero;
        for node in nodes.into_iter() {
            res = self.apply_or(res, node);
        }
        res
    }

    /// Restrict `f` by a partial assignment of variables.
    pub fn restrict_multi(&self, f: Ref, values: &HashMap<u32, bool>) -> Ref {
        let mut cache = HashMap::new();
        self.restrict_multi_(f, values, &mut cache)
    }

    fn restrict_multi_(&self, f: Ref, values: &HashMap<u32, bool>, cache: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) || values.is_empty() {
            return f;
        }

        if let Some(&res) = cache.get(&f) {
            return res;
        }

        let i = self.variable(f.index());
        let res = if let Some(&b) = values.get(&i) {
            if b {
                // `i` needs to be assigned true
                self.restrict_multi_(self.high_node(f), values, cache)
            } else {
                // `i` needs to be assigned false
                self.restrict_multi_(self.low_node(f), values, cache)
            }
        } else {
            // `i` does not need to be assigned
            let low = self.restrict_multi_(self.low_node(f), values, cache);
            let high = self.restrict_multi_(self.high_node(f), values, cache);
            self.mk_node(i, low, high)
        };
        cache.insert(f, res);
        res
    }

    /// Existential quantification `∃vars. f`, where `vars` is a positive cube.
    pub fn exists(&self, f: Ref, vars: Ref) -> Ref {
        debug!("exists(f = {}, vars = {})", f, vars);

        if self.is_terminal(f) || self.is_one(vars) {
            return f;
        }
        assert!(!self.is_zero(vars), "Quantified cube should not be empty");

        let i = self.variable(f.index());

        // Skip quantified variables above the top of `f`.
        let mut vars = vars;
        while !self.is_one(vars) && self.variable(vars.index()) < i {
            vars = self.high_node(vars);
        }
        if self.is_one(vars) {
            return f;
        }

        let key = OpKey::Exists(f, vars);
        let cached = self.cache.borrow_mut().get(&key);
        if let Some(res) = cached {
            debug!("cache: exists(f = {}, vars = {}) -> {}", f, vars, res);
            return res;
        }

        let (f0, f1) = self.top_cofactors(f, i);
        let res = if self.variable(vars.index()) == i {
            let rest = self.high_node(vars);
            let r0 = self.exists(f0, rest);
            if self.is_one(r0) {
                self.one
            } else {
                let r1 = self.exists(f1, rest);
                self.apply_or(r0, r1)
            }
        } else {
            let low = self.exists(f0, vars);
            let high = self.exists(f1, vars);
            self.mk_node(i, low, high)
        };

        self.cache.borrow_mut().insert(key, res);
        res
    }

    /// Relational product `∃vars. (f ∧ g)`, computed without building the full conjunction.
    pub fn rel_product(&self, f: Ref, g: Ref, vars: Ref) -> Ref {
        debug!("rel_product(f = {}, g = {}, vars = {})", f, g, vars);

        if self.is_zero(f) || self.is_zero(g) || f == -g {
            return self.zero;
        }
        if self.is_one(f) {
            return self.exists(g, vars);
        }
        if self.is_one(g) || f == g {
            return self.exists(f, vars);
        }
        if self.is_one(vars) {
            return self.apply_and(f, g);
        }

        // Conjunction is commutative: normalize the operand order for the cache.
        let (f, g) = if f.raw() <= g.raw() { (f, g) } else { (g, f) };

        let m = self.variable(f.index()).min(self.variable(g.index()));

        let mut vars = vars;
        while !self.is_one(vars) && self.variable(vars.index()) < m {
            vars = self.high_node(vars);
        }
        if self.is_one(vars) {
            return self.apply_and(f, g);
        }

        let key = OpKey::RelProduct(f, g, vars);
        let cached = self.cache.borrow_mut().get(&key);
        if let Some(res) = cached {
            debug!("cache: rel_product(f = {}, g = {}, vars = {}) -> {}", f, g, vars, res);
            return res;
        }

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let res = if self.variable(vars.index()) == m {
            let rest = self.high_node(vars);
            let r0 = self.rel_product(f0, g0, rest);
            if self.is_one(r0) {
                self.one
            } else {
                let r1 = self.rel_product(f1, g1, rest);
                self.apply_or(r0, r1)
            }
        } else {
            let low = self.rel_product(f0, g0, vars);
            let high = self.rel_product(f1, g1, vars);
            self.mk_node(m, low, high)
        };

        self.cache.borrow_mut().insert(key, res);
        res
    }

    /// Simultaneously rename variables of `f` according to `mapping` (missing variables stay).
    pub fn rename(&self, f: Ref, mapping: &HashMap<u32, u32>) -> Ref {
        let mut cache = HashMap::new();
        self.rename_(f, mapping, &mut cache)
    }

    fn rename_(&self, f: Ref, mapping: &HashMap<u32, u32>, cache: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }

        if let Some(&res) = cache.get(&f) {
            return res;
        }

        let i = self.variable(f.index());
        let low = self.rename_(self.low_node(f), mapping, cache);
        let high = self.rename_(self.high_node(f), mapping, cache);
        let v = mapping.get(&i).copied().unwrap_or(i);
        let res = self.apply_ite(self.mk_var(v), high, low);

        cache.insert(f, res);
        res
    }
}
