//! Binary relations over `Location × Location`, encoded as BDDs.
//!
//! Each column is a finite domain of `bits` boolean variables. The two columns are interleaved
//! in the variable order: bit `i` (MSB first) of the source column is variable `2i+1`,
//! bit `i` of the target column is variable `2i+2`.
//!
//! A *relation* is a BDD over both columns. A *set* is a BDD over a single column;
//! which column it lives in is tracked by the caller.

use std::collections::HashMap;

use log::debug;
use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::location::Location;
use crate::reference::Ref;
use crate::utils::bits_for;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Column {
    /// The pointer (left) side of a pair.
    Source,
    /// The pointee (right) side of a pair.
    Target,
}

impl Column {
    pub fn other(self) -> Column {
        match self {
            Column::Source => Column::Target,
            Column::Target => Column::Source,
        }
    }
}

pub struct Relations {
    bdd: Bdd,
    domain: u32,
    bits: u32,
    source_cube: Ref,
    target_cube: Ref,
    source_to_target: HashMap<u32, u32>,
    target_to_source: HashMap<u32, u32>,
}

impl Relations {
    /// Create a relation manager for locations `0..domain`.
    pub fn new(domain: u32, storage_bits: usize) -> Self {
        let domain = domain.max(1);
        let bits = bits_for(domain);
        debug!("Relations over {} locations, {} bits per column", domain, bits);

        let bdd = Bdd::new(storage_bits);
        let source_cube = bdd.cube((0..bits).map(|i| Self::var_of(Column::Source, i) as i32));
        let target_cube = bdd.cube((0..bits).map(|i| Self::var_of(Column::Target, i) as i32));
        let source_to_target = (0..bits)
            .map(|i| (Self::var_of(Column::Source, i), Self::var_of(Column::Target, i)))
            .collect::<HashMap<_, _>>();
        let target_to_source = source_to_target.iter().map(|(&s, &t)| (t, s)).collect();

        Self {
            bdd,
            domain,
            bits,
            source_cube,
            target_cube,
            source_to_target,
            target_to_source,
        }
    }

    fn var_of(column: Column, bit: u32) -> u32 {
        match column {
            Column::Source => 2 * bit + 1,
            Column::Target => 2 * bit + 2,
        }
    }

    /// The underlying BDD manager.
    pub fn bdd(&self) -> &Bdd {
        &self.bdd
    }

    /// Number of locations in the domain.
    pub fn domain(&self) -> u32 {
        self.domain
    }

    /// Number of bits per column.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Variables of a column, in ascending order.
    pub fn column_vars(&self, column: Column) -> Vec<u32> {
        (0..self.bits).map(|i| Self::var_of(column, i)).collect()
    }

    /// Positive cube of all variables of a column (used for quantification).
    pub fn column_cube(&self, column: Column) -> Ref {
        match column {
            Column::Source => self.source_cube,
            Column::Target => self.target_cube,
        }
    }

    fn assignment(&self, column: Column, loc: Location) -> HashMap<u32, bool> {
        assert!(loc.id() < self.domain, "Location {} is outside of the domain", loc);
        (0..self.bits)
            .map(|i| {
                let bit = (loc.id() >> (self.bits - 1 - i)) & 1 == 1;
                (Self::var_of(column, i), bit)
            })
            .collect()
    }

    pub fn empty(&self) -> Ref {
        self.bdd.zero
    }

    /// The singleton set `{loc}` in the given column.
    pub fn singleton(&self, column: Column, loc: Location) -> Ref {
        let literals = self.assignment(column, loc).into_iter().map(|(v, b)| if b { v as i32 } else { -(v as i32) });
        self.bdd.cube(literals)
    }

    /// The set of the given locations in the given column.
    pub fn set(&self, column: Column, locs: impl IntoIterator<Item = Location>) -> Ref {
        locs.into_iter()
            .fold(self.empty(), |acc, loc| self.union(acc, self.singleton(column, loc)))
    }

    /// The single pair `(x, y)`.
    pub fn pair(&self, x: Location, y: Location) -> Ref {
        self.bdd.apply_and(self.singleton(Column::Source, x), self.singleton(Column::Target, y))
    }

    /// Cartesian product of a source-column set and a target-column set.
    pub fn product(&self, sources: Ref, targets: Ref) -> Ref {
        self.bdd.apply_and(sources, targets)
    }

    pub fn union(&self, a: Ref, b: Ref) -> Ref {
        self.bdd.apply_or(a, b)
    }

    pub fn intersect(&self, a: Ref, b: Ref) -> Ref {
        self.bdd.apply_and(a, b)
    }

    pub fn difference(&self, a: Ref, b: Ref) -> Ref {
        self.bdd.apply_diff(a, b)
    }

    pub fn is_empty(&self, r: Ref) -> bool {
        self.bdd.is_zero(r)
    }

    /// Canonical handles make equality a constant-time comparison.
    pub fn equals(&self, a: Ref, b: Ref) -> bool {
        a == b
    }

    /// Fix `column` to `loc`; the result is a set over the other column.
    pub fn restrict(&self, r: Ref, column: Column, loc: Location) -> Ref {
        self.bdd.restrict_multi(r, &self.assignment(column, loc))
    }

    /// Relational product: `∃column. r ∧ s`.
    pub fn compose(&self, r: Ref, s: Ref, column: Column) -> Ref {
        self.bdd.rel_product(r, s, self.column_cube(column))
    }

    /// Move a single-column set from one column to the other.
    pub fn shift(&self, set: Ref, from: Column, to: Column) -> Ref {
        if from == to {
            return set;
        }
        let mapping = match from {
            Column::Source => &self.source_to_target,
            Column::Target => &self.target_to_source,
        };
        self.bdd.rename(set, mapping)
    }

    /// Is `loc` a member of the single-column `set`?
    pub fn contains(&self, set: Ref, column: Column, loc: Location) -> bool {
        !self.bdd.is_zero(self.restrict(set, column, loc))
    }

    /// Is `(x, y)` a member of the relation?
    pub fn contains_pair(&self, r: Ref, x: Location, y: Location) -> bool {
        let image = self.restrict(r, Column::Source, x);
        self.contains(image, Column::Target, y)
    }

    /// Number of elements of a single-column set.
    pub fn cardinality(&self, set: Ref) -> BigUint {
        self.bdd.sat_count(set, 2 * self.bits as usize) >> self.bits
    }

    /// Number of pairs in a relation.
    pub fn pair_count(&self, r: Ref) -> BigUint {
        self.bdd.sat_count(r, 2 * self.bits as usize)
    }

    pub fn is_singleton(&self, set: Ref) -> bool {
        self.cardinality(set) == BigUint::from(1u32)
    }

    /// Elements of a single-column set, in ascending order.
    pub fn elements(&self, set: Ref, column: Column) -> Vec<Location> {
        self.bdd
            .all_sat(set, &self.column_vars(column))
            .into_iter()
            .map(|bits| Location::new(bits.into_iter().fold(0, |acc, b| (acc << 1) | b as u32)))
            .collect()
    }

    /// Pairs of a relation, in ascending order.
    pub fn pairs(&self, r: Ref) -> Vec<(Location, Location)> {
        let vars = (1..=2 * self.bits).collect::<Vec<_>>();
        self.bdd
            .all_sat(r, &vars)
            .into_iter()
            .map(|bits| {
                let (mut x, mut y) = (0, 0);
                for pair in bits.chunks(2) {
                    x = (x << 1) | pair[0] as u32;
                    y = (y << 1) | pair[1] as u32;
                }
                (Location::new(x), Location::new(y))
            })
            .collect()
    }
}
