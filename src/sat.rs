use std::collections::HashMap;

use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Enumerates all assignments to `vars` (sorted in ascending order) that satisfy `node`.
    ///
    /// `node` must not depend on variables outside of `vars`.
    pub fn all_sat(&self, node: Ref, vars: &[u32]) -> Vec<Vec<bool>> {
        debug_assert!(vars.windows(2).all(|w| w[0] < w[1]));
        let mut models = Vec::new();
        let mut prefix = Vec::with_capacity(vars.len());
        self._all_sat(node, vars, &mut prefix, &mut models);
        models
    }

    fn _all_sat(&self, node: Ref, vars: &[u32], prefix: &mut Vec<bool>, models: &mut Vec<Vec<bool>>) {
        if self.is_zero(node) {
            return;
        }
        let Some((&v, rest)) = vars.split_first() else {
            assert!(self.is_one(node), "Function depends on variables outside of the enumerated set");
            models.push(prefix.clone());
            return;
        };

        let (low, high) = self.top_cofactors(node, v);
        prefix.push(false);
        self._all_sat(low, rest, prefix, models);
        prefix.pop();
        prefix.push(true);
        self._all_sat(high, rest, prefix, models);
        prefix.pop();
    }

    /// Counts satisfying assignments over variables `1..=num_vars`.
    pub fn sat_count(&self, node: Ref, num_vars: usize) -> BigUint {
        let mut cache = HashMap::new();
        let max = BigUint::from(1u32) << num_vars;
        self._sat_count(node, &max, &mut cache)
    }

    fn _sat_count(&self, node: Ref, max: &BigUint, cache: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(node) {
            return BigUint::ZERO;
        } else if self.is_one(node) {
            return max.clone();
        }

        if let Some(count) = cache.get(&node) {
            return count.clone();
        }

        let low = self.low(node.index());
        let high = self.high(node.index());

        let count_low = self._sat_count(low, max, cache);
        let count_high = self._sat_count(high, max, cache);

        let count: BigUint = (count_low + count_high) >> 1;
        let count = if node.is_negated() { max - count } else { count };

        cache.insert(node, count.clone());
        count
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_all_sat() {
        let bdd = Bdd::default();

        // x1 xor x3
        let (x1, x3) = (bdd.mk_var(1), bdd.mk_var(3));
        let f = bdd.apply_or(bdd.apply_and(x1, -x3), bdd.apply_and(-x1, x3));
        let models = bdd.all_sat(f, &[1, 3]);
        assert_eq!(models, vec![vec![false, true], vec![true, false]]);

        // don't-care variables are expanded
        let g = bdd.mk_var(2);
        let models = bdd.all_sat(g, &[1, 2]);
        assert_eq!(models, vec![vec![false, true], vec![true, true]]);

        assert!(bdd.all_sat(bdd.zero, &[1, 2]).is_empty());
    }

    #[test]
    fn test_sat_count_terminal() {
        let bdd = Bdd::default();

        assert_eq!(bdd.sat_count(bdd.zero, 3), BigUint::from(0u32));
        assert_eq!(bdd.sat_count(bdd.one, 1), BigUint::from(2u32));
        assert_eq!(bdd.sat_count(bdd.one, 3), BigUint::from(8u32));
    }

    #[test]
    fn test_sat_count_var() {
        let bdd = Bdd::default();

        let x2 = bdd.mk_var(2);
        assert_eq!(bdd.sat_count(x2, 2), BigUint::from(2u32));
        assert_eq!(bdd.sat_count(x2, 3), BigUint::from(4u32));
    }

    #[test]
    fn test_sat_count_cube() {
        let bdd = Bdd::default();

        let f = bdd.cube([1, 2]);
        assert_eq!(bdd.sat_count(f, 2), BigUint::from(1u32));
        assert_eq!(bdd.sat_count(f, 4), BigUint::from(4u32));

        let g = -f;
        assert_eq!(bdd.sat_count(g, 2), BigUint::from(3u32));
        assert_eq!(bdd.sat_count(g, 4), BigUint::from(12u32));
    }
}
