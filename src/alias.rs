use std::fmt::{Display, Formatter};

use log::debug;

use crate::analysis::PointsTo;
use crate::ir::{Ty, Value};
use crate::location::Location;
use crate::reference::Ref;
use crate::relation::Column;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AliasResult {
    NoAlias,
    MayAlias,
    MustAlias,
}

impl Display for AliasResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AliasResult::NoAlias => "NoAlias",
            AliasResult::MayAlias => "MayAlias",
            AliasResult::MustAlias => "MustAlias",
        };
        write!(f, "{}", s)
    }
}

impl PointsTo<'_> {
    fn is_pointer(&self, value: Value) -> bool {
        !value.is_constant() && self.program.type_of(value) == Some(Ty::Ptr)
    }

    /// Classify whether `a` and `b` may refer to the same memory.
    pub fn alias(&self, a: Value, b: Value) -> AliasResult {
        let result = self.classify(a, b);
        debug!(
            "alias({}, {}) = {}",
            self.program.value_name(a),
            self.program.value_name(b),
            result
        );
        result
    }

    fn classify(&self, a: Value, b: Value) -> AliasResult {
        let (la, lb) = (self.locs.get(a), self.locs.get(b));
        match (la, lb) {
            (None, None) => return AliasResult::NoAlias,
            (Some(x), Some(y)) if x == y => return AliasResult::MustAlias,
            _ => {}
        }

        let (ia, ib) = (self.image(a), self.image(b));

        // A non-pointer side can only alias something that points at it.
        if !self.is_pointer(a) || !self.is_pointer(b) {
            let hit = |value: Value, other: Ref| {
                let id = self.locs.get(value).unwrap_or(Location::EVERYTHING);
                !self.is_pointer(value) && self.rel.contains(other, Column::Target, id)
            };
            return if hit(a, ib) || hit(b, ia) {
                AliasResult::MayAlias
            } else {
                AliasResult::NoAlias
            };
        }

        if self.rel.contains(ia, Column::Target, Location::EVERYTHING)
            || self.rel.contains(ib, Column::Target, Location::EVERYTHING)
        {
            return AliasResult::MayAlias;
        }

        let common = self.rel.intersect(ia, ib);
        if self.rel.is_empty(common) {
            AliasResult::NoAlias
        } else if ia == ib && self.rel.is_singleton(ia) {
            AliasResult::MustAlias
        } else {
            AliasResult::MayAlias
        }
    }
}
