use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// A reference to a BDD node, potentially negated.
///
/// The least significant bit holds the negation flag, the remaining bits store the node index.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Ref(u32);

impl Ref {
    /// Creates a new reference with the given node index and negation flag.
    pub const fn new(index: u32, negated: bool) -> Self {
        Self((index << 1) | (negated as u32))
    }

    /// Creates a positive (non-negated) reference.
    pub const fn positive(index: u32) -> Self {
        Self::new(index, false)
    }

    /// Creates a negative (negated) reference.
    pub const fn negative(index: u32) -> Self {
        Self::new(index, true)
    }

    /// Returns the index of the node this reference points to.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0 >> 1
    }

    #[inline]
    pub const fn is_negated(self) -> bool {
        (self.0 & 1) != 0
    }

    /// Returns the raw underlying value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

// -Ref
impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(self.0 ^ 1)
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negation_bit() {
        let r = Ref::positive(7);
        assert_eq!(r.index(), 7);
        assert!(!r.is_negated());

        let n = -r;
        assert_eq!(n.index(), 7);
        assert!(n.is_negated());
        assert_eq!(-n, r);
        assert_eq!(n, Ref::negative(7));
    }

    #[test]
    fn test_display() {
        assert_eq!(Ref::positive(3).to_string(), "@3");
        assert_eq!(Ref::negative(3).to_string(), "~@3");
    }
}
