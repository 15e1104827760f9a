/// [Szudzik pairing][szudzik-pairing] of two integers, wrapping on overflow.
///
/// ```text
/// (a, b) -> if (a<b) then (b^2 + a) else (a^2 + a + b)
/// ```
///
/// [szudzik-pairing]: http://szudzik.com/ElegantPairing.pdf
pub fn pairing(a: u64, b: u64) -> u64 {
    if a < b {
        b.wrapping_mul(b).wrapping_add(a)
    } else {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    }
}

/// Nested pairing of a triple, `((a, b), c)`.
pub fn pairing3(a: u64, b: u64, c: u64) -> u64 {
    pairing(pairing(a, b), c)
}

/// Hash used to place values into buckets of a [`Table`][crate::table::Table].
pub trait PerfectHash {
    fn hash(&self) -> u64;
}

/// Number of boolean variables needed to encode the ids `0..domain`; at least one.
pub fn bits_for(domain: u32) -> u32 {
    if domain <= 1 {
        1
    } else {
        u32::BITS - (domain - 1).leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing() {
        // a\b  0  1  2
        // ------------
        // 0    0  1  4
        // 1    2  3  5
        // 2    6  7  8
        assert_eq!(pairing(0, 0), 0);
        assert_eq!(pairing(0, 1), 1);
        assert_eq!(pairing(1, 0), 2);
        assert_eq!(pairing(1, 2), 5);
        assert_eq!(pairing(2, 1), 7);
        assert_ne!(pairing3(1, 2, 3), pairing3(3, 2, 1));
    }

    #[test]
    fn test_bits_for() {
        assert_eq!(bits_for(0), 1);
        assert_eq!(bits_for(1), 1);
        assert_eq!(bits_for(2), 1);
        assert_eq!(bits_for(3), 2);
        assert_eq!(bits_for(4), 2);
        assert_eq!(bits_for(5), 3);
        assert_eq!(bits_for(1024), 10);
        assert_eq!(bits_for(1025), 11);
    }
}
