//! Sequence number arithmetic
//!
//! Destination sequence numbers are 32-bit counters that wrap. Freshness
//! is decided on the signed difference, so `1` is newer than `u32::MAX`.
//! Odd values mark a destination as unreachable in the periodic protocol.

use std::cmp::Ordering;

/// Signed distance from `b` to `a`
pub fn seq_diff(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

/// Check if `a` is strictly newer than `b`
pub fn seq_newer(a: u32, b: u32) -> bool {
    seq_diff(a, b) > 0
}

/// Compare two sequence numbers by freshness
pub fn seq_cmp(a: u32, b: u32) -> Ordering {
    seq_diff(a, b).cmp(&0)
}

/// Check if a sequence number signals an unreachable destination
pub fn is_poisoned(seq: u32) -> bool {
    seq % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ordering() {
        assert!(seq_newer(5, 4));
        assert!(!seq_newer(4, 5));
        assert!(!seq_newer(5, 5));
        assert_eq!(seq_cmp(5, 5), Ordering::Equal);
    }

    #[test]
    fn test_wraparound() {
        assert!(seq_newer(1, u32::MAX));
        assert!(seq_newer(0, u32::MAX - 10));
        assert!(!seq_newer(u32::MAX, 1));
        assert_eq!(seq_diff(2, u32::MAX), 3);
    }

    #[test]
    fn test_parity() {
        assert!(is_poisoned(3));
        assert!(!is_poisoned(4));
        assert!(!is_poisoned(0));
    }
}
