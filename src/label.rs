//! Path labels carried by responses on their way back to the requester

use std::fmt;

/// Compact self-describing identifier of the forwarding path a response took
///
/// Each forwarding hop whose inbound interface belongs to the labeled class
/// appends one base-10 digit, so a response reaches the requester carrying
/// its whole return path in a single integer without any path-id allocator:
/// the earliest labeled hop occupies the most significant digit and the most
/// recent hop the least significant one. Requesters treat the value as an
/// opaque per-path key; [`hops`](Self::hops) exists for debugging.
///
/// Hop digits must be below 10. A wider digit would leak into neighboring
/// positions and silently corrupt the encoding, so contributing interface
/// classes must stay within a single decimal position.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PathLabel(u64);

impl PathLabel {
    /// Label of a path whose first labeled hop is `digit`
    pub fn first(digit: u64) -> Self {
        debug_assert!(digit < 10, "hop digits must fit one decimal position");
        Self(digit)
    }

    /// Extend the label with the next hop on the return path
    pub fn extend(self, digit: u64) -> Self {
        debug_assert!(digit < 10, "hop digits must fit one decimal position");
        Self(self.0 * 10 + digit)
    }

    /// Extend `label` with `digit`, starting a fresh label if none is present
    pub fn push(label: Option<Self>, digit: u64) -> Self {
        match label {
            Some(label) => label.extend(digit),
            None => Self::first(digit),
        }
    }

    /// Hop digits in path order (earliest labeled hop first)
    pub fn hops(self) -> Vec<u64> {
        let mut digits = Vec::new();
        let mut value = self.0;
        loop {
            digits.push(value % 10);
            value /= 10;
            if value == 0 {
                break;
            }
        }
        digits.reverse();
        digits
    }

    /// Raw wire value
    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for PathLabel {
    /// Adopt a label read off the wire
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for PathLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_hop_round_trip() {
        let label = PathLabel::push(Some(PathLabel::push(None, 3)), 7);
        assert_eq!(label.value(), 37);
        assert_eq!(label.hops(), vec![3, 7]);
    }

    #[test]
    fn single_hop() {
        let label = PathLabel::first(5);
        assert_eq!(label.value(), 5);
        assert_eq!(label.hops(), vec![5]);
    }

    #[test]
    fn deep_path_keeps_hop_order() {
        let label = PathLabel::first(1).extend(2).extend(3).extend(4);
        assert_eq!(label.value(), 1234);
        assert_eq!(label.hops(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn zero_digit_is_a_valid_hop() {
        let label = PathLabel::first(0).extend(9);
        assert_eq!(label.value(), 9);
        // A leading zero digit is indistinguishable from its absence on the
        // wire; decoding yields the shortest form
        assert_eq!(label.hops(), vec![9]);
    }

    #[test]
    fn wire_value_adoption() {
        let label = PathLabel::from(305);
        assert_eq!(label.hops(), vec![3, 0, 5]);
        assert_eq!(format!("{label}"), "305");
    }
}
