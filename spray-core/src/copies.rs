//! Copy accounting: how forwarding budgets split across a hand-off.
//!
//! Both sides of a hand-off apply a ceiling halving, so an odd budget is not conserved
//! (7 leaves 4 with the sender and gives 4 to the receiver).

/// `⌈value / divider⌉`. `divider` must be non-zero.
pub fn ceiling_divide(value: u16, divider: u16) -> u16 {
    value.div_ceil(divider)
}

/// Budget placed in an outgoing hand-off: half (rounded up) once there is something to split.
pub fn handoff_copies(local: u16) -> u16 {
    if local >= 2 {
        ceiling_divide(local, 2)
    } else {
        local
    }
}

/// Budget the sender keeps after the hand-off is acknowledged.
pub fn retained_copies(local: u16) -> u16 {
    ceiling_divide(local, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_divide_even_odd_one() {
        for v in (0..=1000u16).step_by(2) {
            assert_eq!(ceiling_divide(v, 2), v / 2);
        }
        for v in (1..=1001u16).step_by(2) {
            assert_eq!(ceiling_divide(v, 2), (v + 1) / 2);
        }
        assert_eq!(ceiling_divide(1, 2), 1);
        assert_eq!(ceiling_divide(0, 2), 0);
        assert_eq!(ceiling_divide(u16::MAX, 2), 32768);
    }

    #[test]
    fn handoff_leaves_small_budgets_alone() {
        assert_eq!(handoff_copies(0), 0);
        assert_eq!(handoff_copies(1), 1);
        assert_eq!(handoff_copies(2), 1);
        assert_eq!(handoff_copies(8), 4);
        assert_eq!(handoff_copies(7), 4);
    }

    #[test]
    fn odd_budget_is_not_conserved() {
        let local = 7;
        assert_eq!(handoff_copies(local) + retained_copies(local), 8);
        let local = 8;
        assert_eq!(handoff_copies(local) + retained_copies(local), 8);
    }
}
