//! Safety Guard - loop iteration ceiling.
//!
//! Every loop construct is bounded by the same ceiling so that every
//! program terminates. A visual "forever" loop is therefore truncated
//! rather than infinite; this is program semantics and is applied
//! uniformly to `Repeat` and `RepeatBounded`.

/// Default ceiling for any loop.
pub const DEFAULT_LOOP_CEILING: u32 = 100;

/// Uniform bound on loop iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyGuard {
    ceiling: u32,
}

impl SafetyGuard {
    /// Creates a guard. A ceiling of 0 is raised to 1 so loops still run
    /// their body at least once.
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling: ceiling.max(1),
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Iterations actually allowed for a loop that asked for `requested`.
    pub fn bound(&self, requested: u32) -> u32 {
        requested.min(self.ceiling)
    }

    /// True if a loop asking for `requested` will be cut short.
    pub fn truncates(&self, requested: u32) -> bool {
        requested > self.ceiling
    }
}

impl Default for SafetyGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOOP_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_ceiling() {
        let guard = SafetyGuard::default();
        assert_eq!(guard.ceiling(), 100);
        assert_eq!(guard.bound(u32::MAX), 100);
        assert_eq!(guard.bound(4), 4);
        assert!(!guard.truncates(100));
        assert!(guard.truncates(101));
    }

    #[test]
    fn test_zero_ceiling_raised() {
        assert_eq!(SafetyGuard::new(0).ceiling(), 1);
    }

    proptest! {
        #[test]
        fn prop_bound_never_exceeds_ceiling(ceiling in 1u32..1000, requested in 0u32..100_000) {
            let guard = SafetyGuard::new(ceiling);
            let bounded = guard.bound(requested);
            prop_assert!(bounded <= ceiling);
            prop_assert!(bounded <= requested);
        }
    }
}
