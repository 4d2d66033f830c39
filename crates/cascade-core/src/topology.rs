//! Tier topology: how many synthesizers and whether an executive runs.
//!
//! The scaling table is a pure function of the worker count; the
//! `enable_drummer` / `enable_camina` config flags take precedence over it.

use serde::{Deserialize, Serialize};

/// Reference number of worker results per synthesizer.
pub const REFERENCE_GROUP_SIZE: usize = 5;

/// Minimum synthesis outputs before the executive tier runs.
pub const MIN_SYNTHESES_FOR_EXECUTIVE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub workers: usize,
    pub synthesizers: usize,
    pub executive: bool,
}

impl Topology {
    /// Default scaling table.
    ///
    /// | workers | synthesizers | executive |
    /// |---|---|---|
    /// | 1-4 | 0 | no |
    /// | 5-9 | 1 | no |
    /// | 10-14 | 2 | yes |
    /// | 15-19 | 3 | yes |
    /// | >= 20 | ceil(n/5) | yes |
    pub fn for_worker_count(workers: usize) -> Self {
        let synthesizers = match workers {
            0..=4 => 0,
            5..=9 => 1,
            10..=14 => 2,
            15..=19 => 3,
            n => n.div_ceil(REFERENCE_GROUP_SIZE),
        };
        Self {
            workers,
            synthesizers,
            executive: synthesizers >= MIN_SYNTHESES_FOR_EXECUTIVE,
        }
    }

    /// Table lookup with explicit overrides applied.
    ///
    /// `enable_drummer = Some(true)` guarantees at least one synthesizer (when
    /// there is at least one worker), `Some(false)` removes the tier.
    /// `enable_camina = Some(true)` enables the executive whenever two or more
    /// synthesizers exist; `Some(false)` disables it.
    pub fn resolve(
        workers: usize,
        enable_drummer: Option<bool>,
        enable_camina: Option<bool>,
    ) -> Self {
        let table = Self::for_worker_count(workers);

        let synthesizers = match enable_drummer {
            Some(false) => 0,
            Some(true) if workers > 0 => table.synthesizers.max(1),
            _ => table.synthesizers,
        };

        let executive = match enable_camina {
            Some(false) => false,
            Some(true) => synthesizers >= MIN_SYNTHESES_FOR_EXECUTIVE,
            None => table.executive && synthesizers >= MIN_SYNTHESES_FOR_EXECUTIVE,
        };

        Self {
            workers,
            synthesizers,
            executive,
        }
    }

    /// Worker results per synthesis group so that the number of groups
    /// matches the number of synthesizers. Zero when there is no synthesis tier.
    pub fn group_size(&self) -> usize {
        if self.synthesizers == 0 {
            return 0;
        }
        self.workers.div_ceil(self.synthesizers).max(1)
    }

    /// Total number of agents across all tiers.
    pub fn total_agents(&self) -> usize {
        self.workers + self.synthesizers + usize::from(self.executive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_reference_sizing() {
        for n in 1..=4 {
            let t = Topology::for_worker_count(n);
            assert_eq!((t.synthesizers, t.executive), (0, false), "n={n}");
        }
        for n in 5..=9 {
            let t = Topology::for_worker_count(n);
            assert_eq!((t.synthesizers, t.executive), (1, false), "n={n}");
        }
        for n in 10..=14 {
            let t = Topology::for_worker_count(n);
            assert_eq!((t.synthesizers, t.executive), (2, true), "n={n}");
        }
        for n in 15..=19 {
            let t = Topology::for_worker_count(n);
            assert_eq!((t.synthesizers, t.executive), (3, true), "n={n}");
        }
        assert_eq!(Topology::for_worker_count(20).synthesizers, 4);
        assert_eq!(Topology::for_worker_count(21).synthesizers, 5);
        assert_eq!(Topology::for_worker_count(30).synthesizers, 6);
        assert!(Topology::for_worker_count(30).executive);
    }

    #[test]
    fn table_is_deterministic() {
        for n in 1..=64 {
            assert_eq!(Topology::for_worker_count(n), Topology::for_worker_count(n));
        }
    }

    #[test]
    fn resolve_without_overrides_uses_table() {
        for n in 1..=40 {
            assert_eq!(Topology::resolve(n, None, None), Topology::for_worker_count(n));
        }
    }

    #[test]
    fn drummer_override_forces_synthesis() {
        let t = Topology::resolve(3, Some(true), None);
        assert_eq!(t.synthesizers, 1);
        assert!(!t.executive);

        let t = Topology::resolve(12, Some(false), Some(true));
        assert_eq!(t.synthesizers, 0);
        assert!(!t.executive);
    }

    #[test]
    fn camina_override() {
        let t = Topology::resolve(5, Some(true), Some(false));
        assert_eq!((t.synthesizers, t.executive), (1, false));

        let t = Topology::resolve(12, None, Some(false));
        assert_eq!((t.synthesizers, t.executive), (2, false));

        // One synthesizer is never enough for an executive.
        let t = Topology::resolve(7, None, Some(true));
        assert_eq!((t.synthesizers, t.executive), (1, false));
    }

    #[test]
    fn group_size_yields_one_group_per_synthesizer() {
        for n in 1..=64 {
            let t = Topology::resolve(n, Some(true), None);
            let size = t.group_size();
            assert_eq!(n.div_ceil(size), t.synthesizers, "n={n}");
        }
        assert_eq!(Topology::for_worker_count(5).group_size(), 5);
        assert_eq!(Topology::for_worker_count(12).group_size(), 6);
        assert_eq!(Topology::for_worker_count(25).group_size(), 5);
        assert_eq!(Topology::for_worker_count(3).group_size(), 0);
    }

    #[test]
    fn total_agents_counts_every_tier() {
        assert_eq!(Topology::for_worker_count(12).total_agents(), 15);
        assert_eq!(Topology::for_worker_count(3).total_agents(), 3);
    }
}
