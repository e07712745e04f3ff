use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::fragment::Fragment;
use crate::hash::ContentId;

/// Upper bound on simulated failures per retrieval.
pub const MAX_INJECTED_FAILURES: usize = 2;

/// How the oracle decides which fragments are reachable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityMode {
    /// Every fragment is reachable.
    #[default]
    All,
    /// Withhold one or two random fragments to model storing-node failure.
    InjectFailures,
}

/// A fragment the oracle marked unreachable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingFragment {
    pub fragment_id: u32,
    pub fragment_hash: ContentId,
}

/// Split of a fragment set into reachable and withheld parts.
#[derive(Clone, Debug)]
pub struct Availability<'a> {
    pub available: Vec<&'a Fragment>,
    pub missing: Vec<MissingFragment>,
}

impl Availability<'_> {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AvailabilityOracle {
    mode: AvailabilityMode,
}

impl AvailabilityOracle {
    pub fn new(mode: AvailabilityMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> AvailabilityMode {
        self.mode
    }

    /// Decide which of `fragments` are reachable.
    ///
    /// In failure-injection mode, with `n >= 2` fragments, `k` is drawn
    /// uniformly from `1..=min(2, n - 1)` and `k` distinct indices are
    /// withheld. Sets of fewer than two fragments are always complete.
    pub fn partition<'a, R>(&self, fragments: &'a [Fragment], rng: &mut R) -> Availability<'a>
    where
        R: Rng + ?Sized,
    {
        let n = fragments.len();
        if self.mode == AvailabilityMode::All || n < 2 {
            return Availability {
                available: fragments.iter().collect(),
                missing: Vec::new(),
            };
        }

        let failures = rng.gen_range(1..=MAX_INJECTED_FAILURES.min(n - 1));
        let mut withheld = vec![false; n];
        for idx in index::sample(rng, n, failures).iter() {
            withheld[idx] = true;
        }

        let mut available = Vec::with_capacity(n - failures);
        let mut missing = Vec::with_capacity(failures);
        for (fragment, gone) in fragments.iter().zip(withheld) {
            if gone {
                missing.push(MissingFragment {
                    fragment_id: fragment.fragment_id,
                    fragment_hash: fragment.plaintext_hash,
                });
            } else {
                available.push(fragment);
            }
        }
        Availability { available, missing }
    }
}
