// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Modeling options, with defaults overridable from environment variables.

use crate::sat::{BASE_VERSION, CURRENT_VERSION};

/// Resolution and history settings for one arena.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelingOptions {
    /// Smallest distance considered non-zero.
    pub resabs: f64,
    /// Smallest direction difference considered non-zero.
    pub resnor: f64,
    /// Maximum number of undoable states kept; `None` keeps all of them.
    pub max_history_states: Option<usize>,
    /// Version number written by [`crate::BrepArena::to_sat`].
    pub save_version: u32,
    /// Number of samples used when discretizing curved edges.
    pub curve_samples: usize,
}

impl ModelingOptions {
    /// Loads options from `TOLBREP_*` environment variables.
    ///
    /// Missing, unparseable or out-of-range values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            resabs: parse_var(&lookup, "TOLBREP_RESABS")
                .filter(|v: &f64| *v > 0.0)
                .unwrap_or(defaults.resabs),
            resnor: parse_var(&lookup, "TOLBREP_RESNOR")
                .filter(|v: &f64| *v > 0.0)
                .unwrap_or(defaults.resnor),
            max_history_states: parse_var(&lookup, "TOLBREP_MAX_HISTORY")
                .or(defaults.max_history_states),
            save_version: parse_var(&lookup, "TOLBREP_SAVE_VERSION")
                .filter(|v: &u32| (BASE_VERSION..=CURRENT_VERSION).contains(v))
                .unwrap_or(defaults.save_version),
            curve_samples: parse_var(&lookup, "TOLBREP_CURVE_SAMPLES")
                .filter(|v: &usize| *v >= 2)
                .unwrap_or(defaults.curve_samples),
        }
    }

    /// Returns a copy with a different `resabs`.
    pub fn with_resabs(mut self, resabs: f64) -> Self {
        self.resabs = resabs;
        self
    }

    /// Returns a copy with a bounded history.
    pub fn with_max_history(mut self, states: usize) -> Self {
        self.max_history_states = Some(states);
        self
    }
}

impl Default for ModelingOptions {
    fn default() -> Self {
        Self {
            resabs: 1e-6,
            resnor: 1e-10,
            max_history_states: None,
            save_version: CURRENT_VERSION,
            curve_samples: 32,
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ModelingOptions::default();
        assert_eq!(options.resabs, 1e-6);
        assert_eq!(options.resnor, 1e-10);
        assert_eq!(options.max_history_states, None);
        assert_eq!(options.save_version, CURRENT_VERSION);
    }

    #[test]
    fn builder_helpers() {
        let options = ModelingOptions::default()
            .with_resabs(1e-4)
            .with_max_history(3);
        assert_eq!(options.resabs, 1e-4);
        assert_eq!(options.max_history_states, Some(3));
    }

    #[test]
    fn unsupported_save_version_falls_back() {
        let lookup = |version: &'static str| {
            move |name: &str| (name == "TOLBREP_SAVE_VERSION").then(|| version.to_string())
        };
        assert_eq!(ModelingOptions::from_lookup(lookup("50")).save_version, CURRENT_VERSION);
        assert_eq!(ModelingOptions::from_lookup(lookup("9900")).save_version, CURRENT_VERSION);
        assert_eq!(ModelingOptions::from_lookup(lookup("abc")).save_version, CURRENT_VERSION);
        assert_eq!(ModelingOptions::from_lookup(lookup("300")).save_version, 300);

        let options = ModelingOptions::from_lookup(lookup("50"));
        assert_eq!(options.resabs, 1e-6);
        assert_eq!(options.curve_samples, 32);
    }
}
