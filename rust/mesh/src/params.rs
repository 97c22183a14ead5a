// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh session parameters.
//!
//! Parameters are set and read as string key/value pairs, the way mesh
//! engines take them, and validated per key when set.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, Result};

pub const MAX_SIZE: &str = "max_size";
pub const MIN_SIZE: &str = "min_size";
pub const GRADATION: &str = "gradation";
pub const MAX_NUMBER_OF_THREADS: &str = "max_number_of_threads";
pub const VERBOSE: &str = "verbose";

/// Every parameter name, in a stable order.
pub const NAMES: [&str; 5] = [MAX_SIZE, MIN_SIZE, GRADATION, MAX_NUMBER_OF_THREADS, VERBOSE];

/// Typed view of the session parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Longest allowed boundary segment. Infinite means no subdivision.
    pub max_size: f64,
    /// Curve samples closer than this to the previous sample are dropped.
    pub min_size: f64,
    /// Largest ratio between the sizes of neighbouring elements.
    pub gradation: f64,
    /// Worker threads an engine may use.
    pub max_number_of_threads: usize,
    /// Engine verbosity, 0 (silent) to 10.
    pub verbose: u8,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            max_size: f64::INFINITY,
            min_size: 0.0,
            gradation: 1.05,
            max_number_of_threads: 1,
            verbose: 0,
        }
    }
}

fn parse<T: FromStr>(name: &str, value: &str, reason: &'static str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(name, value, reason))
}

fn invalid(name: &str, value: &str, reason: &'static str) -> MeshError {
    MeshError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason,
    }
}

impl SessionParams {
    /// Builds parameters from key/value pairs over the defaults.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut params = Self::default();
        for (name, value) in pairs {
            params.set(name, value)?;
        }
        Ok(params)
    }

    /// Sets one parameter from its string value.
    ///
    /// The value is checked on its own and against the other parameters; on
    /// error the parameters are left unchanged.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        match name {
            MAX_SIZE => {
                let v: f64 = parse(name, value, "expected a number")?;
                if v.is_nan() || v <= 0.0 {
                    return Err(invalid(name, value, "must be positive"));
                }
                next.max_size = v;
            }
            MIN_SIZE => {
                let v: f64 = parse(name, value, "expected a number")?;
                if !v.is_finite() || v < 0.0 {
                    return Err(invalid(name, value, "must be finite and not negative"));
                }
                next.min_size = v;
            }
            GRADATION => {
                let v: f64 = parse(name, value, "expected a number")?;
                if !v.is_finite() || v < 1.0 {
                    return Err(invalid(name, value, "must be at least 1"));
                }
                next.gradation = v;
            }
            MAX_NUMBER_OF_THREADS => {
                let v: usize = parse(name, value, "expected a whole number")?;
                if v == 0 {
                    return Err(invalid(name, value, "must be at least 1"));
                }
                next.max_number_of_threads = v;
            }
            VERBOSE => {
                let v: u8 = parse(name, value, "expected a whole number")?;
                if v > 10 {
                    return Err(invalid(name, value, "must be between 0 and 10"));
                }
                next.verbose = v;
            }
            _ => return Err(MeshError::UnknownParameter(name.to_string())),
        }
        if next.min_size > next.max_size {
            return Err(invalid(name, value, "min_size exceeds max_size"));
        }
        *self = next;
        Ok(())
    }

    /// String value of one parameter.
    pub fn get(&self, name: &str) -> Result<String> {
        Ok(match name {
            MAX_SIZE => self.max_size.to_string(),
            MIN_SIZE => self.min_size.to_string(),
            GRADATION => self.gradation.to_string(),
            MAX_NUMBER_OF_THREADS => self.max_number_of_threads.to_string(),
            VERBOSE => self.verbose.to_string(),
            _ => return Err(MeshError::UnknownParameter(name.to_string())),
        })
    }

    /// All parameters as key/value pairs.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        NAMES
            .iter()
            .filter_map(|&name| self.get(name).ok().map(|v| (name, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = SessionParams::default();
        assert!(params.max_size.is_infinite());
        assert_eq!(params.get(GRADATION).unwrap(), "1.05");
        assert_eq!(params.pairs().len(), NAMES.len());
    }

    #[test]
    fn test_set_and_get() {
        let mut params = SessionParams::default();
        params.set("gradation", "1.2").unwrap();
        params.set("max_size", " 0.5 ").unwrap();
        params.set("max_number_of_threads", "4").unwrap();
        assert_eq!(params.gradation, 1.2);
        assert_eq!(params.max_size, 0.5);
        assert_eq!(params.get(MAX_NUMBER_OF_THREADS).unwrap(), "4");
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut params = SessionParams::default();
        assert!(matches!(
            params.set("grading", "1.0"),
            Err(MeshError::UnknownParameter(_))
        ));
        assert!(matches!(
            params.set(GRADATION, "steep"),
            Err(MeshError::InvalidParameter { .. })
        ));
        assert!(params.set(GRADATION, "0.5").is_err());
        assert!(params.set(MAX_SIZE, "0").is_err());
        assert!(params.set(MAX_NUMBER_OF_THREADS, "0").is_err());
        assert!(params.set(VERBOSE, "11").is_err());
        assert_eq!(params, SessionParams::default());
    }

    #[test]
    fn test_sizes_are_checked_together() {
        let mut params = SessionParams::from_pairs([(MAX_SIZE, "1.0")]).unwrap();
        assert!(params.set(MIN_SIZE, "2.0").is_err());
        assert_eq!(params.min_size, 0.0);
        params.set(MIN_SIZE, "0.25").unwrap();
        assert!(params.set(MAX_SIZE, "0.1").is_err());
        assert_eq!(params.max_size, 1.0);
    }
}
