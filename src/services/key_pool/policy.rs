//! Rotation policies
//!
//! Two incompatible evolutions of key rotation exist for this system: a
//! stateless cursor walk and a health-latching pool. Both are kept as named
//! policies; health-gated is the default because it stops re-spending quota
//! on a key that already failed.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Policy for choosing which key to try next after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Walk positions starting after the last successful one; no health
    /// tracking, cursor persisted on success.
    RoundRobin,
    /// Try active keys in pool order; latch a failing key to Locked, reset
    /// the whole pool once no active keys remain.
    #[default]
    HealthGated,
}

impl std::fmt::Display for RotationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round_robin"),
            Self::HealthGated => write!(f, "health_gated"),
        }
    }
}

impl std::str::FromStr for RotationPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "round_robin" | "roundrobin" | "round-robin" => Ok(Self::RoundRobin),
            "health_gated" | "healthgated" | "health-gated" => Ok(Self::HealthGated),
            _ => anyhow::bail!(
                "Invalid rotation policy: {}. Expected: round_robin or health_gated",
                s
            ),
        }
    }
}
