// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retry delay computation for batch delivery.

use std::str::FromStr;
use std::time::Duration;

use derive_more::Display;
use rand::Rng;

/// How the wait between two delivery attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum BackoffPolicy {
    #[default]
    #[display("exponential")]
    Exponential,
    #[display("linear")]
    Linear,
    #[display("random")]
    Random,
}

impl FromStr for BackoffPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exponential" => Ok(BackoffPolicy::Exponential),
            "linear" => Ok(BackoffPolicy::Linear),
            "random" => Ok(BackoffPolicy::Random),
            other => Err(format!(
                "unknown backoff policy '{other}', expected one of: exponential, linear, random"
            )),
        }
    }
}

/// A backoff policy together with its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub policy: BackoffPolicy,
    pub min: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy, min: Duration, max: Duration) -> Self {
        Backoff { policy, min, max }
    }

    /// Returns the wait before the retry that follows the failed attempt `attempt` (0-indexed).
    ///
    /// The result is always within `[min, max]` as long as `min <= max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.policy {
            BackoffPolicy::Exponential => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                self.min.saturating_mul(factor).min(self.max)
            }
            BackoffPolicy::Linear => self
                .min
                .saturating_mul(attempt.saturating_add(1))
                .min(self.max),
            BackoffPolicy::Random => {
                if self.max <= self.min {
                    return self.min;
                }
                rand::rng().random_range(self.min..=self.max)
            }
        }
    }
}
