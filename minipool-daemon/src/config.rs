// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Daemon configuration

use std::str::FromStr;
use std::time::Duration;

/// Stake-submission policy knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakePolicyConfig {
    /// Share of the launch timeout, in percent, after which a prelaunch
    /// minipool is staked regardless of fees
    pub force_submit_percent: u32,
    /// Gas price (gwei) at or above which non-urgent stakes are postponed.
    /// Zero disables the threshold.
    pub gas_threshold_gwei: u64,
    /// Max fee per gas for normal submissions; zero uses the network estimate
    pub max_fee_gwei: u64,
    pub priority_fee_gwei: u64,
}

impl Default for StakePolicyConfig {
    fn default() -> Self {
        Self {
            force_submit_percent: 50,
            gas_threshold_gwei: 150,
            max_fee_gwei: 0,
            priority_fee_gwei: 2,
        }
    }
}

/// Page sizes for batched contract reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSizes {
    /// Minipool addresses fetched per multicall
    pub addresses: usize,
    /// Minipools whose details are fetched per multicall
    pub details: usize,
}

impl Default for PageSizes {
    fn default() -> Self {
        Self {
            addresses: 1000,
            details: 100,
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Sleep between task runs once both clients are synced
    pub task_interval: Duration,
    /// Sleep before re-checking a client that is not synced
    pub sync_cooldown: Duration,
    pub stake_policy: StakePolicyConfig,
    pub page_sizes: PageSizes,
    /// Log level
    pub log_level: String,
}

impl DaemonConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let task_interval = env_parse("MINIPOOL_TASK_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.task_interval);

        let sync_cooldown = env_parse("MINIPOOL_SYNC_COOLDOWN_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.sync_cooldown);

        let stake_policy = StakePolicyConfig {
            force_submit_percent: env_parse("MINIPOOL_FORCE_SUBMIT_PERCENT")
                .unwrap_or(defaults.stake_policy.force_submit_percent),
            gas_threshold_gwei: env_parse("MINIPOOL_GAS_THRESHOLD_GWEI")
                .unwrap_or(defaults.stake_policy.gas_threshold_gwei),
            max_fee_gwei: env_parse("MINIPOOL_MAX_FEE_GWEI")
                .unwrap_or(defaults.stake_policy.max_fee_gwei),
            priority_fee_gwei: env_parse("MINIPOOL_PRIORITY_FEE_GWEI")
                .unwrap_or(defaults.stake_policy.priority_fee_gwei),
        };

        let page_sizes = PageSizes {
            addresses: env_parse("MINIPOOL_ADDRESS_PAGE_SIZE").unwrap_or(defaults.page_sizes.addresses),
            details: env_parse("MINIPOOL_DETAILS_PAGE_SIZE").unwrap_or(defaults.page_sizes.details),
        };

        let log_level = std::env::var("RUST_LOG").unwrap_or(defaults.log_level);

        Self {
            task_interval,
            sync_cooldown,
            stake_policy,
            page_sizes,
            log_level,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.task_interval.is_zero() {
            anyhow::bail!("Task interval must be greater than zero");
        }
        if self.sync_cooldown.is_zero() {
            anyhow::bail!("Sync cooldown must be greater than zero");
        }
        if self.stake_policy.force_submit_percent == 0 || self.stake_policy.force_submit_percent > 100 {
            anyhow::bail!(
                "Force-submit percentage must be within 1..=100, got {}",
                self.stake_policy.force_submit_percent
            );
        }
        if self.page_sizes.addresses == 0 || self.page_sizes.details == 0 {
            anyhow::bail!("Batch page sizes must be greater than zero");
        }
        Ok(())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            task_interval: Duration::from_secs(5 * 60),
            sync_cooldown: Duration::from_secs(10),
            stake_policy: StakePolicyConfig::default(),
            page_sizes: PageSizes::default(),
            log_level: "info".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
