// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Network snapshot collection
//!
//! One [`NetworkSnapshot`] is taken per scheduler tick. All of its reads are
//! pinned to a single execution block so that settings and minipool state are
//! mutually consistent. Failures are returned as-is; the caller decides
//! whether to skip the tick.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use minipool_rpc::{ContractRead, ContractRegistry, MinipoolField, ReadValue};
use minipool_types::{NetworkSettings, NetworkSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::batch_query::{
    BatchQueryExecutor, NodeQuery, NodeQueryResult, QueryContext, QueryError, QueryOutcome, Readiness,
};

/// Fields every snapshot record carries
pub const SNAPSHOT_FIELDS: &[MinipoolField] = &[
    MinipoolField::Exists,
    MinipoolField::Status,
    MinipoolField::StatusTime,
    MinipoolField::Pubkey,
    MinipoolField::WithdrawalCredentials,
];

/// Refresh both contract-address caches ahead of a query
pub(crate) async fn refresh_contract_caches(ctx: &QueryContext<'_>) -> Result<(), QueryError> {
    ctx.execution
        .refresh_contract_addresses(ContractRegistry::Execution)
        .await?;
    ctx.execution
        .refresh_contract_addresses(ContractRegistry::Protocol)
        .await?;
    Ok(())
}

/// Reads for the protocol-wide minipool settings, in [`decode_settings`] order
pub(crate) fn settings_reads() -> Vec<ContractRead> {
    vec![
        ContractRead::ScrubPeriod,
        ContractRead::LaunchTimeout,
        ContractRead::MinimumStake,
    ]
}

pub(crate) fn decode_settings(values: &[ReadValue]) -> Result<NetworkSettings, QueryError> {
    let [scrub, timeout, stake] = values else {
        return Err(QueryError::ResultCount {
            expected: 3,
            got: values.len(),
        });
    };
    Ok(NetworkSettings {
        scrub_period: Duration::from_secs(scrub.as_u64()?),
        launch_timeout: Duration::from_secs(timeout.as_u64()?),
        minimum_stake: stake.as_uint()?,
    })
}

#[derive(Default)]
struct SnapshotQuery {
    active_minipool_count: u64,
    settings: Option<NetworkSettings>,
}

#[async_trait]
impl NodeQuery for SnapshotQuery {
    type Output = NetworkSnapshot;

    async fn initialize(&mut self, ctx: &QueryContext<'_>) -> Result<Readiness, QueryError> {
        refresh_contract_caches(ctx).await?;
        Ok(Readiness::Ready(None))
    }

    fn supplemental_reads(&self, node: Address) -> Vec<ContractRead> {
        let mut reads = vec![ContractRead::NodeActiveMinipoolCount { node }];
        reads.extend(settings_reads());
        reads
    }

    fn apply_supplemental(&mut self, values: &[ReadValue]) -> Result<(), QueryError> {
        let Some((count, settings)) = values.split_first() else {
            return Err(QueryError::ResultCount { expected: 4, got: 0 });
        };
        self.active_minipool_count = count.as_u64()?;
        self.settings = Some(decode_settings(settings)?);
        Ok(())
    }

    fn detail_fields(&self) -> &'static [MinipoolField] {
        SNAPSHOT_FIELDS
    }

    fn finalize(self, result: NodeQueryResult) -> Result<NetworkSnapshot, QueryError> {
        let settings = self
            .settings
            .ok_or_else(|| QueryError::Incomplete("network settings were not read".to_string()))?;
        Ok(NetworkSnapshot {
            header: result.header,
            settings,
            node_address: result.node_address,
            active_minipool_count: self.active_minipool_count,
            validators: result.validators,
        })
    }
}

/// Produces one [`NetworkSnapshot`] per call
pub struct NetworkSnapshotCollector {
    executor: Arc<BatchQueryExecutor>,
}

impl NetworkSnapshotCollector {
    pub fn new(executor: Arc<BatchQueryExecutor>) -> Self {
        Self { executor }
    }

    pub async fn collect(&self) -> Result<NetworkSnapshot, QueryError> {
        match self.executor.run(SnapshotQuery::default()).await? {
            QueryOutcome::Ready(snapshot) => {
                if !settings_look_valid(&snapshot.settings) {
                    warn!(
                        block = snapshot.header.number,
                        settings = ?snapshot.settings,
                        "Network settings look unset; contract addresses may be stale"
                    );
                }
                debug!(
                    node = %snapshot.node_address,
                    block = snapshot.header.number,
                    minipools = snapshot.validators.len(),
                    active = snapshot.active_minipool_count,
                    "Collected network snapshot"
                );
                Ok(snapshot)
            }
            QueryOutcome::NotReady(reason) => Err(QueryError::Incomplete(reason)),
        }
    }
}

/// Zero-valued settings are a sign of unresolved contract addresses
pub fn settings_look_valid(settings: &NetworkSettings) -> bool {
    !settings.launch_timeout.is_zero() && settings.minimum_stake > U256::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSizes;
    use crate::fixtures::{self, Harness, DAY, T0};
    use minipool_types::MinipoolStatus;

    #[tokio::test]
    async fn test_collect_snapshot() {
        let harness = Harness::new(T0);
        harness.add(fixtures::record(1, MinipoolStatus::Prelaunch, T0 - DAY), 1);
        harness.add(fixtures::record(2, MinipoolStatus::Staking, T0 - 30 * DAY), 2);
        harness.add(fixtures::record(3, MinipoolStatus::Finalized, T0 - 90 * DAY), 3);

        let collector = NetworkSnapshotCollector::new(harness.executor(PageSizes::default()));
        let snapshot = collector.collect().await.unwrap();

        assert_eq!(snapshot.header, fixtures::header(T0));
        assert_eq!(snapshot.settings, fixtures::settings());
        assert_eq!(snapshot.node_address, fixtures::node());
        assert_eq!(snapshot.active_minipool_count, 2);
        assert_eq!(snapshot.validators.len(), 3);
        assert_eq!(snapshot.validators[0], fixtures::record(1, MinipoolStatus::Prelaunch, T0 - DAY));
        assert!(settings_look_valid(&snapshot.settings));

        assert_eq!(
            harness.execution.refreshed(),
            vec![ContractRegistry::Execution, ContractRegistry::Protocol]
        );
        let first_batch = harness.execution.multicalls()[0];
        assert_eq!(first_batch.0, 5);
    }

    #[tokio::test]
    async fn test_collect_with_no_minipools() {
        let harness = Harness::new(T0);
        let collector = NetworkSnapshotCollector::new(harness.executor(PageSizes::default()));

        let snapshot = collector.collect().await.unwrap();
        assert!(snapshot.validators.is_empty());
        assert_eq!(snapshot.active_minipool_count, 0);
        assert_eq!(snapshot.settings.scrub_period, Duration::from_secs(5 * DAY));
    }

    #[tokio::test]
    async fn test_collect_propagates_rpc_errors() {
        let harness = Harness::new(T0);
        harness.execution.set_fail_reads(true);
        let collector = NetworkSnapshotCollector::new(harness.executor(PageSizes::default()));

        assert!(collector.collect().await.is_err());
    }

    #[test]
    fn test_decode_settings_requires_three_values() {
        assert!(matches!(
            decode_settings(&[]),
            Err(QueryError::ResultCount { expected: 3, got: 0 })
        ));
    }
}
