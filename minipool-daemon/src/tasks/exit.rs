// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Exit-submission task
//!
//! Signs a voluntary exit for every validator the coordination service does
//! not yet hold one for, and uploads them in one batch. Beacon lookups are
//! anchored to the slot matching the snapshot's block time so both chains
//! are read at the same moment.

use async_trait::async_trait;
use minipool_rpc::{BeaconConfig, ConsensusClient, CoordinationClient, KeyStore};
use minipool_types::{
    BlsPubkey, DomainType, ExitMessageUpload, NetworkSnapshot, ValidatorRecord, VoluntaryExit,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ScheduledTask, TaskError};

/// Validators whose signed exit the coordination service is known to hold.
/// Lives as long as the task; rebuilt from the service after a restart.
#[derive(Debug, Default)]
pub struct ExitSentCache {
    sent: HashSet<BlsPubkey>,
    initialized: bool,
}

impl ExitSentCache {
    pub fn contains(&self, pubkey: &BlsPubkey) -> bool {
        self.sent.contains(pubkey)
    }

    /// Returns `true` if the pubkey was not cached yet
    pub fn mark(&mut self, pubkey: BlsPubkey) -> bool {
        self.sent.insert(pubkey)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

pub struct ExitSubmissionTask {
    consensus: Arc<dyn ConsensusClient>,
    coordination: Arc<dyn CoordinationClient>,
    keystore: Arc<dyn KeyStore>,
    beacon_config: Option<BeaconConfig>,
    sent: ExitSentCache,
}

impl ExitSubmissionTask {
    pub fn new(
        consensus: Arc<dyn ConsensusClient>,
        coordination: Arc<dyn CoordinationClient>,
        keystore: Arc<dyn KeyStore>,
    ) -> Self {
        Self {
            consensus,
            coordination,
            keystore,
            beacon_config: None,
            sent: ExitSentCache::default(),
        }
    }

    pub fn exit_cache(&self) -> &ExitSentCache {
        &self.sent
    }

    async fn beacon_config(&mut self) -> Result<BeaconConfig, TaskError> {
        if let Some(config) = self.beacon_config {
            return Ok(config);
        }
        let config = self.consensus.protocol_config().await?;
        self.beacon_config = Some(config);
        Ok(config)
    }

    async fn init_cache(&mut self) -> Result<(), TaskError> {
        if self.sent.initialized {
            return Ok(());
        }
        for validator in self.coordination.validators().await? {
            if validator.exit_message_uploaded {
                self.sent.mark(validator.pubkey);
            }
        }
        self.sent.initialized = true;
        debug!(cached = self.sent.len(), "Loaded uploaded exits from coordination service");
        Ok(())
    }

    /// Attach beacon statuses to the candidates, dropping those the beacon
    /// chain cannot exit yet
    async fn with_beacon_status(
        &self,
        config: &BeaconConfig,
        snapshot: &NetworkSnapshot,
        candidates: Vec<&ValidatorRecord>,
    ) -> Result<Vec<ValidatorRecord>, TaskError> {
        let slot = config.slot_at(snapshot.block_time());
        let pubkeys: Vec<BlsPubkey> = candidates.iter().map(|r| r.pubkey).collect();
        let mut statuses = self.consensus.validator_statuses(&pubkeys, Some(slot)).await?;

        let mut eligible = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(status) = statuses.remove(&candidate.pubkey) else {
                debug!(
                    minipool = %candidate.minipool_address,
                    slot,
                    "Validator not visible on beacon chain yet"
                );
                continue;
            };
            let mut record = candidate.clone();
            record.beacon = Some(status);
            if record.validator_index().is_some() {
                eligible.push(record);
            } else {
                debug!(
                    minipool = %record.minipool_address,
                    slot,
                    "Validator has no index yet"
                );
            }
        }
        Ok(eligible)
    }

    /// Fold the service's view into the cache, warning about anything we
    /// uploaded that it does not confirm. An accepted batch is cached as sent
    /// when the service cannot be re-queried.
    async fn reconcile(&mut self, submitted: &[BlsPubkey]) {
        let validators = match self.coordination.validators().await {
            Ok(validators) => validators,
            Err(e) => {
                warn!(error = %e, count = submitted.len(), "Failed to confirm uploaded exits; caching them as sent");
                for pubkey in submitted {
                    self.sent.mark(*pubkey);
                }
                return;
            }
        };
        let confirmed: HashSet<BlsPubkey> = validators
            .into_iter()
            .filter(|v| v.exit_message_uploaded)
            .map(|v| v.pubkey)
            .collect();

        for pubkey in &confirmed {
            if self.sent.mark(*pubkey) && !submitted.contains(pubkey) {
                debug!(pubkey = %pubkey, "Exit was uploaded out of band");
            }
        }
        for pubkey in submitted.iter().filter(|pk| !confirmed.contains(*pk)) {
            warn!(pubkey = %pubkey, "Uploaded exit not confirmed by coordination service");
        }
    }
}

#[async_trait]
impl ScheduledTask for ExitSubmissionTask {
    fn name(&self) -> &'static str {
        "exit-submission"
    }

    async fn run(&mut self, snapshot: &NetworkSnapshot) -> Result<(), TaskError> {
        let config = self.beacon_config().await?;
        self.init_cache().await?;

        let candidates: Vec<&ValidatorRecord> = snapshot
            .validators
            .iter()
            .filter(|r| {
                r.exists
                    && !r.status.is_closed()
                    && r.pubkey != BlsPubkey::ZERO
                    && !self.sent.contains(&r.pubkey)
            })
            .collect();
        if candidates.is_empty() {
            debug!(node = %snapshot.node_address, "No validators need an exit message");
            return Ok(());
        }

        let eligible = self.with_beacon_status(&config, snapshot, candidates).await?;
        if eligible.is_empty() {
            return Ok(());
        }

        let head = self.consensus.chain_head().await?;
        let epoch = head.finalized_epoch;
        let domain = self
            .consensus
            .signing_domain(DomainType::VoluntaryExit, epoch)
            .await?;

        let mut uploads = Vec::with_capacity(eligible.len());
        for record in &eligible {
            let Some(validator_index) = record.validator_index() else {
                continue;
            };
            let key = match self.keystore.load_validator_key(&record.pubkey).await {
                Ok(Some(key)) => key,
                Ok(None) => {
                    warn!(minipool = %record.minipool_address, pubkey = %record.pubkey, "No signing key; skipping exit");
                    continue;
                }
                Err(e) => {
                    warn!(minipool = %record.minipool_address, error = %e, "Failed to load signing key; skipping exit");
                    continue;
                }
            };
            let message = VoluntaryExit { epoch, validator_index };
            uploads.push(ExitMessageUpload {
                pubkey: record.pubkey,
                exit_message: key.sign_voluntary_exit(message, domain),
            });
        }
        if uploads.is_empty() {
            return Ok(());
        }

        let submitted: Vec<BlsPubkey> = uploads.iter().map(|u| u.pubkey).collect();
        let outcome = self.coordination.upload_signed_exits(uploads).await?;
        if outcome.not_registered {
            return Err(TaskError::Rejected("node is not registered".to_string()));
        }
        if outcome.not_authorized {
            return Err(TaskError::Rejected("node is not authorized".to_string()));
        }
        info!(count = submitted.len(), epoch, "Uploaded signed exit messages");

        self.reconcile(&submitted).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSizes;
    use crate::fixtures::{self, Harness, DAY, T0};
    use crate::snapshot::NetworkSnapshotCollector;
    use alloy_primitives::B256;
    use minipool_types::{
        compute_domain, verify_signature, BeaconValidatorState, BeaconValidatorStatus, ForkVersion,
        MinipoolStatus, SignedRoot, UploadOutcome,
    };

    fn pubkey(n: u8) -> BlsPubkey {
        fixtures::key(n).pubkey()
    }

    /// Staking minipools 1..=count, each active on the beacon chain with index 100 + n
    fn harness_with(count: u8) -> Harness {
        let harness = Harness::new(T0);
        for n in 1..=count {
            harness.add(fixtures::record(n, MinipoolStatus::Staking, T0 - 30 * DAY), n);
            harness.consensus.set_status(pubkey(n), fixtures::active(100 + u64::from(n)));
            harness.coordination.set_validator(pubkey(n), false);
        }
        harness.consensus.set_finalized_epoch(200);
        harness
    }

    fn task(harness: &Harness) -> ExitSubmissionTask {
        ExitSubmissionTask::new(
            harness.consensus.clone(),
            harness.coordination.clone(),
            harness.keystore.clone(),
        )
    }

    async fn snapshot(harness: &Harness) -> NetworkSnapshot {
        NetworkSnapshotCollector::new(harness.executor(PageSizes::default()))
            .collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_signs_and_uploads_exits() {
        let harness = harness_with(2);
        let mut task = task(&harness);

        task.run(&snapshot(&harness).await).await.unwrap();

        let uploads = harness.coordination.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].len(), 2);

        let domain = compute_domain(DomainType::VoluntaryExit, ForkVersion::ZERO, B256::repeat_byte(0x4b));
        for (n, upload) in (1u8..).zip(&uploads[0]) {
            assert_eq!(upload.pubkey, pubkey(n));
            let message = upload.exit_message.message;
            assert_eq!(message.epoch, 200);
            assert_eq!(message.validator_index, 100 + u64::from(n));
            assert!(verify_signature(
                &upload.pubkey,
                message.signing_root(domain),
                &upload.exit_message.signature
            ));
        }

        assert!(task.exit_cache().contains(&pubkey(1)));
        assert!(task.exit_cache().contains(&pubkey(2)));

        let queries = harness.consensus.status_queries();
        assert_eq!(queries.len(), 1);
        let expected_slot = fixtures::beacon_config().slot_at(fixtures::header(T0).time());
        assert_eq!(queries[0].1, Some(expected_slot));
    }

    #[tokio::test]
    async fn test_second_run_uploads_nothing() {
        let harness = harness_with(2);
        let mut task = task(&harness);
        let snapshot = snapshot(&harness).await;

        task.run(&snapshot).await.unwrap();
        task.run(&snapshot).await.unwrap();

        assert_eq!(harness.coordination.uploads().len(), 1);
        assert_eq!(harness.consensus.status_queries().len(), 1);
        assert_eq!(harness.consensus.config_calls(), 1);
    }

    #[tokio::test]
    async fn test_out_of_band_uploads_are_not_resubmitted() {
        let harness = harness_with(1);
        // Uploaded by another process before this minipool shows up on chain
        harness.coordination.set_validator(pubkey(3), true);
        let mut task = task(&harness);

        task.run(&snapshot(&harness).await).await.unwrap();
        assert!(task.exit_cache().contains(&pubkey(3)));

        harness.add(fixtures::record(3, MinipoolStatus::Staking, T0 - 30 * DAY), 3);
        harness.consensus.set_status(pubkey(3), fixtures::active(103));
        task.run(&snapshot(&harness).await).await.unwrap();

        let uploads = harness.coordination.uploads();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].iter().all(|u| u.pubkey != pubkey(3)));
    }

    #[tokio::test]
    async fn test_unconfirmed_upload_is_retried() {
        let harness = harness_with(2);
        harness.coordination.drop_uploads_for(pubkey(2));
        let mut task = task(&harness);
        let snapshot = snapshot(&harness).await;

        task.run(&snapshot).await.unwrap();
        assert!(task.exit_cache().contains(&pubkey(1)));
        assert!(!task.exit_cache().contains(&pubkey(2)));

        task.run(&snapshot).await.unwrap();
        let uploads = harness.coordination.uploads();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[1].len(), 1);
        assert_eq!(uploads[1][0].pubkey, pubkey(2));
    }

    #[tokio::test]
    async fn test_failed_confirmation_does_not_resubmit() {
        let harness = harness_with(1);
        // Cache load succeeds, the post-upload listing does not
        harness.coordination.fail_validator_queries_after(1);
        let mut task = task(&harness);
        let snapshot = snapshot(&harness).await;

        task.run(&snapshot).await.unwrap();
        assert!(task.exit_cache().contains(&pubkey(1)));

        task.run(&snapshot).await.unwrap();
        task.run(&snapshot).await.unwrap();
        assert_eq!(harness.coordination.uploads().len(), 1);
        assert_eq!(harness.coordination.validator_queries(), 2);
    }

    #[tokio::test]
    async fn test_closed_minipools_get_no_exit() {
        let harness = harness_with(1);
        for (n, status) in [(2, MinipoolStatus::Dissolved), (3, MinipoolStatus::Finalized)] {
            harness.add(fixtures::record(n, status, T0 - 10 * DAY), n);
            harness.consensus.set_status(pubkey(n), fixtures::active(100 + u64::from(n)));
        }
        let mut task = task(&harness);

        task.run(&snapshot(&harness).await).await.unwrap();

        let uploads = harness.coordination.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].len(), 1);
        assert_eq!(uploads[0][0].pubkey, pubkey(1));
        assert_eq!(harness.consensus.status_queries()[0].0, vec![pubkey(1)]);
    }

    #[tokio::test]
    async fn test_validator_without_index_is_skipped() {
        let harness = harness_with(2);
        harness.consensus.set_status(
            pubkey(2),
            BeaconValidatorStatus {
                index: None,
                balance_gwei: 32_000_000_000,
                state: BeaconValidatorState::PendingInitialized,
            },
        );
        let mut task = task(&harness);

        task.run(&snapshot(&harness).await).await.unwrap();

        let uploads = harness.coordination.uploads();
        assert_eq!(uploads[0].len(), 1);
        assert_eq!(uploads[0][0].pubkey, pubkey(1));
        assert!(!task.exit_cache().contains(&pubkey(2)));
    }

    #[tokio::test]
    async fn test_invisible_validator_and_missing_key_are_skipped() {
        let harness = harness_with(1);
        // Not on the beacon chain yet
        harness.add(fixtures::record(2, MinipoolStatus::Prelaunch, T0 - DAY), 2);
        // On the beacon chain, but this node has no key for it
        harness.execution.add_minipool(fixtures::record(3, MinipoolStatus::Staking, T0 - 30 * DAY));
        harness.consensus.set_status(pubkey(3), fixtures::active(103));
        let mut task = task(&harness);

        task.run(&snapshot(&harness).await).await.unwrap();

        let uploads = harness.coordination.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].len(), 1);
        assert_eq!(uploads[0][0].pubkey, pubkey(1));
        assert_eq!(task.exit_cache().len(), 1);
    }

    #[tokio::test]
    async fn test_not_authorized_leaves_cache_untouched() {
        let harness = harness_with(2);
        harness.coordination.set_outcome(UploadOutcome {
            not_registered: false,
            not_authorized: true,
        });
        let mut task = task(&harness);

        let err = task.run(&snapshot(&harness).await).await.unwrap_err();
        assert!(matches!(err, TaskError::Rejected(_)));
        assert!(task.exit_cache().is_empty());
        assert!(task.exit_cache().is_initialized());
        assert_eq!(harness.coordination.validator_queries(), 1);
    }
}
