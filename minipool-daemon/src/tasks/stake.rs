// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Stake-readiness task
//!
//! Promotes prelaunch minipools whose safety-review window has closed by
//! sending one `stake` transaction each. The batch is built completely and
//! dry-run before anything is broadcast; a single bad entry aborts the run.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use minipool_rpc::{
    ConsensusClient, ContractCall, ContractRead, ExecutionClient, FeeEstimate, FeeSettings,
    KeyStore, MinipoolField, ReadValue, RpcError, TransactionRequest, Transactor,
};
use minipool_types::{
    deposit_domain, stake_candidates, verify_signature, BlockHeader, MinipoolStatus, NetworkSettings,
    NetworkSnapshot, SignedRoot, ValidatorRecord, STAKE_AMOUNT_GWEI,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::policy::{submission_decision, SubmissionDecision};
use super::{ScheduledTask, TaskError};
use crate::batch_query::{
    BatchQueryExecutor, NodeQuery, NodeQueryResult, QueryContext, QueryError, QueryOutcome, Readiness,
};
use crate::config::StakePolicyConfig;
use crate::snapshot::{decode_settings, refresh_contract_caches, settings_reads, SNAPSHOT_FIELDS};

/// Node state needed to build a stake batch, read at one block
struct StakeView {
    header: BlockHeader,
    settings: NetworkSettings,
    transactor: Transactor,
    validators: Vec<ValidatorRecord>,
}

#[derive(Default)]
struct StakeQuery {
    settings: Option<NetworkSettings>,
}

#[async_trait]
impl NodeQuery for StakeQuery {
    type Output = StakeView;

    async fn initialize(&mut self, ctx: &QueryContext<'_>) -> Result<Readiness, QueryError> {
        refresh_contract_caches(ctx).await?;
        match ctx.wallet.transactor().await {
            Ok(transactor) => Ok(Readiness::Ready(Some(transactor))),
            Err(RpcError::WalletNotReady(reason)) => Ok(Readiness::NotReady(reason)),
            Err(e) => Err(e.into()),
        }
    }

    fn supplemental_reads(&self, _node: Address) -> Vec<ContractRead> {
        settings_reads()
    }

    fn apply_supplemental(&mut self, values: &[ReadValue]) -> Result<(), QueryError> {
        self.settings = Some(decode_settings(values)?);
        Ok(())
    }

    fn detail_fields(&self) -> &'static [MinipoolField] {
        SNAPSHOT_FIELDS
    }

    fn finalize(self, result: NodeQueryResult) -> Result<StakeView, QueryError> {
        let settings = self
            .settings
            .ok_or_else(|| QueryError::Incomplete("network settings were not read".to_string()))?;
        let transactor = result
            .transactor
            .ok_or_else(|| QueryError::Incomplete("no transactor for node wallet".to_string()))?;
        Ok(StakeView {
            header: result.header,
            settings,
            transactor,
            validators: result.validators,
        })
    }
}

/// One signed, simulated stake transaction
struct StakeEntry {
    minipool: Address,
    time_in_prelaunch: Duration,
    tx: TransactionRequest,
}

pub struct StakeReadinessTask {
    executor: Arc<BatchQueryExecutor>,
    execution: Arc<dyn ExecutionClient>,
    consensus: Arc<dyn ConsensusClient>,
    keystore: Arc<dyn KeyStore>,
    policy: StakePolicyConfig,
    /// Fetched on first use; the genesis fork never changes
    deposit_domain: Option<B256>,
}

impl StakeReadinessTask {
    pub fn new(
        executor: Arc<BatchQueryExecutor>,
        execution: Arc<dyn ExecutionClient>,
        consensus: Arc<dyn ConsensusClient>,
        keystore: Arc<dyn KeyStore>,
        policy: StakePolicyConfig,
    ) -> Self {
        Self {
            executor,
            execution,
            consensus,
            keystore,
            policy,
            deposit_domain: None,
        }
    }

    async fn deposit_domain(&mut self) -> Result<B256, TaskError> {
        if let Some(domain) = self.deposit_domain {
            return Ok(domain);
        }
        let config = self.consensus.protocol_config().await?;
        let domain = deposit_domain(config.genesis_fork_version);
        self.deposit_domain = Some(domain);
        Ok(domain)
    }

    /// Prelaunch minipools whose review window has closed at the view's block
    fn eligible<'a>(&self, view: &'a StakeView) -> Vec<&'a ValidatorRecord> {
        let block_time = view.header.time();
        let scrub_period = view.settings.scrub_period;

        let eligible = stake_candidates(&view.validators, block_time, scrub_period);
        for record in view
            .validators
            .iter()
            .filter(|r| r.status == MinipoolStatus::Prelaunch && !r.is_ready_to_stake(block_time, scrub_period))
        {
            debug!(
                minipool = %record.minipool_address,
                remaining_secs = record.remaining_review(block_time, scrub_period).as_secs(),
                "Minipool is still in its safety review"
            );
        }
        eligible
    }

    async fn build_entry(&self, record: &ValidatorRecord, domain: B256, view: &StakeView) -> Result<StakeEntry, TaskError> {
        let key = self
            .keystore
            .load_validator_key(&record.pubkey)
            .await?
            .ok_or(TaskError::MissingKey(record.pubkey))?;
        if key.pubkey() != record.pubkey {
            return Err(TaskError::Signing {
                pubkey: record.pubkey,
                reason: format!("key store returned key for {}", key.pubkey()),
            });
        }

        let deposit = key.sign_deposit(record.withdrawal_credentials, STAKE_AMOUNT_GWEI, domain);
        let root = deposit.as_deposit_message().signing_root(domain);
        if !verify_signature(&record.pubkey, root, &deposit.signature) {
            return Err(TaskError::Signing {
                pubkey: record.pubkey,
                reason: "deposit signature does not verify".to_string(),
            });
        }

        Ok(StakeEntry {
            minipool: record.minipool_address,
            time_in_prelaunch: record.time_in_status(view.header.time()),
            tx: TransactionRequest {
                to: record.minipool_address,
                call: ContractCall::Stake {
                    validator_signature: deposit.signature,
                    deposit_data_root: deposit.deposit_data_root(),
                },
                gas_limit: None,
            },
        })
    }

    async fn simulate(&self, transactor: &Transactor, entry: &mut StakeEntry) -> Result<(), TaskError> {
        let estimate = self
            .execution
            .simulate(transactor, &entry.tx)
            .await
            .map_err(|e| match e {
                RpcError::Simulation(reason) => TaskError::Simulation {
                    minipool: entry.minipool,
                    reason,
                },
                other => other.into(),
            })?;
        entry.tx.gas_limit = Some(estimate.gas_limit);
        Ok(())
    }

    fn normal_fees(&self, estimate: &FeeEstimate) -> FeeSettings {
        let max_fee = match self.policy.max_fee_gwei {
            0 => estimate.max_fee_per_gas_gwei,
            configured => configured,
        };
        FeeSettings {
            max_fee_per_gas_gwei: max_fee,
            max_priority_fee_per_gas_gwei: self.policy.priority_fee_gwei,
        }
    }
}

#[async_trait]
impl ScheduledTask for StakeReadinessTask {
    fn name(&self) -> &'static str {
        "stake-readiness"
    }

    async fn run(&mut self, snapshot: &NetworkSnapshot) -> Result<(), TaskError> {
        if snapshot.prelaunch().next().is_none() {
            debug!(node = %snapshot.node_address, "No prelaunch minipools");
            return Ok(());
        }

        let view = match self.executor.run(StakeQuery::default()).await? {
            QueryOutcome::Ready(view) => view,
            QueryOutcome::NotReady(reason) => {
                info!(reason = %reason, "Skipping stake check");
                return Ok(());
            }
        };

        let eligible = self.eligible(&view);
        if eligible.is_empty() {
            return Ok(());
        }

        let domain = self.deposit_domain().await?;
        let mut entries = Vec::with_capacity(eligible.len());
        for record in eligible {
            entries.push(self.build_entry(record, domain, &view).await?);
        }
        for entry in entries.iter_mut() {
            self.simulate(&view.transactor, entry).await?;
        }

        let estimate = self.execution.fee_estimate().await?;
        let elapsed: Vec<Duration> = entries.iter().map(|e| e.time_in_prelaunch).collect();
        let decision = submission_decision(
            &elapsed,
            view.settings.launch_timeout,
            self.policy.force_submit_percent,
            estimate.max_fee_per_gas_gwei,
            self.policy.gas_threshold_gwei,
        );

        let (entries, fees) = match decision {
            SubmissionDecision::Skip => {
                info!(
                    pending = entries.len(),
                    fee_gwei = estimate.max_fee_per_gas_gwei,
                    threshold_gwei = self.policy.gas_threshold_gwei,
                    "Gas price is above threshold; postponing stake"
                );
                return Ok(());
            }
            SubmissionDecision::SubmitAll => (entries, self.normal_fees(&estimate)),
            SubmissionDecision::SubmitForced(indices) => {
                let forced: Vec<StakeEntry> = entries
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| indices.contains(i))
                    .map(|(_, entry)| entry)
                    .collect();
                warn!(
                    forced = forced.len(),
                    fee_gwei = estimate.max_fee_per_gas_gwei,
                    "Minipools are close to their launch timeout; staking regardless of gas price"
                );
                let fees = FeeSettings {
                    max_fee_per_gas_gwei: estimate.max_fee_per_gas_gwei,
                    max_priority_fee_per_gas_gwei: self.policy.priority_fee_gwei,
                };
                (forced, fees)
            }
        };

        for entry in &entries {
            info!(minipool = %entry.minipool, "Staking minipool");
        }
        let txs: Vec<TransactionRequest> = entries.into_iter().map(|e| e.tx).collect();
        let count = txs.len();
        let hashes = self.execution.submit_batch(&view.transactor, txs, fees).await?;
        self.execution.wait_for_transactions(&hashes).await?;

        info!(
            node = %view.transactor.from,
            staked = count,
            max_fee_gwei = fees.max_fee_per_gas_gwei,
            "Stake transactions included"
        );
        Ok(())
    }
}
