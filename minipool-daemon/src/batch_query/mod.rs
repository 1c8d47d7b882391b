// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Batched node queries
//!
//! Gathering the state of every minipool a node owns one call at a time costs
//! N+1 round trips. [`BatchQueryExecutor`] instead pins one block and issues:
//!
//! ```text
//! header_by_number(latest)                 ── pin block B
//!       │
//!       ▼
//! NodeQuery::initialize                    ── may stop with NotReady
//!       │
//!       ▼
//! multicall@B [minipool count + supplemental reads]
//! multicall@B [minipool addresses, paged]
//!       │
//!       ▼
//! NodeQuery::should_continue               ── may stop early (e.g. no minipools)
//!       │
//!       ▼
//! multicall@B [detail fields × minipools, paged]
//!       │
//!       ▼
//! NodeQuery::finalize
//! ```
//!
//! Any RPC failure aborts the whole query; no partial result is returned.

mod fields;

use alloy_primitives::Address;
use async_trait::async_trait;
use minipool_rpc::{ContractRead, ExecutionClient, MinipoolField, ReadValue, RpcError, Transactor, Wallet};
use minipool_types::{BlockHeader, ValidatorRecord};
use std::sync::Arc;
use tracing::debug;

use crate::config::PageSizes;

pub use fields::apply_field;

/// Errors that abort a batched query
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Failed to decode {field:?} of minipool {minipool}: {reason}")]
    Decode {
        minipool: Address,
        field: MinipoolField,
        reason: String,
    },

    #[error("Multicall returned {got} values for {expected} reads")]
    ResultCount { expected: usize, got: usize },

    #[error("Query incomplete: {0}")]
    Incomplete(String),
}

/// Result of the per-node preparation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Proceed, optionally with a handle for sending transactions
    Ready(Option<Transactor>),
    /// Stop without error (wallet locked, client not synced, ...)
    NotReady(String),
}

/// Outcome of a completed query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome<T> {
    Ready(T),
    NotReady(String),
}

/// Collaborators available to query strategies
pub struct QueryContext<'a> {
    pub execution: &'a dyn ExecutionClient,
    pub wallet: &'a dyn Wallet,
    pub node_address: Address,
    pub header: BlockHeader,
}

/// Everything gathered by the executor, handed to [`NodeQuery::finalize`]
#[derive(Debug, Clone)]
pub struct NodeQueryResult {
    pub header: BlockHeader,
    pub node_address: Address,
    pub minipool_addresses: Vec<Address>,
    /// Empty when the query stopped at `should_continue`
    pub validators: Vec<ValidatorRecord>,
    pub transactor: Option<Transactor>,
}

/// Strategy for one kind of batched node query
#[async_trait]
pub trait NodeQuery: Send {
    type Output: Send;

    /// Per-node preparation (cache refresh, wallet checks)
    async fn initialize(&mut self, ctx: &QueryContext<'_>) -> Result<Readiness, QueryError>;

    /// Reads to bundle with the node's minipool count
    fn supplemental_reads(&self, _node: Address) -> Vec<ContractRead> {
        Vec::new()
    }

    /// Receives the values of [`NodeQuery::supplemental_reads`], in order
    fn apply_supplemental(&mut self, _values: &[ReadValue]) -> Result<(), QueryError> {
        Ok(())
    }

    /// Whether per-minipool details are worth fetching
    fn should_continue(&self, minipool_addresses: &[Address]) -> bool {
        !minipool_addresses.is_empty()
    }

    /// Fields to read for every minipool
    fn detail_fields(&self) -> &'static [MinipoolField];

    fn finalize(self, result: NodeQueryResult) -> Result<Self::Output, QueryError>;
}

/// Runs [`NodeQuery`] strategies against the execution client
pub struct BatchQueryExecutor {
    execution: Arc<dyn ExecutionClient>,
    wallet: Arc<dyn Wallet>,
    page_sizes: PageSizes,
}

impl BatchQueryExecutor {
    pub fn new(execution: Arc<dyn ExecutionClient>, wallet: Arc<dyn Wallet>, page_sizes: PageSizes) -> Self {
        Self {
            execution,
            wallet,
            page_sizes,
        }
    }

    pub fn node_address(&self) -> Address {
        self.wallet.node_address()
    }

    pub async fn run<Q: NodeQuery>(&self, mut query: Q) -> Result<QueryOutcome<Q::Output>, QueryError> {
        let execution = self.execution.as_ref();
        let node_address = self.wallet.node_address();
        let header = execution.header_by_number(None).await?;

        let ctx = QueryContext {
            execution,
            wallet: self.wallet.as_ref(),
            node_address,
            header,
        };
        let transactor = match query.initialize(&ctx).await? {
            Readiness::Ready(transactor) => transactor,
            Readiness::NotReady(reason) => {
                debug!(node = %node_address, reason = %reason, "Node query not ready");
                return Ok(QueryOutcome::NotReady(reason));
            }
        };

        // Minipool count and supplemental state in one round trip
        let mut reads = vec![ContractRead::NodeMinipoolCount { node: node_address }];
        reads.extend(query.supplemental_reads(node_address));
        let values = self.multicall(&reads, header.number).await?;
        let minipool_count = values[0].as_u64()?;
        query.apply_supplemental(&values[1..])?;

        let minipool_addresses = self.minipool_addresses(node_address, minipool_count, header.number).await?;

        let mut result = NodeQueryResult {
            header,
            node_address,
            minipool_addresses,
            validators: Vec::new(),
            transactor,
        };

        if !query.should_continue(&result.minipool_addresses) {
            debug!(
                node = %node_address,
                block = header.number,
                minipools = result.minipool_addresses.len(),
                "Skipping minipool details"
            );
            return Ok(QueryOutcome::Ready(query.finalize(result)?));
        }

        result.validators = self
            .minipool_details(node_address, &result.minipool_addresses, query.detail_fields(), header.number)
            .await?;

        debug!(
            node = %node_address,
            block = header.number,
            minipools = result.validators.len(),
            "Node query complete"
        );
        Ok(QueryOutcome::Ready(query.finalize(result)?))
    }

    async fn minipool_addresses(&self, node: Address, count: u64, block: u64) -> Result<Vec<Address>, QueryError> {
        let page = self.page_sizes.addresses.max(1) as u64;
        // The count comes from the chain; only trust it one page at a time
        let mut addresses = Vec::with_capacity(count.min(page) as usize);

        let mut start = 0;
        while start < count {
            let end = start.saturating_add(page).min(count);
            let reads: Vec<_> = (start..end)
                .map(|index| ContractRead::NodeMinipoolAt { node, index })
                .collect();
            for value in self.multicall(&reads, block).await? {
                addresses.push(value.as_address()?);
            }
            start = end;
        }

        Ok(addresses)
    }

    async fn minipool_details(
        &self,
        node: Address,
        addresses: &[Address],
        fields: &[MinipoolField],
        block: u64,
    ) -> Result<Vec<ValidatorRecord>, QueryError> {
        let mut records: Vec<_> = addresses
            .iter()
            .map(|address| ValidatorRecord::new(node, *address))
            .collect();
        if fields.is_empty() {
            return Ok(records);
        }

        for chunk in records.chunks_mut(self.page_sizes.details.max(1)) {
            let reads: Vec<_> = chunk
                .iter()
                .flat_map(|record| {
                    fields.iter().map(move |field| ContractRead::Minipool {
                        minipool: record.minipool_address,
                        field: *field,
                    })
                })
                .collect();
            let values = self.multicall(&reads, block).await?;

            for (record, record_values) in chunk.iter_mut().zip(values.chunks(fields.len())) {
                for (field, value) in fields.iter().zip(record_values) {
                    apply_field(record, *field, value)?;
                }
            }
        }

        Ok(records)
    }

    async fn multicall(&self, reads: &[ContractRead], block: u64) -> Result<Vec<ReadValue>, QueryError> {
        let values = self.execution.multicall(reads, block).await?;
        if values.len() != reads.len() {
            return Err(QueryError::ResultCount {
                expected: reads.len(),
                got: values.len(),
            });
        }
        Ok(values)
    }
}
