//! Gauge voting with vote-escrowed NFTs on Mode.
//!
//! Gauges are addressed by address or by a case-insensitive fragment of the
//! name in their IPFS metadata. Metadata is best effort: a gauge whose
//! document cannot be fetched is listed as `"Unknown"`.

use crate::config::{VoterContracts, VotingContracts};
use crate::error::{During, EngineError, Result};
use crate::math::WAD;
use alloy::primitives::{Address, B256, U256};
use futures::stream::{self, StreamExt, TryStreamExt};
use midas_api::{GaugeMetadata, MetadataSource};
use midas_chain::contracts::voting::{GaugeVote, IEpochClock, IGaugeVoter, IVotingEscrow};
use midas_chain::{read, submit, LedgerClient, LedgerError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const UNKNOWN_GAUGE: &str = "Unknown";

/// Escrow token whose holders vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum VoterType {
    /// MODE token gauges
    #[serde(rename = "veMODE")]
    VeMode,
    /// Balancer pool token gauges
    #[serde(rename = "veBPT")]
    VeBpt,
}

impl std::fmt::Display for VoterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VeMode => write!(f, "veMODE"),
            Self::VeBpt => write!(f, "veBPT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GaugeSummary {
    pub address: Address,
    pub name: String,
    /// Whole votes, fraction truncated
    pub votes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GaugeList {
    pub voter_type: VoterType,
    pub gauges: Vec<GaugeSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GaugeInfo {
    pub address: Address,
    pub active: bool,
    pub created: u64,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    pub total_votes: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility_url: Option<String>,
}

/// One entry of a ballot before gauge resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotEntry {
    /// Gauge address, or a fragment of its name
    pub gauge_identifier: String,
    pub is_address: bool,
    /// Percent of the NFT's voting power
    pub weight: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingPower {
    pub total_voting_power: String,
    pub used_voting_power: String,
    pub remaining_voting_power: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteChange {
    pub reset_tx: B256,
    pub vote_tx: B256,
}

fn whole_units(value: U256) -> String {
    (value / WAD).to_string()
}

pub struct GaugeVoting {
    ledger: Arc<dyn LedgerClient>,
    contracts: VotingContracts,
    metadata: Arc<dyn MetadataSource>,
    read_concurrency: usize,
}

impl GaugeVoting {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        contracts: VotingContracts,
        metadata: Arc<dyn MetadataSource>,
        read_concurrency: usize,
    ) -> Self {
        Self {
            ledger,
            contracts,
            metadata,
            read_concurrency,
        }
    }

    fn ledger(&self) -> &dyn LedgerClient {
        self.ledger.as_ref()
    }

    fn deployment(&self, voter_type: VoterType) -> VoterContracts {
        match voter_type {
            VoterType::VeMode => self.contracts.ve_mode,
            VoterType::VeBpt => self.contracts.ve_bpt,
        }
    }

    async fn metadata(&self, gauge: Address, metadata_uri: &str) -> Option<GaugeMetadata> {
        match self.metadata.gauge_metadata(metadata_uri).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(gauge = %gauge, error = %e, "Gauge metadata unavailable");
                None
            }
        }
    }

    async fn summarize(&self, voter: Address, gauge: Address) -> std::result::Result<GaugeSummary, LedgerError> {
        let ledger = self.ledger();
        let info_call = IGaugeVoter::getGaugeCall { gauge };
        let votes_call = IGaugeVoter::gaugeVotesCall { gauge };
        let (info, votes) = futures::try_join!(
            read(ledger, voter, &info_call),
            read(ledger, voter, &votes_call),
        )?;

        let name = self
            .metadata(gauge, &info._0.metadataURI)
            .await
            .and_then(|m| m.name)
            .unwrap_or_else(|| UNKNOWN_GAUGE.to_string());

        Ok(GaugeSummary {
            address: gauge,
            name,
            votes: whole_units(votes._0),
        })
    }

    /// Every gauge registered with the voter, with names and vote totals.
    #[instrument(skip(self), fields(voter_type = %voter_type))]
    pub async fn all_gauges(&self, voter_type: VoterType) -> Result<GaugeList> {
        const OP: &str = "all_gauges";
        let voter = self.deployment(voter_type).voter;

        let addresses = read(self.ledger(), voter, &IGaugeVoter::getAllGaugesCall {})
            .await
            .during(OP)?
            ._0;
        debug!(count = addresses.len(), "Found gauges");

        let gauges = stream::iter(addresses)
            .map(|gauge| self.summarize(voter, gauge))
            .buffered(self.read_concurrency)
            .try_collect()
            .await
            .during(OP)?;

        Ok(GaugeList { voter_type, gauges })
    }

    /// First gauge whose name contains `fragment`, ignoring case.
    fn match_name<'a>(gauges: &'a [GaugeSummary], fragment: &str) -> Option<&'a GaugeSummary> {
        let needle = fragment.to_lowercase();
        gauges.iter().find(|g| g.name.to_lowercase().contains(&needle))
    }

    fn resolve(
        &self,
        identifier: &str,
        is_address: bool,
        gauges: &[GaugeSummary],
        operation: &'static str,
    ) -> Result<Address> {
        if is_address {
            return self
                .ledger
                .resolve_address(identifier)
                .map_err(|e| EngineError::validation(operation, e.to_string()));
        }
        Self::match_name(gauges, identifier)
            .map(|g| {
                debug!(name = %g.name, gauge = %g.address, "Matched gauge by name");
                g.address
            })
            .ok_or_else(|| {
                EngineError::validation(
                    operation,
                    format!("could not find a gauge matching the name: {identifier}"),
                )
            })
    }

    #[instrument(skip(self), fields(voter_type = %voter_type, identifier = %identifier))]
    pub async fn gauge_info(&self, voter_type: VoterType, identifier: &str, is_address: bool) -> Result<GaugeInfo> {
        const OP: &str = "gauge_info";
        let voter = self.deployment(voter_type).voter;

        let gauges = if is_address {
            Vec::new()
        } else {
            self.all_gauges(voter_type).await?.gauges
        };
        let gauge = self.resolve(identifier, is_address, &gauges, OP)?;

        let ledger = self.ledger();
        let info = read(ledger, voter, &IGaugeVoter::getGaugeCall { gauge })
            .await
            .during(OP)?
            ._0;
        let votes = read(ledger, voter, &IGaugeVoter::gaugeVotesCall { gauge })
            .await
            .during(OP)?
            ._0;
        let metadata = self.metadata(gauge, &info.metadataURI).await.unwrap_or_default();

        Ok(GaugeInfo {
            address: gauge,
            active: info.active,
            created: info.created.saturating_to(),
            total_votes: whole_units(votes),
            name: metadata.name.clone().unwrap_or_else(|| UNKNOWN_GAUGE.to_string()),
            eligibility_url: metadata.eligibility_url().map(str::to_string),
            description: metadata.description,
            logo: metadata.logo,
            metadata_uri: info.metadataURI,
        })
    }

    /// Resolve every entry and check the weights sum to exactly 100.
    async fn ballot(
        &self,
        voter_type: VoterType,
        entries: &[BallotEntry],
        operation: &'static str,
    ) -> Result<Vec<GaugeVote>> {
        let total = entries
            .iter()
            .try_fold(U256::ZERO, |sum, e| sum.checked_add(e.weight))
            .ok_or_else(|| EngineError::validation(operation, "vote weights overflow"))?;
        if total != U256::from(100u64) {
            return Err(EngineError::validation(
                operation,
                format!("total vote weight must equal 100, got {total}"),
            ));
        }

        let gauges = if entries.iter().all(|e| e.is_address) {
            Vec::new()
        } else {
            self.all_gauges(voter_type).await?.gauges
        };

        entries
            .iter()
            .map(|e| -> Result<GaugeVote> {
                Ok(GaugeVote {
                    weight: e.weight,
                    gauge: self.resolve(&e.gauge_identifier, e.is_address, &gauges, operation)?,
                })
            })
            .collect()
    }

    /// Cast `entries` for `token_id`.
    ///
    /// Checks the voting window and NFT approval first; nothing is sent
    /// unless every gauge resolves and the weights sum to 100.
    #[instrument(skip(self, entries), fields(voter_type = %voter_type, token_id = %token_id))]
    pub async fn vote(&self, voter_type: VoterType, token_id: U256, entries: &[BallotEntry]) -> Result<B256> {
        const OP: &str = "vote";
        let deployment = self.deployment(voter_type);
        let ledger = self.ledger();

        let active = read(ledger, deployment.clock, &IEpochClock::votingActiveCall {})
            .await
            .during(OP)?
            ._0;
        if !active {
            return Err(EngineError::precondition(OP, "voting is not currently active"));
        }

        let approved = read(
            ledger,
            deployment.escrow,
            &IVotingEscrow::isApprovedOrOwnerCall {
                spender: ledger.caller(),
                tokenId: token_id,
            },
        )
        .await
        .during(OP)?
        ._0;
        if !approved {
            return Err(EngineError::precondition(OP, "caller is not approved or owner of the NFT"));
        }

        let votes = self.ballot(voter_type, entries, OP).await?;
        let tx_hash = submit(
            ledger,
            deployment.voter,
            &IGaugeVoter::voteCall {
                tokenId: token_id,
                votes,
            },
        )
        .await
        .during(OP)?;
        info!(gauges = entries.len(), tx_hash = %tx_hash, "Voted");
        Ok(tx_hash)
    }

    /// Reset existing votes, confirm the power is released, then vote again.
    #[instrument(skip(self, entries), fields(voter_type = %voter_type, token_id = %token_id))]
    pub async fn change_votes(
        &self,
        voter_type: VoterType,
        token_id: U256,
        entries: &[BallotEntry],
    ) -> Result<VoteChange> {
        const OP: &str = "change_votes";
        let voter = self.deployment(voter_type).voter;
        let ledger = self.ledger();

        let votes = self.ballot(voter_type, entries, OP).await?;

        let reset_tx = submit(ledger, voter, &IGaugeVoter::resetCall { tokenId: token_id })
            .await
            .during(OP)?;
        let used = read(ledger, voter, &IGaugeVoter::usedVotingPowerCall { tokenId: token_id })
            .await
            .during(OP)?
            ._0;
        if !used.is_zero() {
            return Err(EngineError::precondition(
                OP,
                format!("reset did not clear used voting power ({used} still used)"),
            ));
        }
        info!(tx_hash = %reset_tx, "Votes reset");

        let vote_tx = submit(
            ledger,
            voter,
            &IGaugeVoter::voteCall {
                tokenId: token_id,
                votes,
            },
        )
        .await
        .during(OP)?;
        info!(tx_hash = %vote_tx, "Votes changed");
        Ok(VoteChange { reset_tx, vote_tx })
    }

    /// Current, used and remaining voting power of `token_id`, in whole units.
    #[instrument(skip(self), fields(voter_type = %voter_type, token_id = %token_id))]
    pub async fn voting_power(&self, voter_type: VoterType, token_id: U256) -> Result<VotingPower> {
        const OP: &str = "voting_power";
        let deployment = self.deployment(voter_type);
        let ledger = self.ledger();
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();

        let total = read(
            ledger,
            deployment.escrow,
            &IVotingEscrow::votingPowerAtCall {
                tokenId: token_id,
                timestamp: U256::from(now),
            },
        )
        .await
        .during(OP)?
        ._0;
        let used = read(
            ledger,
            deployment.voter,
            &IGaugeVoter::usedVotingPowerCall { tokenId: token_id },
        )
        .await
        .during(OP)?
        ._0;

        Ok(VotingPower {
            total_voting_power: whole_units(total),
            used_voting_power: whole_units(used),
            remaining_voting_power: whole_units(total.saturating_sub(used)),
        })
    }
}

impl std::fmt::Debug for GaugeVoting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaugeVoting")
            .field("contracts", &self.contracts)
            .field("read_concurrency", &self.read_concurrency)
            .finish()
    }
}
