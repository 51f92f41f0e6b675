//! Tolerant decoders for chain payloads.
//!
//! REST responses and stream events mix naming conventions (snake_case and
//! camelCase) and numeric encodings (JSON numbers and decimal strings).
//! Every decoder here accepts both, and optional fields tolerate absence,
//! so a malformed event fails individually instead of poisoning the stream.

use serde::{Deserialize, Deserializer};

/// Accept a u64 encoded as a JSON number or a decimal string.
pub fn flex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Accept an optional u64 encoded as a JSON number or a decimal string.
pub fn flex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn flex_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    flex_u64(deserializer).map(|n| n as u32)
}

/// Commit flag of one signature entry; numeric and named encodings co-exist.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BlockIdFlag {
    /// Numeric protobuf encoding (`2` is commit).
    Numeric(i64),
    /// Named string encoding (`"BLOCK_ID_FLAG_COMMIT"`).
    Named(String),
}

impl BlockIdFlag {
    /// Whether the flag marks a committed signature.
    pub fn is_commit(&self) -> bool {
        match self {
            Self::Numeric(n) => *n == 2,
            Self::Named(s) => s == "BLOCK_ID_FLAG_COMMIT",
        }
    }
}

impl Default for BlockIdFlag {
    fn default() -> Self {
        Self::Numeric(0)
    }
}

/// One entry of a block's commit signature vector.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitSignature {
    /// Commit flag for this validator slot.
    #[serde(default, alias = "blockIdFlag")]
    pub block_id_flag: BlockIdFlag,
    /// Consensus hex address of the validator, empty for absent slots.
    #[serde(default, alias = "validatorAddress")]
    pub validator_address: String,
    /// Base64 signature bytes, absent or empty when the slot did not sign.
    #[serde(default)]
    pub signature: Option<String>,
}

impl CommitSignature {
    /// Whether this entry counts as a present commit signature.
    pub fn is_signed(&self) -> bool {
        self.block_id_flag.is_commit()
            && self.signature.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Block header fields the pipeline consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeader {
    /// Height as a decimal string or number.
    #[serde(deserialize_with = "flex_u64")]
    pub height: u64,
    /// RFC 3339 block time.
    #[serde(default)]
    pub time: String,
}

/// The commit carried by the following block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LastCommit {
    /// Commit round.
    #[serde(default, deserialize_with = "flex_u32")]
    pub round: u32,
    /// One entry per validator slot.
    #[serde(default)]
    pub signatures: Vec<CommitSignature>,
}

/// A block as carried by both the REST endpoint and the stream event.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    /// Header with height and time.
    pub header: BlockHeader,
    /// Commit for the previous height.
    #[serde(default, alias = "lastCommit")]
    pub last_commit: LastCommit,
}

impl Block {
    /// Block time in unix milliseconds, 0 when absent or unparseable.
    pub fn timestamp_ms(&self) -> u64 {
        chrono::DateTime::parse_from_rfc3339(&self.header.time)
            .map(|t| t.timestamp_millis().max(0) as u64)
            .unwrap_or(0)
    }

    /// Consensus hex addresses with a present commit signature.
    pub fn signer_addresses(&self) -> impl Iterator<Item = &str> {
        self.last_commit
            .signatures
            .iter()
            .filter(|s| s.is_signed())
            .map(|s| s.validator_address.as_str())
    }
}

/// Envelope of `/cosmos/base/tendermint/v1beta1/blocks/{h}` and `/latest`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockResponse {
    /// The block payload.
    pub block: Block,
}

/// Consensus public key of a staking validator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsensusPubkey {
    /// Base64 key bytes.
    #[serde(default)]
    pub key: String,
}

/// Description block of a staking validator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidatorDescription {
    /// Display name.
    #[serde(default)]
    pub moniker: String,
}

/// One validator from the staking catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct StakingValidator {
    /// Operator bech32 address.
    #[serde(alias = "operatorAddress")]
    pub operator_address: String,
    /// Consensus public key.
    #[serde(default, alias = "consensusPubkey")]
    pub consensus_pubkey: ConsensusPubkey,
    /// Jailed flag.
    #[serde(default)]
    pub jailed: bool,
    /// Bonding status string.
    #[serde(default)]
    pub status: String,
    /// Description with the moniker.
    #[serde(default)]
    pub description: ValidatorDescription,
}

/// Pagination envelope of list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    /// Cursor for the next page, absent on the last page.
    #[serde(default, alias = "nextKey")]
    pub next_key: Option<String>,
}

/// Envelope of `/cosmos/staking/v1beta1/validators`.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorsResponse {
    /// One page of validators.
    #[serde(default)]
    pub validators: Vec<StakingValidator>,
    /// Page cursor.
    #[serde(default)]
    pub pagination: Pagination,
}

/// One provider from the BTC-staking catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogProvider {
    /// BTC public key hex.
    #[serde(alias = "btcPk", alias = "btc_pk_hex", alias = "btcPkHex")]
    pub btc_pk: String,
    /// Babylon owner address.
    #[serde(default, alias = "owner_address", alias = "ownerAddress")]
    pub addr: String,
    /// Jailed flag.
    #[serde(default)]
    pub jailed: bool,
    /// Description with the moniker.
    #[serde(default)]
    pub description: ValidatorDescription,
}

/// Envelope of `/babylon/btcstaking/v1/finality_providers`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersResponse {
    /// One page of providers.
    #[serde(default)]
    pub finality_providers: Vec<CatalogProvider>,
    /// Page cursor.
    #[serde(default)]
    pub pagination: Pagination,
}

/// One provider active at a given height.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveProvider {
    /// BTC public key hex.
    #[serde(alias = "btcPkHex", alias = "btc_pk", alias = "btcPk")]
    pub btc_pk_hex: String,
    /// Voting power at the height.
    #[serde(default, alias = "votingPower", deserialize_with = "flex_u64_opt")]
    pub voting_power: Option<u64>,
}

/// Envelope of `/babylon/finality/v1/finality_providers/{h}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveProvidersResponse {
    /// Providers in the active set at the height.
    #[serde(default)]
    pub finality_providers: Vec<ActiveProvider>,
}

/// Envelope of `/babylon/finality/v1/votes/{h}`.
#[derive(Debug, Clone, Deserialize)]
pub struct VotesResponse {
    /// BTC public keys that voted on the height.
    #[serde(default, alias = "btcPks")]
    pub btc_pks: Vec<String>,
}

/// Envelope of `/babylon/epoching/v1/current_epoch`.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentEpochResponse {
    /// Current epoch number.
    #[serde(alias = "currentEpoch", deserialize_with = "flex_u64")]
    pub current_epoch: u64,
    /// First height of the next epoch, absent on older nodes.
    #[serde(default, alias = "epochBoundary", deserialize_with = "flex_u64_opt")]
    pub epoch_boundary: Option<u64>,
}

/// Type URI of the injected checkpoint message.
pub const INJECTED_CHECKPOINT_TYPE: &str = "/babylon.checkpointing.v1.MsgInjectedCheckpoint";

/// The raw checkpoint carrying the authoritative epoch number.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCheckpoint {
    /// Checkpointed epoch.
    #[serde(default, alias = "epochNum", deserialize_with = "flex_u64_opt")]
    pub epoch_num: Option<u64>,
}

/// Checkpoint-with-meta wrapper; the epoch may sit on either level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckpointMeta {
    /// Inner raw checkpoint.
    #[serde(default)]
    pub ckpt: RawCheckpoint,
    /// Epoch carried directly on the wrapper by some encodings.
    #[serde(default, alias = "epochNum", deserialize_with = "flex_u64_opt")]
    pub epoch_num: Option<u64>,
}

/// Validator reference inside a vote extension.
#[derive(Debug, Clone, Deserialize)]
pub struct VoteValidator {
    /// Address as carried in the extended commit, base64 consensus key form.
    #[serde(default)]
    pub address: String,
    /// Voting power of the validator.
    #[serde(default, deserialize_with = "flex_u64")]
    pub power: u64,
}

/// One vote of the extended commit carried by an injected checkpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct VoteExtension {
    /// The voting validator.
    pub validator: VoteValidator,
    /// Commit flag of the vote.
    #[serde(default, alias = "blockIdFlag")]
    pub block_id_flag: BlockIdFlag,
    /// Base64 BLS extension signature, absent or empty on a miss.
    #[serde(default, alias = "extensionSignature")]
    pub extension_signature: Option<String>,
}

impl VoteExtension {
    /// Whether the BLS signature was present and committed.
    pub fn is_signed(&self) -> bool {
        self.block_id_flag.is_commit()
            && self
                .extension_signature
                .as_deref()
                .is_some_and(|s| !s.is_empty())
    }
}

/// Extended commit info with the BLS vote vector.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendedCommitInfo {
    /// One entry per validator.
    #[serde(default)]
    pub votes: Vec<VoteExtension>,
}

/// An injected checkpoint message body.
#[derive(Debug, Clone, Deserialize)]
pub struct InjectedCheckpoint {
    /// Checkpoint metadata with the epoch number.
    #[serde(default)]
    pub ckpt: CheckpointMeta,
    /// Extended commit with the BLS votes.
    #[serde(default, alias = "extendedCommitInfo")]
    pub extended_commit_info: Option<ExtendedCommitInfo>,
}

impl InjectedCheckpoint {
    /// The embedded epoch number, whichever nesting level carries it.
    pub fn epoch_num(&self) -> Option<u64> {
        self.ckpt.ckpt.epoch_num.or(self.ckpt.epoch_num)
    }
}

/// Whether a decoded tx message is an injected checkpoint.
pub fn is_injected_checkpoint(message: &serde_json::Value) -> bool {
    message
        .get("@type")
        .or_else(|| message.get("type_url"))
        .and_then(|v| v.as_str())
        .is_some_and(|uri| uri == INJECTED_CHECKPOINT_TYPE)
}

/// Envelope of `/cosmos/tx/v1beta1/txs/block/{h}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockTxsResponse {
    /// Decoded transactions at the height.
    #[serde(default)]
    pub txs: Vec<Tx>,
}

/// One decoded transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct Tx {
    /// Transaction body with the message vector.
    #[serde(default)]
    pub body: TxBody,
}

/// Transaction body; messages stay raw until matched by type URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxBody {
    /// Raw messages of mixed types.
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}
