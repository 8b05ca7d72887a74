//! Protocol constants.
//!
//! Every tunable parameter has a default selected by the active protocol
//! version. Governance (mimir) may override any of them at runtime; the
//! override lookup lives with the store, this crate only knows defaults.

use {
    lazy_static::lazy_static,
    semver::Version,
    serde_derive::{Deserialize, Serialize},
    std::collections::HashMap,
    strum_macros::{Display, EnumIter, EnumString, IntoStaticStr},
};

/// Longest memo accepted on an observed transaction.
pub const MAX_MEMO_SIZE: usize = 250;

/// Accounts allowed to set mimir values directly.
pub const ADMINS: &[&str] = &["thoradmin"];

pub fn is_admin(addr: &str) -> bool {
    ADMINS.contains(&addr)
}

/// Allowed characters of a mimir key.
pub fn is_valid_mimir_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum ConstantName {
    MaxRuneSupply,
    BlocksPerYear,
    OutboundTransactionFee,
    NativeTransactionFee,
    KillSwitchStart,
    KillSwitchDuration,
    MinimumNodesForBFT,
    DesiredValidatorSet,
    AsgardSize,
    NumberOfNewNodesPerChurn,
    ChurnInterval,
    ChurnRetryInterval,
    BadValidatorRedline,
    LackOfObservationPenalty,
    SigningTransactionPeriod,
    DoubleSignMaxAge,
    PauseBond,
    PauseUnbond,
    MinimumBondInRune,
    MaxBondProviders,
    BondLockupPeriod,
    FundMigrationInterval,
    ArtificialRagnarokBlockHeight,
    DefaultPoolStatus,
    MaxOutboundAttempts,
    SlashPenalty,
    PauseOnSlashThreshold,
    FailKeygenSlashPoints,
    FailKeysignSlashPoints,
    LiquidityLockUpBlocks,
    ObserveSlashPoints,
    ObservationDelayFlexibility,
    JailTimeKeygen,
    JailTimeKeysign,
    NodePauseChainBlocks,
    NodeOperatorFee,
    EnableDerivedAssets,
    MinSwapsPerBlock,
    MaxSwapsPerBlock,
    EnableOrderBooks,
    MinSlashPointsForBadValidator,
    MinCR,
    MaxCR,
    PauseLoans,
    LoanRepaymentMaturity,
    LendingLever,
    MinTxOutVolumeThreshold,
    TxOutDelayRate,
    TxOutDelayMax,
    MaxTxOutOffset,
    TNSRegisterFee,
    TNSFeePerBlock,
    PermittedSolvencyGap,
    MaxNodeToChurnOutForLowVersion,
    RagnarokProcessNumOfLPPerIteration,
    ChurnMigrateRounds,
    AllowWideBlame,
    MaxAffiliateFeeBasisPoints,
    TargetOutboundFeeSurplusRune,
    MaxOutboundFeeMultiplierBasisPoints,
    MinOutboundFeeMultiplierBasisPoints,
    THORNames,
    MinimumNodesForYggdrasil,
    StopFundYggdrasil,
    YggFundLimit,
    YggFundRetry,
    PoolDepthForYggFundingMin,
    StrictBondLiquidityRatio,
}

/// Default values of every constant for one protocol version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantValues {
    version: Version,
    int64_values: HashMap<ConstantName, i64>,
    bool_values: HashMap<ConstantName, bool>,
    string_values: HashMap<ConstantName, String>,
}

impl ConstantValues {
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Integer value of `name`, zero when the constant is not an integer.
    pub fn get_int64_value(&self, name: ConstantName) -> i64 {
        self.int64_values.get(&name).copied().unwrap_or_default()
    }

    pub fn get_bool_value(&self, name: ConstantName) -> bool {
        self.bool_values.get(&name).copied().unwrap_or_default()
    }

    pub fn get_string_value(&self, name: ConstantName) -> String {
        self.string_values.get(&name).cloned().unwrap_or_default()
    }

    /// All integer constants keyed by name, for the constants query.
    pub fn int64_values(&self) -> impl Iterator<Item = (ConstantName, i64)> + '_ {
        self.int64_values.iter().map(|(k, v)| (*k, *v))
    }
}

lazy_static! {
    static ref INT64_V1: HashMap<ConstantName, i64> = {
        use ConstantName::*;
        [
            (MaxRuneSupply, -1),
            (BlocksPerYear, 5_256_000),
            (OutboundTransactionFee, 2_000_000),
            (NativeTransactionFee, 2_000_000),
            (KillSwitchStart, 0),
            (KillSwitchDuration, 5_256_000),
            (MinimumNodesForBFT, 4),
            (DesiredValidatorSet, 100),
            (AsgardSize, 40),
            (NumberOfNewNodesPerChurn, 1),
            (ChurnInterval, 43_200),
            (ChurnRetryInterval, 720),
            (BadValidatorRedline, 3),
            (LackOfObservationPenalty, 2),
            (SigningTransactionPeriod, 300),
            (DoubleSignMaxAge, 24),
            (PauseBond, 0),
            (PauseUnbond, 0),
            (MinimumBondInRune, 1_000_000_00000000),
            (MaxBondProviders, 6),
            (BondLockupPeriod, 0),
            (FundMigrationInterval, 360),
            (ArtificialRagnarokBlockHeight, 0),
            (MaxOutboundAttempts, 0),
            (SlashPenalty, 15_000),
            (PauseOnSlashThreshold, 100_00000000),
            (FailKeygenSlashPoints, 720),
            (FailKeysignSlashPoints, 2),
            (LiquidityLockUpBlocks, 0),
            (ObserveSlashPoints, 1),
            (ObservationDelayFlexibility, 10),
            (JailTimeKeygen, 720 * 6),
            (JailTimeKeysign, 60),
            (NodePauseChainBlocks, 720),
            (NodeOperatorFee, 500),
            (EnableDerivedAssets, 0),
            (MinSwapsPerBlock, 10),
            (MaxSwapsPerBlock, 100),
            (EnableOrderBooks, 0),
            (MinSlashPointsForBadValidator, 100),
            (MinCR, 10_000),
            (MaxCR, 60_000),
            (PauseLoans, 1),
            (LoanRepaymentMaturity, 0),
            (LendingLever, 3333),
            (MinTxOutVolumeThreshold, 1000_00000000),
            (TxOutDelayRate, 25_00000000),
            (TxOutDelayMax, 17_280),
            (MaxTxOutOffset, 720),
            (TNSRegisterFee, 10_00000000),
            (TNSFeePerBlock, 20),
            (PermittedSolvencyGap, 100),
            (MaxNodeToChurnOutForLowVersion, 1),
            (RagnarokProcessNumOfLPPerIteration, 200),
            (ChurnMigrateRounds, 5),
            (AllowWideBlame, 0),
            (MaxAffiliateFeeBasisPoints, 10_000),
            (TargetOutboundFeeSurplusRune, 100_000_00000000),
            (MaxOutboundFeeMultiplierBasisPoints, 30_000),
            (MinOutboundFeeMultiplierBasisPoints, 15_000),
            (THORNames, 1),
            (MinimumNodesForYggdrasil, 6),
            (StopFundYggdrasil, 0),
            (YggFundLimit, 50),
            (YggFundRetry, 1_000),
            (PoolDepthForYggFundingMin, 500_000_00000000),
        ]
        .into_iter()
        .collect()
    };
}

fn constant_values_v1(version: &Version) -> ConstantValues {
    ConstantValues {
        version: version.clone(),
        int64_values: INT64_V1.clone(),
        bool_values: [(ConstantName::StrictBondLiquidityRatio, true)]
            .into_iter()
            .collect(),
        string_values: [(ConstantName::DefaultPoolStatus, "Staged".to_string())]
            .into_iter()
            .collect(),
    }
}

type ConstantValuesFn = fn(&Version) -> ConstantValues;

/// Value sets ordered newest first; the first whose minimum version the
/// active version meets wins.
static CONSTANT_VALUE_SETS: &[(u64, u64, u64, ConstantValuesFn)] = &[(0, 0, 1, constant_values_v1)];

/// Constant defaults in force for `version`.
pub fn get_constant_values(version: &Version) -> ConstantValues {
    CONSTANT_VALUE_SETS
        .iter()
        .find(|(major, minor, patch, _)| *version >= Version::new(*major, *minor, *patch))
        .map(|(_, _, _, f)| f(version))
        .unwrap_or_else(|| constant_values_v1(version))
}
