//! Stake sizing.
//!
//! Blends a half-Kelly baseline with a hand-weighted reward term, then
//! scales by streak and market-stability multipliers. The reward is a fixed
//! linear formula, not a learned policy; nothing is remembered between calls.

use tracing::debug;

use super::kelly::kelly_fraction;
use crate::config::StakeConfig;
use crate::types::{StakeDecision, Streaks};

/// Share of the raw Kelly fraction added to the base stake.
const KELLY_SHARE: f64 = 0.5;
/// Share of the reward added to the base stake.
const REWARD_SHARE: f64 = 0.3;

const HOT_STREAK_MIN: u32 = 4;
const COLD_STREAK_MIN: u32 = 3;

const SHARP_MONEY_THRESHOLD: f64 = 0.65;
const SHARP_MONEY_BOOST: f64 = 1.2;
const VOLATILITY_THRESHOLD: f64 = 0.02;
const VOLATILITY_DAMPING: f64 = 0.7;

/// Per-tip signals the sizer consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StakeInputs {
    pub probability: f64,
    pub odds: f64,
    /// Closing line value, roughly −0.2 … +0.3.
    pub clv: f64,
    /// Smart-money strength in [0, 1].
    pub sharp_money: f64,
    /// Market volatility (std of implied probability).
    pub volatility: f64,
    pub confidence: f64,
    pub risk: f64,
    /// Value score in [0, 1].
    pub value_score: f64,
}

pub struct StakeSizer {
    config: StakeConfig,
}

impl StakeSizer {
    pub fn new(config: StakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StakeConfig {
        &self.config
    }

    /// `0.40·value + 0.30·clv + 0.20·confidence − 0.15·risk`.
    pub fn reward(inputs: &StakeInputs) -> f64 {
        inputs.value_score * 0.40 + inputs.clv * 0.30 + inputs.confidence * 0.20
            - inputs.risk * 0.15
    }

    /// Hot streak is checked first; only one branch applies.
    pub fn streak_modifier(&self, streaks: &Streaks) -> f64 {
        if streaks.hot_streak >= HOT_STREAK_MIN {
            self.config.aggressive_factor
        } else if streaks.cold_streak >= COLD_STREAK_MIN {
            self.config.protect_factor
        } else {
            1.0
        }
    }

    pub fn market_modifier(sharp_money: f64, volatility: f64) -> f64 {
        if sharp_money > SHARP_MONEY_THRESHOLD {
            SHARP_MONEY_BOOST
        } else if volatility > VOLATILITY_THRESHOLD {
            VOLATILITY_DAMPING
        } else {
            1.0
        }
    }

    /// Size a stake. `stake_pct` always lands in `[min_stake_pct, max_stake_pct]`.
    pub fn size(
        &self,
        bankroll: f64,
        inputs: &StakeInputs,
        streaks: Option<&Streaks>,
    ) -> StakeDecision {
        let c = &self.config;
        let kelly_raw = kelly_fraction(inputs.probability, inputs.odds);
        let reward = Self::reward(inputs);
        let streak_mod = self.streak_modifier(&streaks.copied().unwrap_or_default());
        let market_mod = Self::market_modifier(inputs.sharp_money, inputs.volatility);

        let raw = (c.base_stake_pct + kelly_raw * KELLY_SHARE + reward * REWARD_SHARE)
            * streak_mod
            * market_mod;
        let stake_pct = if raw.is_finite() {
            raw.clamp(c.min_stake_pct, c.max_stake_pct)
        } else {
            c.min_stake_pct
        };
        let bankroll = if bankroll.is_finite() { bankroll.max(0.0) } else { 0.0 };
        let stake_amount = bankroll * stake_pct;

        debug!(
            kelly_raw,
            reward,
            streak_mod,
            market_mod,
            stake_pct = format!("{:.2}%", stake_pct * 100.0),
            stake_amount = format!("${:.2}", stake_amount),
            "Stake sized"
        );

        StakeDecision {
            stake_pct,
            stake_amount,
            kelly_raw,
            reward,
            streak_mod,
            market_mod,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
