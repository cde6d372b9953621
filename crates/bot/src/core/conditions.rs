//! Market-condition support for a directional hypothesis.
//!
//! Every check depends on one optional data source. A missing source removes
//! its checks from both `passed_count` and `evaluated_count`; it never fails
//! the check and never aborts the evaluation.

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::ConditionParams;
use crate::core::indicators;
use crate::errors::BotError;
use crate::types::{ConditionCheck, ConditionScore, MarketConditionSnapshot, PositionDirection};

pub struct ConditionValidator {
    params: ConditionParams,
}

impl ConditionValidator {
    pub fn new(params: ConditionParams) -> Self {
        Self { params }
    }

    pub fn evaluate(
        &self,
        direction: Option<PositionDirection>,
        snapshot: &MarketConditionSnapshot,
    ) -> ConditionScore {
        let Some(direction) = direction else {
            return ConditionScore {
                score: Decimal::ZERO,
                passed_count: 0,
                evaluated_count: 0,
                checks: Vec::new(),
                unavailable: Vec::new(),
            };
        };

        let mut checks = Vec::with_capacity(4);
        let mut unavailable = Vec::new();

        // -- Order book: imbalance + spread ----------------------------------
        match &snapshot.order_book {
            Some(book) => {
                match indicators::bid_ask_ratio(
                    &book.bids,
                    &book.asks,
                    self.params.book_depth_levels as usize,
                ) {
                    Some(ratio) => checks.push(self.imbalance_check(direction, ratio)),
                    None => note_unavailable(&mut unavailable, "order_book_depth"),
                }
                match book
                    .best_bid()
                    .zip(book.best_ask())
                    .and_then(|(bid, ask)| indicators::spread_bps(bid, ask))
                {
                    Some(bps) => checks.push(ConditionCheck {
                        name: "spread",
                        passed: bps <= self.params.max_spread_bps,
                        detail: format!(
                            "{} bps (max {})",
                            bps.round_dp(2),
                            self.params.max_spread_bps
                        ),
                    }),
                    None => note_unavailable(&mut unavailable, "order_book_top"),
                }
            }
            None => note_unavailable(&mut unavailable, "order_book"),
        }

        // -- Funding ---------------------------------------------------------
        match snapshot.funding_rate {
            Some(rate) => {
                // Crowded side pays: longs want non-positive funding, shorts non-negative.
                let passed = match direction {
                    PositionDirection::Long => rate <= Decimal::ZERO,
                    PositionDirection::Short => rate >= Decimal::ZERO,
                };
                checks.push(ConditionCheck {
                    name: "funding_rate",
                    passed,
                    detail: format!("funding {rate} for {}", direction.as_str()),
                });
            }
            None => note_unavailable(&mut unavailable, "funding_rate"),
        }

        // -- Open interest ---------------------------------------------------
        match snapshot.open_interest_change_pct {
            Some(change) => checks.push(ConditionCheck {
                name: "open_interest",
                passed: change >= self.params.min_open_interest_change_pct,
                detail: format!(
                    "OI change {change}% (min {}%)",
                    self.params.min_open_interest_change_pct
                ),
            }),
            None => note_unavailable(&mut unavailable, "open_interest"),
        }

        let evaluated_count = checks.len() as u32;
        let passed_count = checks.iter().filter(|c| c.passed).count() as u32;
        let score = if evaluated_count == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(passed_count) / Decimal::from(evaluated_count)
        };

        debug!(
            direction = direction.as_str(),
            passed_count,
            evaluated_count,
            score = %score,
            unavailable = ?unavailable,
            "condition checks evaluated"
        );

        ConditionScore {
            score,
            passed_count,
            evaluated_count,
            checks,
            unavailable,
        }
    }

    fn imbalance_check(&self, direction: PositionDirection, ratio: Decimal) -> ConditionCheck {
        let min = self.params.min_book_imbalance;
        let passed = match direction {
            PositionDirection::Long => ratio >= min,
            PositionDirection::Short => ratio * min <= Decimal::ONE,
        };
        ConditionCheck {
            name: "book_imbalance",
            passed,
            detail: format!("bid/ask depth {} (min {min} for {})", ratio.round_dp(3), direction.as_str()),
        }
    }
}

fn note_unavailable(unavailable: &mut Vec<String>, source: &str) {
    let err = BotError::PartialDataUnavailable {
        source_name: source.to_string(),
    };
    debug!(error = %err, "condition check skipped");
    unavailable.push(source.to_string());
}
