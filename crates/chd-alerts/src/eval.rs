//! Threshold evaluation. Pure, no IO, no time.
//!
//! Boundary is inclusive on both sides: an `above` rule at 100 fires at
//! exactly 100.00, a `below` rule at 60_000 fires at exactly 60_000.

use chd_schemas::{AlertRule, Direction};

/// Whether `price_micros` satisfies the threshold.
pub fn should_fire(direction: Direction, target_price_micros: i64, price_micros: i64) -> bool {
    match direction {
        Direction::Above => price_micros >= target_price_micros,
        Direction::Below => price_micros <= target_price_micros,
    }
}

/// Rule-level convenience over [`should_fire`]. State checks stay in the
/// store; this only answers the price question.
pub fn rule_triggers(rule: &AlertRule, price_micros: i64) -> bool {
    should_fire(rule.direction, rule.target_price_micros, price_micros)
}
