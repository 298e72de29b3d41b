//! Per-token prices for the Anthropic models the planner is run with.

use rust_decimal::Decimal;

/// `(input, output)` USD per token. Unknown models are priced as Sonnet.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    let model = model.to_ascii_lowercase();
    if model.contains("opus") {
        (Decimal::new(15, 6), Decimal::new(75, 6))
    } else if model.contains("haiku") {
        (Decimal::new(8, 7), Decimal::new(4, 6))
    } else {
        (Decimal::new(3, 6), Decimal::new(15, 6))
    }
}
