//! `vouchsafe generate` — mint candidate voucher codes for a tier.

use super::output;
use crate::codes::{self, Tier};
use anyhow::Result;

pub async fn run(value: u32, count: usize) -> Result<()> {
    let tier = Tier::from_value(value)?;
    let batch = codes::generate_codes(tier, count);

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "tier": tier.value(),
            "prefix": tier.prefix(),
            "codes": batch,
        }));
        return Ok(());
    }

    // The codes are the output; print them even under --quiet.
    for code in &batch {
        println!("{code}");
    }
    output::print_line(&format!("{count} candidate(s) for {tier}"));
    Ok(())
}
