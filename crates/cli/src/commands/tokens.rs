//! Verification token maintenance.

use vic_shop_storefront::services::{SystemClock, TokenLedger};

use super::{CliError, store};

/// Delete tokens past their expiry, unused and used alike. Returns how many
/// were removed.
pub async fn sweep() -> Result<u64, CliError> {
    let store = store().await?;
    let clock = SystemClock;
    let ledger = TokenLedger::new(&clock);

    let removed = ledger.sweep_expired(&store).await?;
    let purged = ledger.purge_used(&store).await?;
    tracing::info!("Removed {removed} expired and {purged} used verification tokens");
    Ok(removed + purged)
}
