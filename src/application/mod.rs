//! Service layer: wallet operations, escrow money movement, and the order
//! lifecycle, all orchestrated against the storage port.

pub mod escrow;
pub mod orders;
pub mod splitter;
pub mod wallet;

use crate::error::{MarketError, Result};
use std::future::Future;

/// Runs a read-modify-write closure until it commits, retrying only on
/// version conflicts. `attempts` is the total number of tries before the
/// conflict is handed to the caller.
pub(crate) async fn retry_conflicts<T, F, Fut>(attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries = 0;
    loop {
        match op().await {
            Err(MarketError::Conflict(reason)) => {
                tries += 1;
                if tries >= attempts {
                    return Err(MarketError::Conflict(reason));
                }
                tracing::debug!(attempt = tries, "commit lost a version race, retrying");
            }
            other => return other,
        }
    }
}
