//! Core model: wallets, orders, escrow, and the ledger. Pure data and
//! transition rules; persistence and orchestration live elsewhere.

pub mod escrow;
pub mod money;
pub mod order;
pub mod ports;
pub mod transaction;
pub mod wallet;

use uuid::Uuid;

/// External identity of a buyer or seller, issued by the surrounding
/// platform and treated as opaque here.
pub type UserId = String;

pub type OrderId = Uuid;
pub type SuborderId = Uuid;
pub type EscrowId = Uuid;
pub type TransactionId = Uuid;
pub type DisputeId = Uuid;
