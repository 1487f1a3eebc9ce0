//! Inbound/outbound adapters: the CSV command stream and report format
//! used by the replay binary.

pub mod csv;
pub mod replay;
