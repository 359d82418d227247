//! Engine data model: play events, the registry ABI, and the
//! expiring-nonce transaction envelope.

pub mod registry;
pub mod track;
pub mod transaction;

pub use track::PlayEvent;
pub use transaction::{Call, FeeMode, UnsignedTransaction};
