//! Engine constants.

use std::time::Duration;

/// Validity window attached to every transaction, in seconds.
///
/// Transactions carry an expiring nonce instead of a sequential one: they are
/// only valid until `now + EXPIRY_WINDOW_SECS` and simply lapse if not
/// included, so a stuck transaction can never block later ones.
pub const EXPIRY_WINDOW_SECS: u64 = 25;

/// Grace period added on top of a transaction's own expiry when waiting for
/// its receipt, in seconds. Covers block propagation after the last block in
/// which the transaction could still have been included.
pub const RECEIPT_GRACE_SECS: u64 = 6;

/// Interval between receipt polls.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(1_250);

/// Default overall timeout for receipt polling, in seconds.
pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 45;

/// Default total number of submission attempts per call (the first attempt
/// plus underpriced-replacement retries).
pub const DEFAULT_MAX_SUBMIT_ATTEMPTS: u32 = 5;

/// Delay between underpriced-replacement retries.
///
/// Kept short: the transaction's own validity window is only
/// [`EXPIRY_WINDOW_SECS`] long, so waiting longer risks expiring the
/// replacement before it is ever accepted.
pub const UNDERPRICED_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Minimum priority fee accepted by the sponsoring relay, in wei.
pub const RELAY_MIN_PRIORITY_FEE_PER_GAS: u128 = 1_000_000;

/// Minimum max fee accepted by the sponsoring relay, in wei.
pub const RELAY_MIN_MAX_FEE_PER_GAS: u128 = 2_000_000;

/// One gwei, in wei.
pub const ONE_GWEI: u128 = 1_000_000_000;

/// Extra buffer added on top of `eth_estimateGas` results.
pub const GAS_LIMIT_BUFFER: u64 = 250_000;

/// Minimum gas limit for a plain record call on an already-registered track.
pub const GAS_LIMIT_RECORD_MIN: u64 = 420_000;

/// Minimum gas limit for the combined register-and-record call.
pub const GAS_LIMIT_REGISTER_AND_RECORD_MIN: u64 = 1_500_000;

/// Minimum gas limit for the optional cover-reference setter.
pub const GAS_LIMIT_SET_COVER_MIN: u64 = 320_000;

/// Minimum gas limit for the optional lyrics-reference setter.
pub const GAS_LIMIT_SET_LYRICS_MIN: u64 = 340_000;

/// Byte cap for each of the title/artist/album metadata fields. Oversized
/// fields are truncated deterministically, never rejected.
pub const MAX_TEXT_FIELD_BYTES: usize = 256;

/// Byte cap for content reference strings (cover and lyrics refs).
pub const MAX_CONTENT_REF_BYTES: usize = 128;

/// Marker suffix identifying the sender hint appended to a signed
/// transaction before it is handed to the sponsoring relay for co-signing.
pub const SENDER_HINT_MARKER: [u8; 6] = [0xfe, 0xef, 0xee, 0xfe, 0xef, 0xee];

/// Type byte of the expiring-nonce transaction envelope.
pub const EXPIRING_TX_TYPE: u8 = 0x76;

/// Prefix byte of a keychain-wrapped sender signature.
pub const KEYCHAIN_SIGNATURE_PREFIX: u8 = 0x03;
