//! Signature canonicalization and recovery-id resolution.
//!
//! Remote threshold signers do not agree on a response schema: some return
//! `r`/`s` fields, some a packed `signature`, and the recovery id shows up as
//! `recid`, `recoveryId`, `recovery_id` or `v`, or not at all. This module
//! parses whatever shape arrives, normalizes `s` to the lower half of the
//! curve order, and resolves the recovery id by recovering the signer
//! address and matching it against the expected one, brute-forcing all four
//! candidate ids when the reported one does not check out.

use alloy::{
    primitives::{Address, B256, hex},
    signers::{
        k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey},
        utils::public_key_to_address,
    },
};
use serde_json::Value;

/// Errors produced while parsing or resolving a signature.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The signing backend returned a response shape we do not understand.
    #[error("unsupported signature response shape: {0}")]
    UnsupportedShape(String),
    /// A signature component failed to parse.
    #[error("malformed signature component: {0}")]
    Malformed(String),
    /// No recovery id candidate recovered the expected signer address.
    #[error(
        "signature recovery failed for {expected}: attempted ids {attempted:?}, recovered {recovered:?}"
    )]
    RecoveryFailed {
        /// The address the signature was expected to recover to.
        expected: Address,
        /// Every recovery id candidate that was tried, in order.
        attempted: Vec<u8>,
        /// The addresses the failing candidates recovered to.
        recovered: Vec<Address>,
    },
}

/// An ECDSA signature over secp256k1 with an explicit recovery id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    /// The `r` scalar.
    pub r: B256,
    /// The `s` scalar.
    pub s: B256,
    /// Recovery id, `0..=3`. Ids 2 and 3 only occur for overflowed `r`.
    pub recovery_id: u8,
}

impl RecoverableSignature {
    /// Creates a signature from raw scalars and a recovery id.
    pub fn new(r: B256, s: B256, recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    /// Parses a packed `r || s || v` signature.
    pub fn from_rsv_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != 65 {
            return Err(SignatureError::Malformed(format!(
                "expected 65 signature bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            r: B256::from_slice(&bytes[..32]),
            s: B256::from_slice(&bytes[32..64]),
            recovery_id: normalize_recovery_id(bytes[64]),
        })
    }

    /// Parses a signature out of a provider-shaped JSON response.
    ///
    /// Prefers a packed `signature` field when present since it avoids the
    /// schema differences in the scalar fields; falls back to `r`/`s`. The
    /// recovery id is a best guess here and must still be resolved with
    /// [`Self::resolved_for`].
    pub fn from_provider_json(response: &Value) -> Result<Self, SignatureError> {
        let guessed_id = parse_recovery_id(response).unwrap_or(0);

        if let Some(signature) = response.get("signature").and_then(Value::as_str) {
            let mut sig_hex = normalize_hex(signature)?;
            if sig_hex.len() == 130 {
                let v = u8::from_str_radix(&sig_hex[128..130], 16)
                    .map_err(|err| SignatureError::Malformed(err.to_string()))?;
                return Ok(Self {
                    r: parse_hex_word(&sig_hex[..64])?,
                    s: parse_hex_word(&sig_hex[64..128])?,
                    recovery_id: normalize_recovery_id(v),
                });
            }
            if sig_hex.len() < 128 {
                return Err(SignatureError::Malformed(format!(
                    "packed signature shorter than 64 bytes ({} hex chars)",
                    sig_hex.len()
                )));
            }
            // Some backends append metadata bytes; keep only r || s.
            sig_hex.truncate(128);
            return Ok(Self {
                r: parse_hex_word(&sig_hex[..64])?,
                s: parse_hex_word(&sig_hex[64..])?,
                recovery_id: guessed_id,
            });
        }

        if let (Some(r), Some(s)) = (
            response.get("r").and_then(Value::as_str),
            response.get("s").and_then(Value::as_str),
        ) {
            return Ok(Self {
                r: parse_hex_word(&normalize_hex(r)?)?,
                s: parse_hex_word(&normalize_hex(s)?)?,
                recovery_id: guessed_id,
            });
        }

        Err(SignatureError::UnsupportedShape(response.to_string()))
    }

    /// Normalizes `s` to the lower half of the curve order.
    ///
    /// Negating `s` flips which of the two candidate public keys the
    /// signature recovers to, so the recovery-id parity flips with it.
    /// Canonicalizing an already-canonical signature returns it unchanged.
    pub fn canonicalized(self) -> Self {
        let Ok(sig) = EcdsaSignature::from_scalars(self.r.0, self.s.0) else {
            return self;
        };
        match sig.normalize_s() {
            Some(normalized) => {
                let bytes = normalized.to_bytes();
                Self {
                    r: self.r,
                    s: B256::from_slice(&bytes[32..]),
                    recovery_id: self.recovery_id ^ 1,
                }
            }
            None => self,
        }
    }

    /// Recovers the signer address for the current recovery id, if the
    /// signature and id are structurally valid.
    pub fn recover_address(&self, digest: &B256) -> Option<Address> {
        let sig = EcdsaSignature::from_scalars(self.r.0, self.s.0).ok()?;
        let recovery_id = RecoveryId::from_byte(self.recovery_id)?;
        let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recovery_id).ok()?;
        Some(public_key_to_address(&key))
    }

    /// Resolves the recovery id against `expected`.
    ///
    /// Tries the currently-set id first, then every other candidate in
    /// `0..=3`, and returns the signature with the first id that recovers
    /// `expected`. Fails loudly with every attempted candidate otherwise;
    /// a wrong signer must never be returned silently.
    pub fn resolved_for(
        mut self,
        digest: &B256,
        expected: Address,
    ) -> Result<Self, SignatureError> {
        let guess = self.recovery_id;
        let mut attempted = Vec::with_capacity(4);
        let mut recovered = Vec::new();

        for candidate in core::iter::once(guess).chain((0..4u8).filter(|id| *id != guess)) {
            self.recovery_id = candidate;
            attempted.push(candidate);
            match self.recover_address(digest) {
                Some(address) if address == expected => return Ok(self),
                Some(address) => recovered.push(address),
                None => {}
            }
        }

        Err(SignatureError::RecoveryFailed { expected, attempted, recovered })
    }

    /// Packs the signature as `r || s || v` with `v = 27 + recovery_id`.
    pub fn to_rsv_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(self.r.as_slice());
        out[32..64].copy_from_slice(self.s.as_slice());
        out[64] = 27 + self.recovery_id;
        out
    }
}

/// Maps legacy `v` values (27/28) down to recovery ids.
fn normalize_recovery_id(v: u8) -> u8 {
    if v >= 27 { v - 27 } else { v }
}

/// Extracts a recovery id from whichever field the backend used.
fn parse_recovery_id(response: &Value) -> Option<u8> {
    for key in ["recid", "recoveryId", "recovery_id", "v"] {
        let Some(value) = response.get(key) else {
            continue;
        };
        if let Some(num) = value.as_u64() {
            return Some(normalize_recovery_id(num as u8));
        }
        if let Some(text) = value.as_str() {
            let text = text.trim();
            if let Ok(num) = text.parse::<u64>() {
                return Some(normalize_recovery_id(num as u8));
            }
            let stripped = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
            if let Ok(num) = u8::from_str_radix(stripped, 16) {
                return Some(normalize_recovery_id(num));
            }
        }
    }
    None
}

/// Strips `0x`, stray quoting, and odd length from a hex string.
fn normalize_hex(input: &str) -> Result<String, SignatureError> {
    let mut trimmed = input.trim();

    // Some backends double-encode hex as a quoted JSON string.
    loop {
        let bytes = trimmed.as_bytes();
        if bytes.len() >= 2
            && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
                || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
        {
            trimmed = trimmed[1..bytes.len() - 1].trim();
            continue;
        }
        break;
    }

    let mut out = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .to_ascii_lowercase();
    if out.is_empty() {
        return Err(SignatureError::Malformed("empty hex string".into()));
    }
    if !out.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SignatureError::Malformed(format!("non-hex characters in {input:?}")));
    }
    if out.len() % 2 != 0 {
        out.insert(0, '0');
    }
    Ok(out)
}

/// Parses a hex string into a left-padded 32-byte word. Longer inputs are
/// accepted when the excess is all zeros (sign extension from some backends).
fn parse_hex_word(input: &str) -> Result<B256, SignatureError> {
    let hex_str = if input.len() > 64 {
        let (prefix, word) = input.split_at(input.len() - 64);
        if !prefix.bytes().all(|b| b == b'0') {
            return Err(SignatureError::Malformed(format!(
                "hex word exceeds 32 bytes and is not zero-prefixed: {input}"
            )));
        }
        word
    } else {
        input
    };

    let raw = hex::decode(format!("{hex_str:0>64}"))
        .map_err(|err| SignatureError::Malformed(err.to_string()))?;
    Ok(B256::from_slice(&raw))
}
