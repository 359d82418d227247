//! The expiring-nonce transaction envelope.
//!
//! Wire format: `0x76 || rlp(fields)`. The nonce key is pinned to the
//! all-ones expiring-nonce domain and the nonce itself stays zero; replay
//! protection comes from the `valid_before` timestamp instead of a
//! sequential counter. The signing digest is the keccak hash of the typed
//! envelope without the sender signature; the sender signature is appended
//! as a keychain wrapper naming the wallet the signing key acts for.

use alloy::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    rlp::{Encodable, Header},
};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{EXPIRING_TX_TYPE, KEYCHAIN_SIGNATURE_PREFIX, SENDER_HINT_MARKER},
    signature::RecoverableSignature,
};

/// Nonce key selecting the expiring-nonce domain.
pub const EXPIRING_NONCE_KEY: U256 = U256::MAX;

/// Who pays the gas for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeMode {
    /// The sponsoring relay co-signs and pays; costs the sender nothing.
    RelaySponsored,
    /// The sender pays out of its own balance.
    SelfPaid,
}

impl FeeMode {
    /// Envelope byte identifying the payer path.
    const fn as_byte(self) -> u8 {
        match self {
            Self::RelaySponsored => 0x00,
            Self::SelfPaid => 0x01,
        }
    }
}

/// A single call carried by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Callee address.
    pub to: Address,
    /// Native value to attach.
    pub value: U256,
    /// Calldata.
    pub input: Bytes,
}

/// An unsigned expiring-nonce transaction.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    /// Chain id the transaction is valid on.
    pub chain_id: u64,
    /// Nonce key; always [`EXPIRING_NONCE_KEY`] here.
    pub nonce_key: U256,
    /// Nonce within the key's domain; always zero for expiring nonces.
    pub nonce: u64,
    /// Unix timestamp after which the transaction is invalid. Always
    /// `now + expiry window`, never open-ended.
    pub valid_before_secs: u64,
    /// Maximum priority fee per gas, in wei.
    pub max_priority_fee_per_gas: u128,
    /// Maximum total fee per gas, in wei.
    pub max_fee_per_gas: u128,
    /// Who pays the gas.
    pub fee_mode: FeeMode,
    /// Gas limit.
    pub gas_limit: u64,
    /// The calls to execute, in order.
    pub calls: Vec<Call>,
    /// Pre-encoded key-authorization blob introducing a fresh signing key
    /// to the wallet's keychain, when one is needed.
    pub key_authorization: Option<Bytes>,
}

impl UnsignedTransaction {
    /// The digest the sender signature commits to.
    ///
    /// Fees are part of the digest, so every re-bid forces a fresh
    /// signature and a stale one can never be replayed at a new fee tier.
    pub fn signature_hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(256);
        buf.push(EXPIRING_TX_TYPE);
        self.encode_fields(&mut buf, None);
        keccak256(&buf)
    }

    /// Encodes the signed envelope, wrapping `signature` in a keychain
    /// signature that names the wallet the signing key acts for.
    pub fn encode_signed(&self, wallet: Address, signature: &RecoverableSignature) -> Bytes {
        let mut keychain = Vec::with_capacity(1 + 20 + 65);
        keychain.push(KEYCHAIN_SIGNATURE_PREFIX);
        keychain.extend_from_slice(wallet.as_slice());
        keychain.extend_from_slice(&signature.to_rsv_bytes());

        let mut out = Vec::with_capacity(512);
        out.push(EXPIRING_TX_TYPE);
        self.encode_fields(&mut out, Some(&keychain));
        out.into()
    }

    /// RLP-encodes the envelope body into `out`, appending the sender
    /// signature when present.
    fn encode_fields(&self, out: &mut Vec<u8>, sender_signature: Option<&[u8]>) {
        let mut payload = Vec::with_capacity(256);

        self.chain_id.encode(&mut payload);
        self.max_priority_fee_per_gas.encode(&mut payload);
        self.max_fee_per_gas.encode(&mut payload);
        self.gas_limit.encode(&mut payload);
        encode_calls(&self.calls, &mut payload);
        encode_empty_list(&mut payload); // access list, unused
        self.nonce_key.encode(&mut payload);
        self.nonce.encode(&mut payload);
        self.valid_before_secs.encode(&mut payload);
        Bytes::new().encode(&mut payload); // valid_after, unused
        Bytes::new().encode(&mut payload); // fee token, native only
        [self.fee_mode.as_byte()].as_slice().encode(&mut payload);
        encode_empty_list(&mut payload); // extensions, unused

        if let Some(authorization) = &self.key_authorization {
            // Already encoded by the wallet; spliced in verbatim.
            payload.extend_from_slice(authorization);
        }
        if let Some(signature) = sender_signature {
            signature.encode(&mut payload);
        }

        Header { list: true, payload_length: payload.len() }.encode(out);
        out.extend_from_slice(&payload);
    }
}

fn encode_calls(calls: &[Call], out: &mut Vec<u8>) {
    let mut body = Vec::with_capacity(128 * calls.len());
    for call in calls {
        let mut fields = Vec::with_capacity(64 + call.input.len());
        call.to.encode(&mut fields);
        call.value.encode(&mut fields);
        call.input.encode(&mut fields);
        Header { list: true, payload_length: fields.len() }.encode(&mut body);
        body.extend_from_slice(&fields);
    }
    Header { list: true, payload_length: body.len() }.encode(out);
    out.extend_from_slice(&body);
}

fn encode_empty_list(out: &mut Vec<u8>) {
    Header { list: true, payload_length: 0 }.encode(out);
}

/// Appends the wallet address plus a fixed marker to a signed envelope so
/// the sponsoring relay knows which account the fee sponsorship is for
/// without decoding the envelope.
pub fn with_sender_hint(raw: &Bytes, wallet: Address) -> Bytes {
    let mut out = Vec::with_capacity(raw.len() + 20 + SENDER_HINT_MARKER.len());
    out.extend_from_slice(raw);
    out.extend_from_slice(wallet.as_slice());
    out.extend_from_slice(&SENDER_HINT_MARKER);
    out.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn sample_tx() -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: 42_431,
            nonce_key: EXPIRING_NONCE_KEY,
            nonce: 0,
            valid_before_secs: 1_700_000_025,
            max_priority_fee_per_gas: 1_000_000,
            max_fee_per_gas: 2_000_000,
            fee_mode: FeeMode::RelaySponsored,
            gas_limit: 420_000,
            calls: vec![Call {
                to: address!("0541443c41a6f923d518ac23921778e2ea102891"),
                value: U256::ZERO,
                input: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            }],
            key_authorization: None,
        }
    }

    #[test]
    fn digest_is_deterministic_and_fee_sensitive() {
        let tx = sample_tx();
        assert_eq!(tx.signature_hash(), tx.signature_hash());

        let mut bumped = sample_tx();
        bumped.max_priority_fee_per_gas += 1;
        assert_ne!(tx.signature_hash(), bumped.signature_hash());

        let mut extended = sample_tx();
        extended.valid_before_secs += 1;
        assert_ne!(tx.signature_hash(), extended.signature_hash());
    }

    #[test]
    fn fee_mode_changes_the_digest() {
        let sponsored = sample_tx();
        let mut self_paid = sample_tx();
        self_paid.fee_mode = FeeMode::SelfPaid;
        assert_ne!(sponsored.signature_hash(), self_paid.signature_hash());
    }

    #[test]
    fn signed_envelope_is_typed_and_carries_the_keychain_wrapper() {
        let tx = sample_tx();
        let wallet = address!("00000000000000000000000000000000000000aa");
        let signature =
            RecoverableSignature::new(B256::repeat_byte(0x01), B256::repeat_byte(0x02), 1);

        let raw = tx.encode_signed(wallet, &signature);
        assert_eq!(raw[0], EXPIRING_TX_TYPE);

        // The keychain wrapper is the last field: prefix, wallet, r||s||v.
        let mut expected_tail = vec![KEYCHAIN_SIGNATURE_PREFIX];
        expected_tail.extend_from_slice(wallet.as_slice());
        expected_tail.extend_from_slice(&signature.to_rsv_bytes());
        assert!(raw.ends_with(&expected_tail));
        assert_eq!(*raw.last().unwrap(), 27 + 1);
    }

    #[test]
    fn key_authorization_is_part_of_the_digest() {
        let plain = sample_tx();
        let mut authorized = sample_tx();
        authorized.key_authorization = Some(Bytes::from(vec![0x80])); // rlp("")
        assert_ne!(plain.signature_hash(), authorized.signature_hash());
    }

    #[test]
    fn sender_hint_is_appended_verbatim() {
        let wallet = address!("00000000000000000000000000000000000000bb");
        let raw = Bytes::from(vec![0x76, 0x01, 0x02]);
        let hinted = with_sender_hint(&raw, wallet);

        assert!(hinted.starts_with(&raw));
        assert!(hinted.ends_with(&SENDER_HINT_MARKER));
        assert_eq!(hinted.len(), raw.len() + 20 + SENDER_HINT_MARKER.len());
        assert_eq!(&hinted[raw.len()..raw.len() + 20], wallet.as_slice());
    }
}
