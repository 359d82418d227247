//! Play events and track identity derivation.

use alloy::{
    primitives::{Address, B256, keccak256},
    sol_types::SolValue,
};

use crate::{constants::MAX_TEXT_FIELD_BYTES, error::EngineError};

/// One observed playback of a track, as reported by the caller.
#[derive(Debug, Clone, Default)]
pub struct PlayEvent {
    /// Track title. Required.
    pub title: String,
    /// Artist name. Required.
    pub artist: String,
    /// Album name, if known.
    pub album: Option<String>,
    /// MusicBrainz recording id, if known. Takes precedence for track
    /// identity.
    pub mbid: Option<String>,
    /// External intellectual-property registry address, if the track is
    /// registered there. Used for identity when no MBID is present.
    pub ip_ref: Option<String>,
    /// Track duration in seconds.
    pub duration_sec: u32,
    /// Unix timestamp of the playback.
    pub played_at_sec: u64,
}

/// A play event resolved to its on-chain track identity.
///
/// The metadata fields here are the byte-capped values that actually go on
/// chain; identity is derived from these, so an oversized title truncates
/// the same way on every submission.
#[derive(Debug, Clone)]
pub struct TrackIdentity {
    /// Identity kind: 1 = MBID, 2 = external IP registry, 3 = metadata
    /// hash.
    pub kind: u8,
    /// Kind-specific 32-byte identity payload.
    pub payload: B256,
    /// The derived track id.
    pub id: B256,
    /// Capped title.
    pub title: String,
    /// Capped artist.
    pub artist: String,
    /// Capped album, empty when unknown.
    pub album: String,
}

impl PlayEvent {
    /// Resolves this event's track identity, validating the input.
    pub fn identity(&self) -> Result<TrackIdentity, EngineError> {
        if self.title.trim().is_empty() {
            return Err(EngineError::InvalidInput("play event title is empty".into()));
        }
        if self.artist.trim().is_empty() {
            return Err(EngineError::InvalidInput("play event artist is empty".into()));
        }

        let title = truncate_to_bytes(&self.title, MAX_TEXT_FIELD_BYTES).to_string();
        let artist = truncate_to_bytes(&self.artist, MAX_TEXT_FIELD_BYTES).to_string();
        let album = truncate_to_bytes(self.album.as_deref().unwrap_or_default(), MAX_TEXT_FIELD_BYTES)
            .to_string();

        let (kind, payload) = derive_kind_and_payload(self, &title, &artist, &album)?;
        let id = compute_track_id(kind, payload);

        Ok(TrackIdentity { kind, payload, id, title, artist, album })
    }

    /// The on-chain track id this event resolves to.
    pub fn track_id(&self) -> Result<B256, EngineError> {
        Ok(self.identity()?.id)
    }
}

/// Picks the strongest available identity source.
fn derive_kind_and_payload(
    event: &PlayEvent,
    title: &str,
    artist: &str,
    album: &str,
) -> Result<(u8, B256), EngineError> {
    if let Some(mbid) = event.mbid.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        let raw = alloy::primitives::hex::decode(mbid.replace('-', ""))
            .map_err(|err| EngineError::InvalidInput(format!("invalid MBID hex: {err}")))?;
        if raw.len() != 16 {
            return Err(EngineError::InvalidInput(format!(
                "invalid MBID length: expected 16 bytes, got {}",
                raw.len()
            )));
        }
        let mut payload = [0u8; 32];
        payload[..16].copy_from_slice(&raw);
        return Ok((1, B256::from(payload)));
    }

    if let Some(ip_ref) = event.ip_ref.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        let normalized =
            if ip_ref.starts_with("0x") { ip_ref.to_string() } else { format!("0x{ip_ref}") };
        let address = normalized
            .parse::<Address>()
            .map_err(|err| EngineError::InvalidInput(format!("invalid IP reference: {err}")))?;
        let mut payload = [0u8; 32];
        payload[12..].copy_from_slice(address.as_slice());
        return Ok((2, B256::from(payload)));
    }

    let payload =
        keccak256((normalize(title), normalize(artist), normalize(album)).abi_encode());
    Ok((3, payload))
}

/// `keccak256(kind_word || payload)`, matching the registry contract.
pub fn compute_track_id(kind: u8, payload: B256) -> B256 {
    let mut kind_word = [0u8; 32];
    kind_word[31] = kind;

    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&kind_word);
    buf.extend_from_slice(payload.as_slice());
    keccak256(buf)
}

/// Case- and whitespace-insensitive form used for metadata-hash identity.
fn normalize(input: &str) -> String {
    input.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max` bytes without splitting a UTF-8 character.
pub(crate) fn truncate_to_bytes(input: &str, max: usize) -> &str {
    if input.len() <= max {
        return input;
    }
    let mut end = max;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(title: &str, artist: &str, album: &str) -> PlayEvent {
        PlayEvent {
            title: title.into(),
            artist: artist.into(),
            album: if album.is_empty() { None } else { Some(album.into()) },
            duration_sec: 180,
            played_at_sec: 1_700_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn metadata_identity_ignores_case_and_whitespace() {
        let a = event("Song", "Artist", "").identity().unwrap();
        let b = event("  soNG ", "ARTIST", "").identity().unwrap();

        assert_eq!(a.kind, 3);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn different_tracks_get_different_ids() {
        let a = event("Song", "Artist", "").identity().unwrap();
        let b = event("Song", "Other Artist", "").identity().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn mbid_takes_precedence() {
        let mut with_mbid = event("Song", "Artist", "");
        with_mbid.mbid = Some("12345678-1234-1234-1234-123456789abc".into());
        let identity = with_mbid.identity().unwrap();

        assert_eq!(identity.kind, 1);
        assert_eq!(&identity.payload[..4], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(&identity.payload[16..], &[0u8; 16]);
    }

    #[test]
    fn ip_reference_is_right_aligned() {
        let mut with_ip = event("Song", "Artist", "");
        with_ip.ip_ref = Some("0x1234567890abcdef1234567890abcdef12345678".into());
        let identity = with_ip.identity().unwrap();

        assert_eq!(identity.kind, 2);
        assert_eq!(&identity.payload[..12], &[0u8; 12]);
        assert_eq!(&identity.payload[12..14], &[0x12, 0x34]);
    }

    #[test]
    fn malformed_mbid_is_a_caller_error() {
        let mut bad = event("Song", "Artist", "");
        bad.mbid = Some("not-hex".into());
        assert!(matches!(bad.identity(), Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn empty_title_is_rejected() {
        assert!(matches!(event("  ", "Artist", "").identity(), Err(EngineError::InvalidInput(_))));
        assert!(matches!(event("Song", "", "").identity(), Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn oversized_fields_truncate_deterministically() {
        let long = "x".repeat(MAX_TEXT_FIELD_BYTES + 50);
        let a = event(&long, "Artist", "").identity().unwrap();
        let b = event(&long[..MAX_TEXT_FIELD_BYTES], "Artist", "").identity().unwrap();

        assert_eq!(a.title.len(), MAX_TEXT_FIELD_BYTES);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // Four-byte scorpions straddling the cut point.
        let input = "ab".to_string() + &"\u{1F982}".repeat(2);
        assert_eq!(truncate_to_bytes(&input, 6), "ab\u{1F982}");
        assert_eq!(truncate_to_bytes(&input, 5), "ab");
    }
}
