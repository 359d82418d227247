//! The fixed play-event registry interface.
//!
//! The deployed contract's function set is not redesigned here; the two
//! metadata setters are optional and their presence is probed at runtime
//! before use (see [`crate::probe`]).

use alloy::sol_types::{SolCall, sol};

use crate::error::EngineError;

sol! {
    function isRegistered(bytes32 trackId) view returns (bool);

    function scrobbleBatch(
        address user,
        bytes32[] trackIds,
        uint64[] timestamps
    );

    function registerAndScrobbleBatch(
        address user,
        uint8[] regKinds,
        bytes32[] regPayloads,
        string[] titles,
        string[] artists,
        string[] albums,
        uint32[] durations,
        bytes32[] trackIds,
        uint64[] timestamps
    );

    function getTrack(bytes32 trackId) view returns (
        string title,
        string artist,
        string album,
        uint8 kind,
        bytes32 payload,
        uint64 registeredAt,
        string coverRef,
        uint32 durationSec
    );

    function getTrackLyrics(bytes32 trackId) view returns (string lyricsRef);

    function setTrackCoverFor(
        address user,
        bytes32 trackId,
        string coverRef
    );

    function setTrackLyricsFor(
        address user,
        bytes32 trackId,
        string lyricsRef
    );
}

/// Decodes an `isRegistered` answer.
pub(crate) fn decode_is_registered(data: &[u8]) -> Result<bool, EngineError> {
    Ok(isRegisteredCall::abi_decode_returns(data)?)
}

/// Decodes the cover reference out of a `getTrack` answer.
///
/// An unregistered track or an empty reference is legitimately "no cover
/// yet", not a decode failure; undersized or garbled data still is one.
pub(crate) fn decode_cover_ref(data: &[u8]) -> Result<Option<String>, EngineError> {
    let track = getTrackCall::abi_decode_returns(data)?;
    if track.registeredAt == 0 {
        return Ok(None);
    }
    let cover_ref = track.coverRef.trim();
    Ok((!cover_ref.is_empty()).then(|| cover_ref.to_string()))
}

/// Decodes a `getTrackLyrics` answer; empty means "no lyrics yet".
pub(crate) fn decode_lyrics_ref(data: &[u8]) -> Result<Option<String>, EngineError> {
    let lyrics_ref = getTrackLyricsCall::abi_decode_returns(data)?;
    let lyrics_ref = lyrics_ref.trim();
    Ok((!lyrics_ref.is_empty()).then(|| lyrics_ref.to_string()))
}
