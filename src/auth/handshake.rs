//! Logon and reconnect handshake messages.
//!
//! The server challenge and both proofs are version-gated: the two-factor
//! block exists only from protocol version 3, the account flag and the
//! trailing value only from version 5. A non-success result code ends the
//! message immediately; nothing after it may be read.

use super::{fields, result_name, version_name, RESULT_SUCCESS};
use super::{locale_name, os_name, platform_name};
use crate::conversation::{ConversationState, Direction};
use crate::error::Result;
use crate::record::DecodedRecord;
use crate::wire::Reader;

/// Client logon (or reconnect) challenge. Announces the protocol version
/// the rest of the connection is decoded under.
pub(super) fn challenge_client(
    r: &mut Reader<'_>,
    rec: &mut DecodedRecord,
    conv: &mut ConversationState,
) -> Result<()> {
    let version = r.named_u8_field(rec, fields::PROTOCOL_VERSION, version_name)?;
    conv.set_negotiated_version(version);

    r.u16_le_field(rec, fields::SIZE)?;
    r.u32_le_field(rec, fields::GAME_NAME)?;
    r.u8_field(rec, fields::VERSION_MAJOR)?;
    r.u8_field(rec, fields::VERSION_MINOR)?;
    r.u8_field(rec, fields::VERSION_PATCH)?;
    r.u16_le_field(rec, fields::BUILD)?;
    r.named_u32_field(rec, fields::PLATFORM, platform_name)?;
    r.named_u32_field(rec, fields::OS, os_name)?;
    r.named_u32_field(rec, fields::LOCALE, locale_name)?;
    r.u32_le_field(rec, fields::TIMEZONE_OFFSET)?;
    // On-wire address is big-endian, unlike everything around it.
    r.u32_be_field(rec, fields::CLIENT_IP)?;
    r.prefixed_str_field(rec, fields::STRING_LENGTH, fields::ACCOUNT_NAME)?;
    Ok(())
}

/// Server logon challenge carrying the SRP parameters.
pub(super) fn challenge_server(
    r: &mut Reader<'_>,
    rec: &mut DecodedRecord,
    version: u8,
) -> Result<()> {
    r.named_u8_field(rec, fields::PROTOCOL_VERSION, version_name)?;

    let result = r.named_u8_field(rec, fields::RESULT, result_name)?;
    if result != RESULT_SUCCESS {
        // Remaining fields exist only on success.
        return Ok(());
    }

    r.bytes_field(rec, fields::SERVER_PUBLIC_KEY, 32)?;
    let generator_len = r.u8_field(rec, fields::GENERATOR_LENGTH)?;
    r.bytes_field(rec, fields::GENERATOR, usize::from(generator_len))?;
    let prime_len = r.u8_field(rec, fields::PRIME_LENGTH)?;
    r.bytes_field(rec, fields::PRIME, usize::from(prime_len))?;
    r.bytes_field(rec, fields::SALT, 32)?;
    r.bytes_field(rec, fields::CRC_SALT, 16)?;

    if version < 3 {
        // The two-factor fields arrived with version 3.
        return Ok(());
    }
    let two_factor = r.u8_field(rec, fields::SECURITY_FLAG)?;
    if two_factor == 0 {
        return Ok(());
    }
    r.u32_le_field(rec, fields::PIN_GRID_SEED)?;
    r.bytes_field(rec, fields::PIN_SALT, 16)?;
    Ok(())
}

/// Client logon proof.
pub(super) fn proof_client(r: &mut Reader<'_>, rec: &mut DecodedRecord, version: u8) -> Result<()> {
    r.bytes_field(rec, fields::CLIENT_PUBLIC_KEY, 32)?;
    r.bytes_field(rec, fields::CLIENT_PROOF, 20)?;
    r.bytes_field(rec, fields::CRC_HASH, 20)?;
    r.u8_field(rec, fields::TELEMETRY_KEYS)?;

    if version < 3 {
        return Ok(());
    }
    let two_factor = r.u8_field(rec, fields::SECURITY_FLAG)?;
    if two_factor == 0 {
        return Ok(());
    }
    r.bytes_field(rec, fields::PIN_SALT, 16)?;
    r.bytes_field(rec, fields::PIN_HASH, 20)?;
    Ok(())
}

/// Server logon proof.
pub(super) fn proof_server(r: &mut Reader<'_>, rec: &mut DecodedRecord, version: u8) -> Result<()> {
    let result = r.named_u8_field(rec, fields::RESULT, result_name)?;
    if result != RESULT_SUCCESS {
        return Ok(());
    }

    r.bytes_field(rec, fields::SERVER_PROOF, 20)?;
    if version >= 5 {
        r.u32_le_field(rec, fields::ACCOUNT_FLAG)?;
    }
    r.u32_le_field(rec, fields::HARDWARE_SURVEY_ID)?;
    if version >= 5 {
        r.u16_le_field(rec, fields::UNKNOWN_INT)?;
    }
    Ok(())
}

/// Server reconnect challenge.
pub(super) fn reconnect_challenge_server(
    r: &mut Reader<'_>,
    rec: &mut DecodedRecord,
) -> Result<()> {
    let result = r.named_u8_field(rec, fields::RESULT, result_name)?;
    if result != RESULT_SUCCESS {
        return Ok(());
    }
    r.bytes_field(rec, fields::CHALLENGE_DATA, 16)?;
    r.bytes_field(rec, fields::CHECKSUM_SALT, 16)?;
    Ok(())
}

/// Reconnect proof, both directions.
pub(super) fn reconnect_proof(
    r: &mut Reader<'_>,
    rec: &mut DecodedRecord,
    direction: Direction,
) -> Result<()> {
    match direction {
        Direction::ClientToServer => {
            r.bytes_field(rec, fields::CHALLENGE_DATA, 16)?;
            r.bytes_field(rec, fields::CLIENT_PROOF, 20)?;
            r.bytes_field(rec, fields::CLIENT_CHECKSUM, 20)?;
            r.u8_field(rec, fields::TELEMETRY_KEYS)?;
        }
        Direction::ServerToClient => {
            r.named_u8_field(rec, fields::RESULT, result_name)?;
        }
    }
    Ok(())
}
