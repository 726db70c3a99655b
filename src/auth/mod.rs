//! Authentication/handshake protocol family.
//!
//! Messages open with a single command byte; what follows depends on the
//! command, the direction, the protocol version negotiated earlier on the
//! connection and flag bytes read earlier in the same message. Two message
//! types carry a declared length and may span transport segments; the size
//! field does not even sit at a fixed offset, so [`length_probe`] picks the
//! offset from the command byte before reading it.
//!
//! Version gates are part of the wire contract and exact: the two-factor
//! flag appears at version 3, account flags at version 5, and the realm
//! list switches count/type field widths at version 8.

mod handshake;
mod realms;
mod transfer;

use bytes::Bytes;
use phf::phf_map;

use crate::conversation::{ConversationState, Direction};
use crate::reassembly::ProbeOutcome;
use crate::record::{DecodedRecord, FieldSink, FieldValue, Severity};
use crate::wire::Reader;

/// Protocol label on records produced by this family.
pub const PROTOCOL: &str = "auth";

/// Conventional server port for this family.
pub const DEFAULT_PORT: u16 = 3724;

/// Result code for a successful operation; anything else truncates the
/// message right after the result field.
pub const RESULT_SUCCESS: u8 = 0x00;

/// Command byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Client opens the logon handshake; server answers with SRP data.
    LogonChallenge = 0x00,
    /// Both sides exchange proofs of the session key.
    LogonProof = 0x01,
    /// Fast re-login challenge.
    ReconnectChallenge = 0x02,
    /// Fast re-login proof.
    ReconnectProof = 0x03,
    /// Client uploads a hardware survey.
    SurveyResult = 0x04,
    /// Server lists available realms.
    RealmList = 0x10,
    /// Server starts a patch transfer.
    TransferInitiate = 0x30,
    /// One chunk of patch data.
    TransferData = 0x31,
    /// Client accepts the transfer.
    TransferAccept = 0x32,
    /// Client resumes a partial transfer.
    TransferResume = 0x33,
    /// Client cancels the transfer.
    TransferCancel = 0x34,
}

impl Command {
    /// Map a wire byte to a command, if known.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Command::LogonChallenge),
            0x01 => Some(Command::LogonProof),
            0x02 => Some(Command::ReconnectChallenge),
            0x03 => Some(Command::ReconnectProof),
            0x04 => Some(Command::SurveyResult),
            0x10 => Some(Command::RealmList),
            0x30 => Some(Command::TransferInitiate),
            0x31 => Some(Command::TransferData),
            0x32 => Some(Command::TransferAccept),
            0x33 => Some(Command::TransferResume),
            0x34 => Some(Command::TransferCancel),
            _ => None,
        }
    }
}

static COMMAND_NAMES: phf::Map<u8, &'static str> = phf_map! {
    0x00u8 => "LOGON_CHALLENGE",
    0x01u8 => "LOGON_PROOF",
    0x02u8 => "RECONNECT_CHALLENGE",
    0x03u8 => "RECONNECT_PROOF",
    0x04u8 => "SURVEY_RESULT",
    0x10u8 => "REALM_LIST",
    0x30u8 => "TRANSFER_INITIATE",
    0x31u8 => "TRANSFER_DATA",
    0x32u8 => "TRANSFER_ACCEPT",
    0x33u8 => "TRANSFER_RESUME",
    0x34u8 => "TRANSFER_CANCEL",
};

static RESULT_NAMES: phf::Map<u8, &'static str> = phf_map! {
    0x00u8 => "SUCCESS",
    0x01u8 => "FAIL_UNKNOWN0",
    0x02u8 => "FAIL_UNKNOWN1",
    0x03u8 => "FAIL_BANNED",
    0x04u8 => "FAIL_UNKNOWN_ACCOUNT",
    0x05u8 => "FAIL_INCORRECT_PASSWORD",
    0x06u8 => "FAIL_ALREADY_ONLINE",
    0x07u8 => "FAIL_NO_TIME",
    0x08u8 => "FAIL_DB_BUSY",
    0x09u8 => "FAIL_VERSION_INVALID",
    0x0Au8 => "DOWNLOAD_FILE",
    0x0Bu8 => "FAIL_INVALID_SERVER",
    0x0Cu8 => "FAIL_SUSPENDED",
    0x0Du8 => "FAIL_NO_ACCESS",
    0x0Eu8 => "SUCCESS_SURVEY",
    0x0Fu8 => "FAIL_PARENTAL_CONTROL",
    0x10u8 => "FAIL_LOCKED_ENFORCED",
};

static VERSION_NAMES: phf::Map<u8, &'static str> = phf_map! {
    0x02u8 => "Two",
    0x03u8 => "Three",
    0x05u8 => "Five",
    0x06u8 => "Six",
    0x07u8 => "Seven",
    0x08u8 => "Eight",
};

static REALM_TYPE_NAMES: phf::Map<u32, &'static str> = phf_map! {
    0x0u32 => "Player Vs Environment",
    0x1u32 => "Player Vs Player",
    0x6u32 => "Roleplaying",
    0x8u32 => "Roleplaying Player Vs Player",
};

static REALM_CATEGORY_NAMES: phf::Map<u8, &'static str> = phf_map! {
    0x0u8 => "Default",
    0x1u8 => "One",
    0x2u8 => "Two",
    0x3u8 => "Three",
    0x5u8 => "Five",
};

static PLATFORM_NAMES: phf::Map<u32, &'static str> = phf_map! {
    0x0078_3836u32 => "x86",
    0x0050_5043u32 => "PowerPC",
};

static OS_NAMES: phf::Map<u32, &'static str> = phf_map! {
    0x0057_696Eu32 => "Windows",
    0x004F_5358u32 => "Mac OS X",
};

static LOCALE_NAMES: phf::Map<u32, &'static str> = phf_map! {
    0x656E_4742u32 => "enGB",
    0x656E_5553u32 => "enUS",
    0x6573_4D58u32 => "esMX",
    0x7074_4252u32 => "ptBR",
    0x6672_4652u32 => "frFR",
    0x6465_4445u32 => "deDE",
    0x6573_4553u32 => "esES",
    0x7074_5054u32 => "ptPT",
    0x6974_4954u32 => "itIT",
    0x7275_5255u32 => "ruRU",
    0x6B6F_4B52u32 => "koKR",
    0x7A68_5457u32 => "zhTW",
    0x656E_5457u32 => "enTW",
    0x656E_434Eu32 => "enCN",
};

/// Display name of a command byte.
pub fn command_name(cmd: u8) -> Option<&'static str> {
    COMMAND_NAMES.get(&cmd).copied()
}

/// Display name of a result code.
pub fn result_name(code: u8) -> Option<&'static str> {
    RESULT_NAMES.get(&code).copied()
}

/// Display name of a protocol version byte.
pub fn version_name(version: u8) -> Option<&'static str> {
    VERSION_NAMES.get(&version).copied()
}

/// Display name of a realm type value.
pub fn realm_type_name(value: u32) -> Option<&'static str> {
    REALM_TYPE_NAMES.get(&value).copied()
}

/// Display name of a realm category value.
pub fn realm_category_name(value: u8) -> Option<&'static str> {
    REALM_CATEGORY_NAMES.get(&value).copied()
}

/// Display name of a platform tag.
pub fn platform_name(value: u32) -> Option<&'static str> {
    PLATFORM_NAMES.get(&value).copied()
}

/// Display name of an OS tag.
pub fn os_name(value: u32) -> Option<&'static str> {
    OS_NAMES.get(&value).copied()
}

/// Display name of a locale tag.
pub fn locale_name(value: u32) -> Option<&'static str> {
    LOCALE_NAMES.get(&value).copied()
}

/// Realm flag bits.
pub mod realm_flag {
    /// Realm entry is invalid.
    pub const INVALID: u8 = 0x01;
    /// Realm is offline.
    pub const OFFLINE: u8 = 0x02;
    /// Entry carries an explicit client build; gates the trailing
    /// version block on version 8 realm lists.
    pub const SPECIFY_BUILD: u8 = 0x04;
    /// Render recommended (blue).
    pub const FORCE_BLUE_RECOMMENDED: u8 = 0x20;
    /// Render recommended (green).
    pub const FORCE_GREEN_RECOMMENDED: u8 = 0x40;
    /// Render full (red).
    pub const FORCE_RED_FULL: u8 = 0x80;
}

/// Two-factor security flag bits.
pub mod security_flag {
    /// PIN entry required.
    pub const PIN: u8 = 0x01;
    /// Matrix card required.
    pub const MATRIX_CARD: u8 = 0x02;
    /// Authenticator token required.
    pub const AUTHENTICATOR: u8 = 0x04;
}

/// Account flag bits.
pub mod account_flag {
    /// Game-master account.
    pub const GM: u32 = 0x0000_0001;
    /// Trial account.
    pub const TRIAL: u32 = 0x0000_0008;
    /// Pro-pass entitlement.
    pub const PRO_PASS: u32 = 0x0080_0000;
}

/// Field identifiers reported by this family.
pub mod fields {
    use crate::record::FieldId;

    /// Command byte.
    pub const COMMAND: FieldId = "auth.command";
    /// Protocol version byte.
    pub const PROTOCOL_VERSION: FieldId = "auth.protocol_version";
    /// Declared message size.
    pub const SIZE: FieldId = "auth.size";
    /// Result code.
    pub const RESULT: FieldId = "auth.result";
    /// Game name tag.
    pub const GAME_NAME: FieldId = "auth.game_name";
    /// Client version, major.
    pub const VERSION_MAJOR: FieldId = "auth.version.major";
    /// Client version, minor.
    pub const VERSION_MINOR: FieldId = "auth.version.minor";
    /// Client version, patch.
    pub const VERSION_PATCH: FieldId = "auth.version.patch";
    /// Client build number.
    pub const BUILD: FieldId = "auth.build";
    /// Platform tag.
    pub const PLATFORM: FieldId = "auth.platform";
    /// Operating system tag.
    pub const OS: FieldId = "auth.os";
    /// Locale tag.
    pub const LOCALE: FieldId = "auth.locale";
    /// UTC timezone offset.
    pub const TIMEZONE_OFFSET: FieldId = "auth.timezone_offset";
    /// Client IP address.
    pub const CLIENT_IP: FieldId = "auth.client_ip";
    /// Length of the following string.
    pub const STRING_LENGTH: FieldId = "auth.string_length";
    /// Account name.
    pub const ACCOUNT_NAME: FieldId = "auth.account_name";
    /// Server SRP public key.
    pub const SERVER_PUBLIC_KEY: FieldId = "auth.server_public_key";
    /// SRP generator length.
    pub const GENERATOR_LENGTH: FieldId = "auth.generator_length";
    /// SRP generator.
    pub const GENERATOR: FieldId = "auth.generator";
    /// SRP large safe prime length.
    pub const PRIME_LENGTH: FieldId = "auth.large_safe_prime_length";
    /// SRP large safe prime.
    pub const PRIME: FieldId = "auth.large_safe_prime";
    /// SRP salt.
    pub const SALT: FieldId = "auth.salt";
    /// CRC salt.
    pub const CRC_SALT: FieldId = "auth.crc_salt";
    /// Two-factor security flag.
    pub const SECURITY_FLAG: FieldId = "auth.security_flag";
    /// PIN grid seed.
    pub const PIN_GRID_SEED: FieldId = "auth.pin_grid_seed";
    /// PIN salt.
    pub const PIN_SALT: FieldId = "auth.pin_salt";
    /// PIN hash.
    pub const PIN_HASH: FieldId = "auth.pin_hash";
    /// Client SRP public key.
    pub const CLIENT_PUBLIC_KEY: FieldId = "auth.client_public_key";
    /// Client proof.
    pub const CLIENT_PROOF: FieldId = "auth.client_proof";
    /// CRC hash.
    pub const CRC_HASH: FieldId = "auth.crc_hash";
    /// Number of telemetry keys.
    pub const TELEMETRY_KEYS: FieldId = "auth.telemetry_keys";
    /// Server proof.
    pub const SERVER_PROOF: FieldId = "auth.server_proof";
    /// Account flags.
    pub const ACCOUNT_FLAG: FieldId = "auth.account_flag";
    /// Hardware survey id.
    pub const HARDWARE_SURVEY_ID: FieldId = "auth.hardware_survey_id";
    /// Trailing value of unknown meaning on version 5+.
    pub const UNKNOWN_INT: FieldId = "auth.unknown_int";
    /// Reconnect challenge data.
    pub const CHALLENGE_DATA: FieldId = "auth.challenge_data";
    /// Reconnect checksum salt.
    pub const CHECKSUM_SALT: FieldId = "auth.checksum_salt";
    /// Reconnect client checksum.
    pub const CLIENT_CHECKSUM: FieldId = "auth.client_checksum";
    /// Number of realms in the list.
    pub const REALM_COUNT: FieldId = "auth.realm.count";
    /// Realm type.
    pub const REALM_TYPE: FieldId = "auth.realm.type";
    /// Realm locked flag.
    pub const REALM_LOCKED: FieldId = "auth.realm.locked";
    /// Realm flags.
    pub const REALM_FLAGS: FieldId = "auth.realm.flags";
    /// Realm name.
    pub const REALM_NAME: FieldId = "auth.realm.name";
    /// Realm address.
    pub const REALM_ADDRESS: FieldId = "auth.realm.address";
    /// Realm population figure.
    pub const REALM_POPULATION: FieldId = "auth.realm.population";
    /// Characters on the realm.
    pub const REALM_CHARACTERS: FieldId = "auth.realm.characters";
    /// Realm category.
    pub const REALM_CATEGORY: FieldId = "auth.realm.category";
    /// Realm id.
    pub const REALM_ID: FieldId = "auth.realm.id";
    /// Survey id.
    pub const SURVEY_ID: FieldId = "auth.survey_id";
    /// Compressed survey data length.
    pub const COMPRESSED_DATA_LENGTH: FieldId = "auth.compressed_data_length";
    /// Opaque data run.
    pub const DATA: FieldId = "auth.data";
    /// Transfer file name.
    pub const FILE_NAME: FieldId = "auth.file_name";
    /// Transfer file size.
    pub const FILE_SIZE: FieldId = "auth.file_size";
    /// Transfer file digest.
    pub const FILE_MD5: FieldId = "auth.file_md5";
    /// Transfer resume offset.
    pub const TRANSFER_OFFSET: FieldId = "auth.transfer_offset";
    /// Bytes with no known interpretation.
    pub const UNKNOWN_BYTES: FieldId = "auth.unknown_bytes";
}

/// Locate and read this family's length field.
///
/// Only two messages are framed, and their size field sits at a different
/// offset each: the server realm list keeps it right after the command
/// byte, the client logon challenge puts a version byte in between. Every
/// other message has no length field, cannot span segments, and passes
/// through as soon as its command byte is present.
pub fn length_probe(direction: Direction, header: &[u8]) -> ProbeOutcome {
    let Some(&cmd) = header.first() else {
        return ProbeOutcome::NeedMore;
    };

    let size_field_offset = match (direction, Command::from_u8(cmd)) {
        (Direction::ServerToClient, Some(Command::RealmList)) => 1,
        (Direction::ClientToServer, Some(Command::LogonChallenge)) => 2,
        _ => return ProbeOutcome::Passthrough { min: 1 },
    };

    if header.len() < size_field_offset + 2 {
        return ProbeOutcome::NeedMore;
    }
    let declared = usize::from(u16::from_le_bytes([
        header[size_field_offset],
        header[size_field_offset + 1],
    ]));
    ProbeOutcome::Framed(declared + size_field_offset + 2)
}

/// Decode one complete message of this family.
///
/// Reads the command byte, then hands off by command and direction. The
/// negotiated version in `conv` gates the version-dependent fields and is
/// updated when a client challenge announces a version. Malformed input
/// produces a partial record plus an error diagnostic.
pub fn decode_message(
    message: &Bytes,
    direction: Direction,
    conv: &mut ConversationState,
) -> DecodedRecord {
    let mut record = DecodedRecord::new(PROTOCOL);
    let mut r = Reader::new(message);

    let cmd = match r.named_u8_field(&mut record, fields::COMMAND, command_name) {
        Ok(cmd) => cmd,
        Err(err) => {
            record.note_error(&err);
            return record;
        }
    };
    record.set_summary(command_name(cmd).unwrap_or("Unrecognized packet type"));

    let outcome = match (Command::from_u8(cmd), direction) {
        (Some(Command::LogonChallenge), Direction::ClientToServer)
        | (Some(Command::ReconnectChallenge), Direction::ClientToServer) => {
            handshake::challenge_client(&mut r, &mut record, conv)
        }
        (Some(Command::LogonChallenge), Direction::ServerToClient) => {
            handshake::challenge_server(&mut r, &mut record, conv.negotiated_version())
        }
        (Some(Command::LogonProof), Direction::ClientToServer) => {
            handshake::proof_client(&mut r, &mut record, conv.negotiated_version())
        }
        (Some(Command::LogonProof), Direction::ServerToClient) => {
            handshake::proof_server(&mut r, &mut record, conv.negotiated_version())
        }
        (Some(Command::ReconnectChallenge), Direction::ServerToClient) => {
            handshake::reconnect_challenge_server(&mut r, &mut record)
        }
        (Some(Command::ReconnectProof), _) => {
            handshake::reconnect_proof(&mut r, &mut record, direction)
        }
        (Some(Command::RealmList), Direction::ServerToClient) => {
            realms::realm_list_server(&mut r, &mut record, conv.negotiated_version())
        }
        // The realm list request carries no decoded body.
        (Some(Command::RealmList), Direction::ClientToServer) => Ok(()),
        (Some(Command::SurveyResult), Direction::ClientToServer) => {
            transfer::survey_result_client(&mut r, &mut record)
        }
        (Some(Command::TransferInitiate), Direction::ServerToClient) => {
            transfer::initiate_server(&mut r, &mut record)
        }
        (Some(Command::TransferData), Direction::ServerToClient) => {
            transfer::data_server(&mut r, &mut record)
        }
        (Some(Command::TransferResume), Direction::ClientToServer) => {
            transfer::resume_client(&mut r, &mut record)
        }
        (Some(Command::TransferAccept | Command::TransferCancel), Direction::ClientToServer) => {
            Ok(())
        }
        _ => {
            record.diagnostic(
                Severity::Warning,
                format!("command {cmd:#04x} has no decoder for this direction"),
            );
            let rest = r.rest();
            if !rest.is_empty() {
                let start = r.pos();
                record.field(
                    fields::UNKNOWN_BYTES,
                    start..start + rest.len(),
                    FieldValue::Bytes(rest.to_vec()),
                );
            }
            Ok(())
        }
    };

    if let Err(err) = outcome {
        tracing::debug!(command = cmd, error = %err, "partial decode");
        record.note_error(&err);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_round_trip() {
        for cmd in [0x00u8, 0x01, 0x02, 0x03, 0x04, 0x10, 0x30, 0x31, 0x32, 0x33, 0x34] {
            let parsed = Command::from_u8(cmd).unwrap();
            assert_eq!(parsed as u8, cmd);
            assert!(command_name(cmd).is_some());
        }
        assert!(Command::from_u8(0x42).is_none());
        assert!(command_name(0x42).is_none());
    }

    #[test]
    fn test_probe_realm_list_offset() {
        // Server realm list: size u16 at offset 1, total = size + 3.
        let header = [0x10, 0x08, 0x00];
        assert_eq!(
            length_probe(Direction::ServerToClient, &header),
            ProbeOutcome::Framed(8 + 3)
        );
        // Same bytes from the client are unframed.
        assert_eq!(
            length_probe(Direction::ClientToServer, &header),
            ProbeOutcome::Passthrough { min: 1 }
        );
    }

    #[test]
    fn test_probe_logon_challenge_offset() {
        // Client logon challenge: size u16 at offset 2, total = size + 4.
        let header = [0x00, 0x08, 0x2A, 0x00];
        assert_eq!(
            length_probe(Direction::ClientToServer, &header),
            ProbeOutcome::Framed(0x2A + 4)
        );
        assert_eq!(
            length_probe(Direction::ClientToServer, &header[..3]),
            ProbeOutcome::NeedMore
        );
    }

    #[test]
    fn test_probe_sizeless_command() {
        assert_eq!(
            length_probe(Direction::ClientToServer, &[0x01, 0xFF]),
            ProbeOutcome::Passthrough { min: 1 }
        );
        assert_eq!(length_probe(Direction::ClientToServer, &[]), ProbeOutcome::NeedMore);
    }

    #[test]
    fn test_unknown_command_is_reported_not_fatal() {
        let mut conv = ConversationState::new();
        let record = decode_message(
            &Bytes::from_static(&[0x42, 0xDE, 0xAD]),
            Direction::ClientToServer,
            &mut conv,
        );

        assert_eq!(record.summary.as_deref(), Some("Unrecognized packet type"));
        assert!(record.get(fields::UNKNOWN_BYTES).is_some());
    }
}
