//! Server realm list.
//!
//! The list layout changed at protocol version 8: the realm count widened
//! from one byte to two while the realm type narrowed from four bytes to
//! one, a locked byte appeared, and entries whose flags carry the
//! specify-build bit grew a trailing client-version block.

use super::{fields, realm_category_name, realm_flag, realm_type_name};
use crate::error::Result;
use crate::record::{DecodedRecord, FieldSink, FieldValue};
use crate::wire::Reader;

pub(super) fn realm_list_server(
    r: &mut Reader<'_>,
    rec: &mut DecodedRecord,
    version: u8,
) -> Result<()> {
    r.u16_le_field(rec, fields::SIZE)?;
    // Unknown field; always 0.
    r.skip(4)?;

    let count = if version >= 8 {
        r.u16_le_field(rec, fields::REALM_COUNT)?
    } else {
        u16::from(r.u8_field(rec, fields::REALM_COUNT)?)
    };

    for _ in 0..count {
        realm_entry(r, rec, version)?;
    }
    Ok(())
}

fn realm_entry(r: &mut Reader<'_>, rec: &mut DecodedRecord, version: u8) -> Result<()> {
    if version >= 8 {
        let start = r.pos();
        let ty = r.u8()?;
        rec.field(
            fields::REALM_TYPE,
            start..r.pos(),
            FieldValue::named(u32::from(ty), realm_type_name(u32::from(ty))),
        );
        r.u8_field(rec, fields::REALM_LOCKED)?;
    } else {
        r.named_u32_field(rec, fields::REALM_TYPE, realm_type_name)?;
    }

    let flags = r.u8_field(rec, fields::REALM_FLAGS)?;
    r.cstring_field(rec, fields::REALM_NAME)?;
    r.cstring_field(rec, fields::REALM_ADDRESS)?;
    r.f32_le_field(rec, fields::REALM_POPULATION)?;
    r.u8_field(rec, fields::REALM_CHARACTERS)?;
    r.named_u8_field(rec, fields::REALM_CATEGORY, realm_category_name)?;
    r.u8_field(rec, fields::REALM_ID)?;

    if version >= 8 && flags & realm_flag::SPECIFY_BUILD != 0 {
        r.u8_field(rec, fields::VERSION_MAJOR)?;
        r.u8_field(rec, fields::VERSION_MINOR)?;
        r.u8_field(rec, fields::VERSION_PATCH)?;
        r.u16_le_field(rec, fields::BUILD)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realm_entry_old(ty: u32, name: &str, addr: &str) -> Vec<u8> {
        let mut e = Vec::new();
        e.extend_from_slice(&ty.to_le_bytes()); // 4-byte realm type
        e.push(0x00); // flags
        e.extend_from_slice(name.as_bytes());
        e.push(0);
        e.extend_from_slice(addr.as_bytes());
        e.push(0);
        e.extend_from_slice(&1.5f32.to_le_bytes()); // population
        e.push(3); // characters
        e.push(1); // category
        e.push(9); // realm id
        e
    }

    fn realm_entry_v8(ty: u8, flags: u8, name: &str, addr: &str, build: Option<[u8; 5]>) -> Vec<u8> {
        let mut e = vec![ty, 0x00 /* locked */, flags];
        e.extend_from_slice(name.as_bytes());
        e.push(0);
        e.extend_from_slice(addr.as_bytes());
        e.push(0);
        e.extend_from_slice(&0.5f32.to_le_bytes());
        e.push(1);
        e.push(0);
        e.push(2);
        if let Some(build) = build {
            e.extend_from_slice(&build);
        }
        e
    }

    fn list_body(count_field: &[u8], entries: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0u16.to_le_bytes()); // size (unchecked)
        body.extend_from_slice(&[0; 4]); // padding
        body.extend_from_slice(count_field);
        body.extend_from_slice(entries);
        body
    }

    fn decode(body: &[u8], version: u8) -> DecodedRecord {
        let mut rec = DecodedRecord::new("auth");
        let mut r = Reader::new(body);
        realm_list_server(&mut r, &mut rec, version).unwrap();
        rec
    }

    #[test]
    fn test_pre_version8_layout() {
        let entries = realm_entry_old(0x1, "Sargeras", "192.0.2.9:8085");
        let body = list_body(&[1], &entries);
        let rec = decode(&body, 7);

        // One-byte count, four-byte type, no locked field.
        assert_eq!(rec.get(fields::REALM_COUNT), Some(&FieldValue::U8(1)));
        assert_eq!(
            rec.get(fields::REALM_TYPE),
            Some(&FieldValue::Named { raw: 1, name: "Player Vs Player" })
        );
        assert!(rec.get(fields::REALM_LOCKED).is_none());
        assert_eq!(
            rec.get(fields::REALM_NAME),
            Some(&FieldValue::Str("Sargeras".into()))
        );
    }

    #[test]
    fn test_version8_layout() {
        let entries = realm_entry_v8(0x6, 0x00, "Ysera", "192.0.2.10:8085", None);
        let body = list_body(&1u16.to_le_bytes(), &entries);
        let rec = decode(&body, 8);

        assert_eq!(rec.get(fields::REALM_COUNT), Some(&FieldValue::U16(1)));
        assert_eq!(
            rec.get(fields::REALM_TYPE),
            Some(&FieldValue::Named { raw: 6, name: "Roleplaying" })
        );
        assert_eq!(rec.get(fields::REALM_LOCKED), Some(&FieldValue::U8(0)));
        assert!(rec.get(fields::BUILD).is_none());
    }

    #[test]
    fn test_version8_specify_build_block() {
        let build = [3, 3, 5, 0xA0, 0x2E]; // 3.3.5 build 12000 (0x2EA0)
        let entries = realm_entry_v8(0x0, realm_flag::SPECIFY_BUILD, "Arthas", "addr", Some(build));
        let body = list_body(&1u16.to_le_bytes(), &entries);
        let rec = decode(&body, 8);

        assert_eq!(rec.get(fields::VERSION_MAJOR), Some(&FieldValue::U8(3)));
        assert_eq!(rec.get(fields::BUILD), Some(&FieldValue::U16(12000)));
    }

    #[test]
    fn test_multiple_realms() {
        let mut entries = realm_entry_old(0x0, "One", "a:1");
        entries.extend_from_slice(&realm_entry_old(0x8, "Two", "b:2"));
        let body = list_body(&[2], &entries);
        let rec = decode(&body, 2);

        let names: Vec<_> = rec.get_all(fields::REALM_NAME).collect();
        assert_eq!(
            names,
            vec![
                &FieldValue::Str("One".into()),
                &FieldValue::Str("Two".into())
            ]
        );
    }

    #[test]
    fn test_truncated_entry_is_an_error() {
        let entries = &realm_entry_old(0x1, "Short", "x:1")[..10];
        let body = list_body(&[1], entries);

        let mut rec = DecodedRecord::new("auth");
        let mut r = Reader::new(&body);
        assert!(realm_list_server(&mut r, &mut rec, 2).is_err());
        // Fields decoded before the truncation are kept.
        assert!(rec.get(fields::REALM_TYPE).is_some());
    }
}
