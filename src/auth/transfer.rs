//! Survey upload and patch transfer messages.

use super::{fields, result_name};
use crate::error::Result;
use crate::record::DecodedRecord;
use crate::wire::Reader;

/// Client hardware survey upload.
pub(super) fn survey_result_client(r: &mut Reader<'_>, rec: &mut DecodedRecord) -> Result<()> {
    r.u32_le_field(rec, fields::SURVEY_ID)?;
    r.named_u8_field(rec, fields::RESULT, result_name)?;
    let len = r.u16_le_field(rec, fields::COMPRESSED_DATA_LENGTH)?;
    r.bytes_field(rec, fields::DATA, usize::from(len))?;
    Ok(())
}

/// Server announces a patch file.
pub(super) fn initiate_server(r: &mut Reader<'_>, rec: &mut DecodedRecord) -> Result<()> {
    r.prefixed_str_field(rec, fields::STRING_LENGTH, fields::FILE_NAME)?;
    r.u64_le_field(rec, fields::FILE_SIZE)?;
    r.bytes_field(rec, fields::FILE_MD5, 16)?;
    Ok(())
}

/// One chunk of patch data.
pub(super) fn data_server(r: &mut Reader<'_>, rec: &mut DecodedRecord) -> Result<()> {
    let len = r.u16_le_field(rec, fields::COMPRESSED_DATA_LENGTH)?;
    r.bytes_field(rec, fields::DATA, usize::from(len))?;
    Ok(())
}

/// Client resumes a partial transfer at an offset.
pub(super) fn resume_client(r: &mut Reader<'_>, rec: &mut DecodedRecord) -> Result<()> {
    r.u64_le_field(rec, fields::TRANSFER_OFFSET)?;
    Ok(())
}
