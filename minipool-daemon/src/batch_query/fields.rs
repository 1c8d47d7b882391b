//! Decoding of per-minipool contract fields into [`ValidatorRecord`]s

use minipool_rpc::{MinipoolField, ReadValue, RpcError};
use minipool_types::{MinipoolStatus, ValidatorRecord};
use std::time::{Duration, UNIX_EPOCH};

use super::QueryError;

/// Store one decoded field on the record
pub fn apply_field(record: &mut ValidatorRecord, field: MinipoolField, value: &ReadValue) -> Result<(), QueryError> {
    let minipool = record.minipool_address;
    let decode_error = |e: RpcError| QueryError::Decode {
        minipool,
        field,
        reason: e.to_string(),
    };

    match field {
        MinipoolField::Exists => {
            record.exists = value.as_bool().map_err(decode_error)?;
        }
        MinipoolField::Status => {
            let raw = value.as_u8().map_err(decode_error)?;
            record.status = MinipoolStatus::try_from(raw).map_err(|e| decode_error(e.into()))?;
        }
        MinipoolField::StatusTime => {
            let secs = value.as_u64().map_err(decode_error)?;
            record.status_time = UNIX_EPOCH + Duration::from_secs(secs);
        }
        MinipoolField::Pubkey => {
            record.pubkey = value.as_pubkey().map_err(decode_error)?;
        }
        MinipoolField::WithdrawalCredentials => {
            record.withdrawal_credentials = value.as_b256().map_err(decode_error)?;
        }
    }
    Ok(())
}
