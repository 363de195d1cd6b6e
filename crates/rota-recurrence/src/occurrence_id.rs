//! External occurrence identifiers.
//!
//! Format: either a bare master id (the whole series / its anchor) or
//! `<masterId>_<YYYY-MM-DD>` for one scheduled date. Any consumer can decode
//! it without a store lookup.

use chrono::NaiveDate;
use rota_core::{MasterId, OCCURRENCE_ID_SEPARATOR};
use serde::{Deserialize, Serialize};

use crate::calendar::{format_date, DATE_FORMAT};
use crate::error::{RecurrenceError, Result};

/// Decoded occurrence identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceRef {
    pub master_id: MasterId,
    /// `None` for a plain master reference.
    pub occurrence_date: Option<NaiveDate>,
}

impl OccurrenceRef {
    pub fn encode(&self) -> String {
        match self.occurrence_date {
            Some(date) => encode_occurrence_id(&self.master_id, date),
            None => self.master_id.to_string(),
        }
    }
}

impl std::fmt::Display for OccurrenceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl std::str::FromStr for OccurrenceRef {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self> {
        decode_occurrence_id(s)
    }
}

pub fn encode_occurrence_id(master_id: &MasterId, date: NaiveDate) -> String {
    format!("{master_id}{OCCURRENCE_ID_SEPARATOR}{}", format_date(date))
}

pub fn decode_occurrence_id(id: &str) -> Result<OccurrenceRef> {
    if id.is_empty() {
        return Err(RecurrenceError::malformed(id, "empty id"));
    }

    let parts: Vec<&str> = id.split(OCCURRENCE_ID_SEPARATOR).collect();
    match parts.as_slice() {
        [master] => Ok(OccurrenceRef {
            master_id: parse_master(id, master)?,
            occurrence_date: None,
        }),
        [master, date] => {
            let master_id = parse_master(id, master)?;
            if !has_date_shape(date) {
                return Err(RecurrenceError::malformed(id, "date must be YYYY-MM-DD"));
            }
            let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
                .map_err(|_| RecurrenceError::malformed(id, "not a calendar date"))?;
            Ok(OccurrenceRef {
                master_id,
                occurrence_date: Some(date),
            })
        }
        _ => Err(RecurrenceError::malformed(id, "too many separators")),
    }
}

fn parse_master(id: &str, master: &str) -> Result<MasterId> {
    MasterId::parse(master).map_err(|e| RecurrenceError::malformed(id, e.to_string()))
}

/// `^\d{4}-\d{2}-\d{2}$`
fn has_date_shape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b.iter().enumerate().all(|(i, c)| match i {
            4 | 7 => *c == b'-',
            _ => c.is_ascii_digit(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn master() -> MasterId {
        MasterId::parse("0191b3c2-7e4a-7d10-9f00-1a2b3c4d5e6f").unwrap()
    }

    fn reason(err: RecurrenceError) -> String {
        match err {
            RecurrenceError::MalformedId { reason, .. } => reason,
            other => panic!("expected MalformedId, got {other:?}"),
        }
    }

    #[test]
    fn encode_uses_separator_and_padded_date() {
        let id = encode_occurrence_id(&master(), d(2024, 3, 7));
        assert_eq!(id, "0191b3c2-7e4a-7d10-9f00-1a2b3c4d5e6f_2024-03-07");
    }

    #[test]
    fn roundtrip_preserves_master_and_date() {
        for date in [d(2024, 1, 1), d(2024, 2, 29), d(1999, 12, 31)] {
            let decoded = decode_occurrence_id(&encode_occurrence_id(&master(), date)).unwrap();
            assert_eq!(decoded.master_id, master());
            assert_eq!(decoded.occurrence_date, Some(date));
        }
    }

    #[test]
    fn bare_master_has_no_date() {
        let decoded = decode_occurrence_id("shift-42").unwrap();
        assert_eq!(decoded.master_id.as_str(), "shift-42");
        assert_eq!(decoded.occurrence_date, None);
        assert_eq!(decoded.encode(), "shift-42");
    }

    #[test]
    fn empty_id_is_malformed() {
        assert_eq!(reason(decode_occurrence_id("").unwrap_err()), "empty id");
    }

    #[test]
    fn extra_separator_is_malformed() {
        let err = decode_occurrence_id("a_2024-01-01_x").unwrap_err();
        assert_eq!(reason(err), "too many separators");
    }

    #[test]
    fn wrong_date_shape_is_malformed() {
        assert!(decode_occurrence_id("a_2024-1-01").is_err());
        assert!(decode_occurrence_id("a_20240101").is_err());
        assert!(decode_occurrence_id("a_").is_err());
    }

    #[test]
    fn impossible_calendar_date_is_malformed() {
        let err = decode_occurrence_id("a_2023-02-29").unwrap_err();
        assert_eq!(reason(err), "not a calendar date");
    }

    #[test]
    fn empty_master_part_is_malformed() {
        assert!(decode_occurrence_id("_2024-01-01").is_err());
    }

    #[test]
    fn malformed_error_code_is_distinct() {
        let err = decode_occurrence_id("a_b_c").unwrap_err();
        assert_eq!(err.code(), "MALFORMED_ID");
    }
}
