use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub const STATUS_PRESENT: &str = "Present";

/// One attendance row per (employee, calendar date). Owned by the attendance
/// module; the biometric pipeline only inserts or merges into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceDay {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub status: Option<String>,
    pub check_in: Option<NaiveTime>,
    pub check_out: Option<NaiveTime>,
    pub remarks: Option<String>,
}
