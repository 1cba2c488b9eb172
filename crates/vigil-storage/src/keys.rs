//! Object key layout.

use chrono::{DateTime, Utc};

/// `YYYY/MM/DD/<filename>` for the day of `ts` (UTC).
pub fn dated_key(ts: &DateTime<Utc>, filename: &str) -> String {
    format!("{}/{}", ts.format("%Y/%m/%d"), filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_dated_key_partitions_by_day() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 1).unwrap();
        assert_eq!(dated_key(&ts, "a.jpg"), "2024/03/07/a.jpg");
    }
}
