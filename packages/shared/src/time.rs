//! Time-related helpers for rendering server timestamps.

use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, Utc};

/// Offset used when rendering timestamps for people (JST, UTC+9).
const DISPLAY_OFFSET_SECS: i32 = 9 * 3600;

fn display_offset() -> FixedOffset {
    // 9h is always within FixedOffset's +/-24h range.
    FixedOffset::east_opt(DISPLAY_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Convert a UTC timestamp to JST RFC 3339 format with second precision.
pub fn to_display_rfc3339(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&display_offset())
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Short `HH:MM` clock rendering in JST, used for compact message lines.
pub fn to_display_clock(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&display_offset())
        .format("%H:%M")
        .to_string()
}

/// Build a UTC timestamp from Unix milliseconds.
///
/// Returns `None` when the value is outside chrono's representable range.
pub fn from_unix_millis(timestamp_millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_display_rfc3339_format() {
        // テスト項目: タイムスタンプが JST の RFC 3339 形式に変換される
        // given (前提条件):
        // 2023-01-01 00:00:00 JST in milliseconds
        let timestamp = from_unix_millis(1672498800000).unwrap();

        // when (操作):
        let result = to_display_rfc3339(&timestamp);

        // then (期待する結果):
        assert_eq!(result, "2023-01-01T00:00:00+09:00");
    }

    #[test]
    fn test_to_display_clock() {
        // テスト項目: タイムスタンプが JST の時刻表記に変換される
        // given (前提条件):
        let timestamp = from_unix_millis(1672498800000 + 90 * 60 * 1000).unwrap();

        // when (操作):
        let result = to_display_clock(&timestamp);

        // then (期待する結果):
        assert_eq!(result, "01:30");
    }

    #[test]
    fn test_from_unix_millis_out_of_range() {
        // テスト項目: 範囲外のミリ秒値は None になる
        // given (前提条件):
        let millis = i64::MAX;

        // when (操作):
        let result = from_unix_millis(millis);

        // then (期待する結果):
        assert!(result.is_none());
    }
}
