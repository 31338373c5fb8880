//! CSV rendering of membership history

use cohort_membership::HistoryEntry;

pub const CSV_HEADER: &str = "id,segment,time_in,time_out";

/// Render history rows as CSV, header first, one CRLF-terminated record per
/// interval.
pub fn history_csv(entries: &[HistoryEntry]) -> String {
    let mut out = String::with_capacity(64 * (entries.len() + 1));
    out.push_str(CSV_HEADER);
    out.push_str("\r\n");

    for entry in entries {
        out.push_str(&entry.user_id.to_string());
        out.push(',');
        out.push_str(&escape_csv(&entry.segment));
        out.push(',');
        out.push_str(&entry.time_in());
        out.push(',');
        out.push_str(&entry.time_out());
        out.push_str("\r\n");
    }

    out
}

/// Quote a field if it contains a delimiter, quote or line break.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(segment: &str) -> HistoryEntry {
        HistoryEntry {
            user_id: 7,
            segment: segment.to_string(),
            time_added: 1_693_526_400,
            time_removed: 1_693_612_800,
        }
    }

    #[test]
    fn test_empty_history_is_header_only() {
        assert_eq!(history_csv(&[]), "id,segment,time_in,time_out\r\n");
    }

    #[test]
    fn test_rows() {
        let csv = history_csv(&[entry("promo")]);
        assert_eq!(
            csv,
            "id,segment,time_in,time_out\r\n\
             7,promo,2023-09-01T00:00:00+00:00,2023-09-02T00:00:00+00:00\r\n"
        );
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");

        let csv = history_csv(&[entry("x,y")]);
        assert!(csv.contains("7,\"x,y\",2023"));
    }
}
