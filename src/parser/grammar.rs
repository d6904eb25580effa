//! K1/K2 line grammar (§4.2).
//!
//! ```text
//! K1 HH:MM:SS.mmm.uuu  [.*] :<digits>
//! K2 HH:MM:SS.mmm.uuu  [.*] FL <digits>m .* F:<digits>%
//! ```
//!
//! Everything in the bracketed middle segment is opaque; only the leading
//! timestamp and the trailing tokens are meaningful.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{PacketType, RawPacket, SentState};

static K1_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^K1\s+(\d{2}):(\d{2}):(\d{2})\.(\d{3})\.(\d{3})\s+.*:(\d+)\s*$")
        .expect("K1 regex is a fixed valid pattern")
});

static K2_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^K2\s+(\d{2}):(\d{2}):(\d{2})\.(\d{3})\.(\d{3})\s+.*FL\s+(\d+)m.*F:(\d+)%\s*$")
        .expect("K2 regex is a fixed valid pattern")
});

/// Decodes one line into a [`RawPacket`] (sans id/created_at/updated_at,
/// which the Store assigns). Returns `None` for any non-matching line —
/// arbitrary unrecognised lines are permitted and silently ignored per §6.
pub fn parse_line(line: &str) -> Option<RawPacket> {
    if let Some(caps) = K1_RE.captures(line) {
        let time = parse_time(&caps)?;
        let event_time = combine_with_ingest_date(time);
        let (alarm, faithfulness) = RawPacket::default_alarm_faithfulness(PacketType::K1);
        return Some(RawPacket {
            id: 0,
            event_time,
            packet_type: PacketType::K1,
            callsign: Some(caps[6].to_string()),
            height_m: None,
            fuel_pct: None,
            alarm,
            faithfulness,
            sent: SentState::Pending,
            bound_to_track: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
    }

    if let Some(caps) = K2_RE.captures(line) {
        let time = parse_time(&caps)?;
        let event_time = combine_with_ingest_date(time);
        let (alarm, faithfulness) = RawPacket::default_alarm_faithfulness(PacketType::K2);
        let height_m: i64 = caps[6].parse().ok()?;
        let fuel_pct: i64 = caps[7].parse().ok()?;
        return Some(RawPacket {
            id: 0,
            event_time,
            packet_type: PacketType::K2,
            callsign: None,
            height_m: Some(height_m),
            fuel_pct: Some(fuel_pct),
            alarm,
            faithfulness,
            sent: SentState::Pending,
            bound_to_track: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
    }

    None
}

fn parse_time(caps: &regex::Captures) -> Option<NaiveTime> {
    let hour: u32 = caps[1].parse().ok()?;
    let min: u32 = caps[2].parse().ok()?;
    let sec: u32 = caps[3].parse().ok()?;
    let millis: u32 = caps[4].parse().ok()?;
    let micros: u32 = caps[5].parse().ok()?;
    let nanos = millis * 1_000_000 + micros * 1_000;
    NaiveTime::from_hms_nano_opt(hour, min, sec, nanos)
}

/// Combines a bare `HH:MM:SS.mmm.uuu` time with the local date at ingest.
/// If that produces a time more than 12 hours in the future, the decoder's
/// line predates local midnight — use yesterday's date instead (§4.2, §9).
fn combine_with_ingest_date(time: NaiveTime) -> chrono::DateTime<Utc> {
    let now_local = Local::now();
    let today = now_local.date_naive();

    let candidate = today_local_datetime(today, time, &now_local);
    let delta = candidate.signed_duration_since(now_local);

    if delta.num_hours() > 12 {
        let yesterday = today - chrono::Duration::days(1);
        today_local_datetime(yesterday, time, &now_local)
    } else {
        candidate
    }
    .with_timezone(&Utc)
}

fn today_local_datetime(
    date: NaiveDate,
    time: NaiveTime,
    reference: &chrono::DateTime<Local>,
) -> chrono::DateTime<Local> {
    let naive = NaiveDateTime::new(date, time);
    match reference.timezone().from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => reference.with_time(time).single().unwrap_or(*reference),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_k1_line() {
        let p = parse_line("K1 11:11:38.370.366 [ 8832] {018} **** :10437").unwrap();
        assert_eq!(p.packet_type, PacketType::K1);
        assert_eq!(p.callsign.as_deref(), Some("10437"));
        assert_eq!(p.height_m, None);
        assert_eq!(p.fuel_pct, None);
        assert_eq!(p.faithfulness, 50);
    }

    #[test]
    fn parses_k2_line() {
        let p = parse_line("K2 11:11:40.082.632 [ 8706] {017} **** FL 5360m [F176]+ F:40%").unwrap();
        assert_eq!(p.packet_type, PacketType::K2);
        assert_eq!(p.height_m, Some(5360));
        assert_eq!(p.fuel_pct, Some(40));
        assert_eq!(p.callsign, None);
        assert_eq!(p.faithfulness, 0);
    }

    #[test]
    fn rejects_unrecognised_lines() {
        assert!(parse_line("garbage line, not a packet").is_none());
        assert!(parse_line("K1 bad-time [ 8832] :10437").is_none());
        assert!(parse_line("K2 11:11:40.082.632 [ 8706] FL 5360m no fuel token").is_none());
    }

    #[test]
    fn sub_second_precision_survives_for_correlation_tie_breaking() {
        let a = parse_line("K2 11:11:40.000.000 [ 1] FL 100m F:1%").unwrap();
        let b = parse_line("K2 11:11:40.500.000 [ 1] FL 100m F:1%").unwrap();
        assert_ne!(a.event_time, b.event_time);
    }
}
