//! Timezone service.
//!
//! Storage is UTC-canonical; this module is the only place local wall-clock
//! times are resolved against named zones. The DST policy is fixed and
//! documented rather than left to chance:
//!
//! - a local time that does not exist (spring-forward gap) advances past the
//!   gap to the first valid instant;
//! - an ambiguous local time (fall-back repeat) resolves to its first
//!   occurrence.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;
use tracing::debug;

use crate::error::TimezoneError;

/// Widest DST gap the resolution policy will step across, in minutes.
const MAX_GAP_MINUTES: i64 = 180;
/// Step used to probe past a DST gap, in minutes.
const GAP_STEP_MINUTES: i64 = 15;

/// Parses an IANA zone name.
///
/// # Errors
///
/// Returns [`TimezoneError::UnknownZone`] for anything `chrono-tz` does not
/// recognize.
pub fn parse_zone(name: &str) -> Result<Tz, TimezoneError> {
    Tz::from_str(name).map_err(|_| TimezoneError::UnknownZone(name.to_string()))
}

/// Resolves a local wall-clock time in `zone` to a UTC instant, applying the
/// module's DST policy.
///
/// # Errors
///
/// Returns [`TimezoneError::UnmappableLocalTime`] if the local time sits in
/// a gap wider than [`MAX_GAP_MINUTES`].
pub fn to_utc(local: NaiveDateTime, zone: Tz) -> Result<DateTime<Utc>, TimezoneError> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        // First occurrence of a repeated local time.
        LocalResult::Ambiguous(first, _second) => Ok(first.with_timezone(&Utc)),
        LocalResult::None => {
            // Probe forward out of the gap.
            let mut probe = local;
            let limit = local + Duration::minutes(MAX_GAP_MINUTES);
            while probe <= limit {
                probe += Duration::minutes(GAP_STEP_MINUTES);
                match zone.from_local_datetime(&probe) {
                    LocalResult::Single(dt) => {
                        debug!(local = %local, resolved = %probe, zone = %zone, "advanced past DST gap");
                        return Ok(dt.with_timezone(&Utc));
                    }
                    LocalResult::Ambiguous(first, _) => {
                        return Ok(first.with_timezone(&Utc));
                    }
                    LocalResult::None => continue,
                }
            }
            Err(TimezoneError::UnmappableLocalTime {
                local,
                zone: zone.name().to_string(),
            })
        }
    }
}

/// Converts a UTC instant into the given zone.
pub fn from_utc(instant: DateTime<Utc>, zone: Tz) -> DateTime<Tz> {
    instant.with_timezone(&zone)
}

/// Maps a series of local occurrence dates at a fixed wall-clock time into
/// concrete UTC instants, applying the DST policy per occurrence.
///
/// Dates whose local time cannot be resolved at all are dropped; that only
/// happens for gaps wider than [`MAX_GAP_MINUTES`], which no real zone has.
pub fn expand_local_occurrences(
    dates: impl IntoIterator<Item = NaiveDate>,
    time: NaiveTime,
    zone: Tz,
) -> Vec<DateTime<Utc>> {
    dates
        .into_iter()
        .filter_map(|date| to_utc(date.and_time(time), zone).ok())
        .collect()
}

/// Signals available for zone auto-detection.
#[derive(Debug, Clone, Default)]
pub struct ZoneSignals {
    /// An explicit IANA name, e.g. from a calendar property.
    pub iana_name: Option<String>,
    /// A BCP 47 locale tag, e.g. `en-US`.
    pub locale: Option<String>,
    /// The observed UTC offset in minutes (east positive).
    pub utc_offset_minutes: Option<i32>,
}

/// A detected zone plus how much to trust it.
///
/// Confidence is always attached so callers never mistake a fallback for a
/// certain answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneGuess {
    /// The detected zone.
    pub zone: Tz,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Detects a timezone from the given signals.
///
/// Precedence: explicit IANA name (1.0) > locale region (0.7) > UTC offset
/// (0.4) > UTC fallback (0.1).
pub fn detect_zone(signals: &ZoneSignals) -> ZoneGuess {
    if let Some(ref name) = signals.iana_name
        && let Ok(zone) = parse_zone(name)
    {
        return ZoneGuess {
            zone,
            confidence: 1.0,
        };
    }

    if let Some(ref locale) = signals.locale
        && let Some(zone) = zone_for_locale(locale)
    {
        return ZoneGuess {
            zone,
            confidence: 0.7,
        };
    }

    if let Some(offset) = signals.utc_offset_minutes
        && let Some(zone) = zone_for_offset(offset)
    {
        return ZoneGuess {
            zone,
            confidence: 0.4,
        };
    }

    ZoneGuess {
        zone: Tz::UTC,
        confidence: 0.1,
    }
}

/// Representative zone for a locale's region subtag.
fn zone_for_locale(locale: &str) -> Option<Tz> {
    let region = locale
        .split(['-', '_'])
        .nth(1)
        .map(|r| r.to_ascii_uppercase())?;
    let zone = match region.as_str() {
        "US" => Tz::America__New_York,
        "CA" => Tz::America__Toronto,
        "BR" => Tz::America__Sao_Paulo,
        "GB" => Tz::Europe__London,
        "IE" => Tz::Europe__Dublin,
        "FR" => Tz::Europe__Paris,
        "DE" => Tz::Europe__Berlin,
        "ES" => Tz::Europe__Madrid,
        "IT" => Tz::Europe__Rome,
        "NL" => Tz::Europe__Amsterdam,
        "PL" => Tz::Europe__Warsaw,
        "IN" => Tz::Asia__Kolkata,
        "CN" => Tz::Asia__Shanghai,
        "JP" => Tz::Asia__Tokyo,
        "KR" => Tz::Asia__Seoul,
        "AU" => Tz::Australia__Sydney,
        "NZ" => Tz::Pacific__Auckland,
        _ => return None,
    };
    Some(zone)
}

/// Fixed-offset zone for whole-hour offsets.
///
/// `Etc/GMT` names have inverted signs per POSIX: `Etc/GMT-2` is UTC+2.
fn zone_for_offset(offset_minutes: i32) -> Option<Tz> {
    if offset_minutes % 60 != 0 {
        return None;
    }
    let hours = offset_minutes / 60;
    if hours == 0 {
        return Some(Tz::UTC);
    }
    Tz::from_str(&format!("Etc/GMT{:+}", -hours)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    mod conversions {
        use super::*;

        #[test]
        fn parse_known_zone() {
            assert!(parse_zone("Europe/Paris").is_ok());
            assert!(parse_zone("Not/AZone").is_err());
        }

        #[test]
        fn unambiguous_local_time() {
            let instant = to_utc(naive(2025, 6, 10, 12, 0), Tz::Europe__Paris).unwrap();
            // Paris is UTC+2 in June.
            assert_eq!(instant, utc(2025, 6, 10, 10, 0));
        }

        #[test]
        fn nonexistent_local_time_advances_past_the_gap() {
            // Paris springs forward 2025-03-30: 02:00 -> 03:00 local.
            let instant = to_utc(naive(2025, 3, 30, 2, 30), Tz::Europe__Paris).unwrap();
            // First valid instant after the gap is 03:00 CEST = 01:00 UTC.
            assert_eq!(instant, utc(2025, 3, 30, 1, 0));
        }

        #[test]
        fn ambiguous_local_time_takes_first_occurrence() {
            // Paris falls back 2025-10-26: 03:00 CEST -> 02:00 CET, so
            // 02:30 happens twice. First occurrence is still CEST (+2).
            let instant = to_utc(naive(2025, 10, 26, 2, 30), Tz::Europe__Paris).unwrap();
            assert_eq!(instant, utc(2025, 10, 26, 0, 30));
        }

        #[test]
        fn from_utc_roundtrip() {
            let instant = utc(2025, 6, 10, 10, 0);
            let local = from_utc(instant, Tz::Europe__Paris);
            assert_eq!(local.naive_local(), naive(2025, 6, 10, 12, 0));
        }
    }

    mod occurrence_expansion {
        use super::*;

        #[test]
        fn expands_across_a_dst_transition() {
            // 09:00 local daily across the US spring-forward (2025-03-09).
            let dates = [
                NaiveDate::from_ymd_opt(2025, 3, 8).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            ];
            let instants = expand_local_occurrences(
                dates,
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                Tz::America__New_York,
            );

            // EST (-5) before, EDT (-4) after: the UTC hour shifts.
            assert_eq!(
                instants,
                vec![
                    utc(2025, 3, 8, 14, 0),
                    utc(2025, 3, 9, 13, 0),
                    utc(2025, 3, 10, 13, 0),
                ]
            );
        }

        #[test]
        fn occurrence_in_the_gap_advances() {
            // 02:30 local on the US spring-forward day does not exist.
            let instants = expand_local_occurrences(
                [NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()],
                NaiveTime::from_hms_opt(2, 30, 0).unwrap(),
                Tz::America__New_York,
            );
            // Advanced to 03:00 EDT = 07:00 UTC.
            assert_eq!(instants, vec![utc(2025, 3, 9, 7, 0)]);
        }
    }

    mod detection {
        use super::*;

        #[test]
        fn explicit_name_wins_with_full_confidence() {
            let guess = detect_zone(&ZoneSignals {
                iana_name: Some("Asia/Tokyo".into()),
                locale: Some("en-US".into()),
                utc_offset_minutes: Some(-300),
            });
            assert_eq!(guess.zone, Tz::Asia__Tokyo);
            assert_eq!(guess.confidence, 1.0);
        }

        #[test]
        fn locale_region_is_second() {
            let guess = detect_zone(&ZoneSignals {
                locale: Some("fr-FR".into()),
                ..Default::default()
            });
            assert_eq!(guess.zone, Tz::Europe__Paris);
            assert_eq!(guess.confidence, 0.7);
        }

        #[test]
        fn offset_maps_to_fixed_zone() {
            let guess = detect_zone(&ZoneSignals {
                utc_offset_minutes: Some(120),
                ..Default::default()
            });
            // Etc/GMT-2 is UTC+2.
            assert_eq!(guess.zone.name(), "Etc/GMT-2");
            assert_eq!(guess.confidence, 0.4);
        }

        #[test]
        fn fallback_is_utc_with_low_confidence() {
            let guess = detect_zone(&ZoneSignals::default());
            assert_eq!(guess.zone, Tz::UTC);
            assert_eq!(guess.confidence, 0.1);
        }

        #[test]
        fn invalid_name_falls_through_to_locale() {
            let guess = detect_zone(&ZoneSignals {
                iana_name: Some("Invalid/Zone".into()),
                locale: Some("ja-JP".into()),
                ..Default::default()
            });
            assert_eq!(guess.zone, Tz::Asia__Tokyo);
            assert_eq!(guess.confidence, 0.7);
        }
    }
}
