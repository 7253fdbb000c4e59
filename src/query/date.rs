//! Date literal resolution for `t"..."` strings
//!
//! Resolution order: stored ISO formats, a few fixed absolute formats,
//! compound relative phrases ("1 year 3 days ago", "10 minutes from now"),
//! then `chrono_english` for everything else.

use crate::types::parse_datetime;
use chrono::{DateTime, Duration, Local, Months, NaiveDate, NaiveDateTime};
use chrono_english::{parse_date_string, Dialect};

const ABSOLUTE_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%b %d %Y", "%B %d %Y", "%b %d, %Y", "%B %d, %Y"];

/// Resolves a date phrase against `now`
pub fn resolve(phrase: &str, now: DateTime<Local>) -> Option<NaiveDateTime> {
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return None;
    }
    if let Some(dt) = parse_datetime(phrase) {
        return Some(dt);
    }
    for fmt in ABSOLUTE_DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(phrase, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    if let Some(dt) = resolve_relative(phrase, now.naive_local()) {
        return Some(dt);
    }
    parse_date_string(phrase, now, Dialect::Us)
        .ok()
        .map(|dt| dt.naive_local())
}

#[derive(Debug, Clone, Copy)]
enum Unit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    fn from_word(word: &str) -> Option<Self> {
        let word = word.strip_suffix('s').unwrap_or(word);
        match word {
            "sec" | "second" => Some(Unit::Second),
            "min" | "minute" => Some(Unit::Minute),
            "hr" | "hour" => Some(Unit::Hour),
            "day" => Some(Unit::Day),
            "week" => Some(Unit::Week),
            "month" => Some(Unit::Month),
            "year" => Some(Unit::Year),
            _ => None,
        }
    }
}

/// `now`, or `(<n> <unit>)+ (ago | from now | later)`
fn resolve_relative(phrase: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let lower = phrase.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    if words == ["now"] {
        return Some(now);
    }

    let (body, forward) = match words.as_slice() {
        [body @ .., "ago"] => (body, false),
        [body @ .., "from", "now"] => (body, true),
        [body @ .., "later"] => (body, true),
        _ => return None,
    };
    if body.is_empty() || body.len() % 2 != 0 {
        return None;
    }

    let mut at = now;
    for pair in body.chunks(2) {
        let amount: u32 = match pair[0] {
            "a" | "an" => 1,
            n => n.parse().ok()?,
        };
        let unit = Unit::from_word(pair[1])?;
        at = shift(at, amount, unit, forward)?;
    }
    Some(at)
}

fn shift(at: NaiveDateTime, amount: u32, unit: Unit, forward: bool) -> Option<NaiveDateTime> {
    let amount_i = amount as i64;
    let delta = match unit {
        Unit::Second => Duration::seconds(amount_i),
        Unit::Minute => Duration::minutes(amount_i),
        Unit::Hour => Duration::hours(amount_i),
        Unit::Day => Duration::days(amount_i),
        Unit::Week => Duration::weeks(amount_i),
        Unit::Month | Unit::Year => {
            let months = Months::new(match unit {
                Unit::Year => amount.checked_mul(12)?,
                _ => amount,
            });
            return if forward {
                at.checked_add_months(months)
            } else {
                at.checked_sub_months(months)
            };
        }
    };
    if forward {
        at.checked_add_signed(delta)
    } else {
        at.checked_sub_signed(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2014, 8, 25, 12, 0, 0).unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        parse_datetime(s).unwrap()
    }

    #[test]
    fn test_absolute_phrases() {
        assert_eq!(resolve("2014-08-22 10:30:00", now()), Some(at("2014-08-22 10:30:00")));
        assert_eq!(resolve("8/22/2014", now()), Some(at("2014-08-22 00:00:00")));
        assert_eq!(resolve("Aug 22 2014", now()), Some(at("2014-08-22 00:00:00")));
        assert_eq!(resolve("August 22, 2014", now()), Some(at("2014-08-22 00:00:00")));
    }

    #[test]
    fn test_relative_phrases() {
        assert_eq!(resolve("3 days ago", now()), Some(at("2014-08-22 12:00:00")));
        assert_eq!(resolve("10 minutes from now", now()), Some(at("2014-08-25 12:10:00")));
        assert_eq!(resolve("an hour ago", now()), Some(at("2014-08-25 11:00:00")));
        assert_eq!(resolve("1 year 3 days ago", now()), Some(at("2013-08-22 12:00:00")));
        assert_eq!(resolve("2 weeks later", now()), Some(at("2014-09-08 12:00:00")));
        assert_eq!(resolve("now", now()), Some(at("2014-08-25 12:00:00")));
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(resolve("", now()), None);
        assert_eq!(resolve_relative("3 fortnights ago", now().naive_local()), None);
        assert_eq!(resolve_relative("3 days", now().naive_local()), None);
    }
}
