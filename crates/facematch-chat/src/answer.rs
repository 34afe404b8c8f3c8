//! Rule-based answers for questions the registration metadata settles exactly.

use crate::context::{Document, DocumentKind};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::fmt::Display;

/// Answer from document metadata when the question matches a known pattern.
///
/// Covers "last person registered", "how many … registered" and
/// "when was X registered". Returns `None` for anything else, or when the
/// corpus has nothing to say about it.
pub fn enhance<Tz>(question: &str, corpus: &[Document], now: &DateTime<Tz>) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let q = question.to_lowercase();
    let registrations = || corpus.iter().filter(|d| d.kind == DocumentKind::Registration);

    if q.contains("last person registered") {
        let latest = registrations().max_by_key(|d| {
            let ts = d.timestamp.as_deref().unwrap_or_default();
            (parse_timestamp(ts), ts.to_string())
        })?;
        let name = latest.person_name.as_deref().unwrap_or("Unknown");
        let when = format_timestamp(latest.timestamp.as_deref().unwrap_or_default(), now);
        return Some(format!("The last person registered was {name} at {when}."));
    }

    if q.contains("how many") && q.contains("registered") {
        let ids: HashSet<String> = registrations()
            .filter_map(|d| d.person_id.as_ref().map(|id| id.to_string()))
            .collect();
        return Some(format!("Currently, there are {} people registered in the system.", ids.len()));
    }

    if q.contains("when was") && q.contains("registered") {
        let wanted = extract_person_name(question)?.to_lowercase();
        let doc = registrations().find(|d| {
            d.person_name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&wanted))
        })?;
        let name = doc.person_name.as_deref().unwrap_or_default();
        let when = format_timestamp(doc.timestamp.as_deref().unwrap_or_default(), now);
        return Some(format!("{name} was registered at {when}."));
    }

    None
}

/// The word following "was" or "is", stripped of trailing punctuation.
pub fn extract_person_name(question: &str) -> Option<String> {
    let words: Vec<&str> = question.split_whitespace().collect();
    words
        .windows(2)
        .find(|pair| matches!(pair[0].to_lowercase().as_str(), "was" | "is"))
        .map(|pair| pair[1].trim_matches(|c| matches!(c, '?' | '.' | ',')).to_string())
        .filter(|name| !name.is_empty())
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
pub fn parse_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(timestamp, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Human-readable form relative to `now`: "today at 03:04 PM", "yesterday at …",
/// or "March 05, 2025 at 03:04 PM". Unparseable input is returned as-is.
pub fn format_timestamp<Tz>(timestamp: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let Some(parsed) = parse_timestamp(timestamp) else {
        return timestamp.to_string();
    };
    let local = parsed.with_timezone(&now.timezone());
    let today = now.date_naive();

    if local.date_naive() == today {
        format!("today at {}", local.format("%I:%M %p"))
    } else if Some(local.date_naive()) == today.checked_sub_signed(Duration::days(1)) {
        format!("yesterday at {}", local.format("%I:%M %p"))
    } else {
        local.format("%B %d, %Y at %I:%M %p").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::PersonId;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap()
    }

    fn registration(id: i64, name: &str, at: &str) -> Document {
        Document {
            kind: DocumentKind::Registration,
            text: format!("Person: {name}"),
            person_id: Some(PersonId::Number(id)),
            person_name: Some(name.into()),
            timestamp: Some(at.into()),
        }
    }

    fn corpus() -> Vec<Document> {
        vec![
            registration(1, "Alice", "2025-03-05T09:15:00Z"),
            registration(2, "Bob", "2025-03-10T15:04:00Z"),
            registration(3, "Carol", "2025-03-09T08:30:00Z"),
            registration(1, "Alice", "2025-03-05T09:15:00Z"),
            Document {
                kind: DocumentKind::RecognitionEvent,
                text: "Recognition Event".into(),
                person_id: None,
                person_name: Some("Zed".into()),
                timestamp: Some("2025-03-11T00:00:00Z".into()),
            },
        ]
    }

    #[rstest]
    #[case("2025-03-10T15:04:00Z", "today at 03:04 PM")]
    #[case("2025-03-09T08:30:00+00:00", "yesterday at 08:30 AM")]
    #[case("2025-03-05T09:15:00", "March 05, 2025 at 09:15 AM")]
    #[case("not a date", "not a date")]
    fn test_format_timestamp(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(format_timestamp(input, &now()), expected);
    }

    #[rstest]
    #[case("When was Alice registered?", Some("Alice"))]
    #[case("when is bob, registered", Some("bob"))]
    #[case("Who registered today?", None)]
    #[case("When was", None)]
    fn test_extract_person_name(#[case] question: &str, #[case] expected: Option<&str>) {
        assert_eq!(extract_person_name(question).as_deref(), expected);
    }

    #[test]
    fn test_last_person_registered() {
        let answer = enhance("Who was the last person registered?", &corpus(), &now()).unwrap();
        assert_eq!(answer, "The last person registered was Bob at today at 03:04 PM.");
    }

    #[test]
    fn test_how_many_counts_distinct_ids() {
        let answer = enhance("How many people are registered?", &corpus(), &now()).unwrap();
        assert_eq!(answer, "Currently, there are 3 people registered in the system.");
    }

    #[test]
    fn test_when_was_person_registered() {
        let answer = enhance("When was carol registered?", &corpus(), &now()).unwrap();
        assert_eq!(answer, "Carol was registered at yesterday at 08:30 AM.");
    }

    #[test]
    fn test_unmatched_questions_fall_through() {
        assert!(enhance("What is the average confidence?", &corpus(), &now()).is_none());
        assert!(enhance("When was Mallory registered?", &corpus(), &now()).is_none());
        assert!(enhance("Who was the last person registered?", &[], &now()).is_none());
    }
}
