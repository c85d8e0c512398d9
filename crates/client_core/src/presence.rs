//! Pure formatting of presence timestamps and delivery states. Deterministic
//! given `now`; no side effects.

use chrono::{DateTime, Utc};

use shared::domain::DeliveryStatus;

pub fn format_last_seen(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let mins = (now - last_seen).num_minutes().max(0);
    if mins < 1 {
        return "just now".to_string();
    }
    if mins < 60 {
        return format!("{mins} min ago");
    }
    let hours = mins / 60;
    if hours < 24 {
        return format!("{hours} hr ago");
    }
    let days = hours / 24;
    if days > 1 {
        format!("{days} days ago")
    } else {
        format!("{days} day ago")
    }
}

/// The presence line under a peer's name.
pub fn presence_label(online: bool, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    if online {
        return "Online".to_string();
    }
    match last_seen {
        Some(at) => format!("Last seen {}", format_last_seen(at, now)),
        None => "Offline".to_string(),
    }
}

/// Tick iconography on an own message bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryTicks {
    Single,
    Double,
    DoubleSeen,
}

impl DeliveryTicks {
    pub fn glyph(self) -> &'static str {
        match self {
            DeliveryTicks::Single => "\u{2713}",
            DeliveryTicks::Double | DeliveryTicks::DoubleSeen => "\u{2713}\u{2713}",
        }
    }

    /// Seen ticks render emphasized.
    pub fn emphasized(self) -> bool {
        self == DeliveryTicks::DoubleSeen
    }
}

/// `None` for a message the server has not confirmed yet.
pub fn delivery_ticks(status: Option<DeliveryStatus>) -> Option<DeliveryTicks> {
    status.map(|status| match status {
        DeliveryStatus::Sent => DeliveryTicks::Single,
        DeliveryStatus::Delivered => DeliveryTicks::Double,
        DeliveryStatus::Seen => DeliveryTicks::DoubleSeen,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn now() -> DateTime<Utc> {
        "2024-06-01T12:00:00Z".parse().expect("timestamp")
    }

    #[test]
    fn under_a_minute_is_just_now() {
        assert_eq!(format_last_seen(now() - Duration::seconds(30), now()), "just now");
    }

    #[test]
    fn minutes_format() {
        assert_eq!(
            format_last_seen(now() - Duration::minutes(5), now()),
            "5 min ago"
        );
        assert_eq!(
            format_last_seen(now() - Duration::minutes(59), now()),
            "59 min ago"
        );
    }

    #[test]
    fn hours_format() {
        assert_eq!(
            format_last_seen(now() - Duration::hours(3), now()),
            "3 hr ago"
        );
        assert_eq!(
            format_last_seen(now() - Duration::hours(23), now()),
            "23 hr ago"
        );
    }

    #[test]
    fn days_pluralize_above_one() {
        assert_eq!(
            format_last_seen(now() - Duration::hours(25), now()),
            "1 day ago"
        );
        assert_eq!(
            format_last_seen(now() - Duration::hours(50), now()),
            "2 days ago"
        );
    }

    #[test]
    fn future_timestamps_clamp_to_just_now() {
        assert_eq!(format_last_seen(now() + Duration::minutes(2), now()), "just now");
    }

    #[test]
    fn labels_prefer_online_over_last_seen() {
        let at = now() - Duration::minutes(5);
        assert_eq!(presence_label(true, Some(at), now()), "Online");
        assert_eq!(presence_label(false, Some(at), now()), "Last seen 5 min ago");
        assert_eq!(presence_label(false, None, now()), "Offline");
    }

    #[test]
    fn ticks_track_delivery_status() {
        assert_eq!(delivery_ticks(None), None);
        assert_eq!(
            delivery_ticks(Some(DeliveryStatus::Sent)),
            Some(DeliveryTicks::Single)
        );
        assert_eq!(
            delivery_ticks(Some(DeliveryStatus::Delivered)),
            Some(DeliveryTicks::Double)
        );
        let seen = delivery_ticks(Some(DeliveryStatus::Seen)).expect("ticks");
        assert_eq!(seen, DeliveryTicks::DoubleSeen);
        assert!(seen.emphasized());
        assert_eq!(seen.glyph(), "\u{2713}\u{2713}");
    }
}
