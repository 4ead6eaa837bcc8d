//! Human-readable dates and durations for listings.

use chrono::{DateTime, Datelike, Duration, TimeZone};

const TIME: &str = "%-I:%M %p";

/// Format a mail timestamp relative to `now`.
///
/// Today shows the time only, yesterday is spelled out, the current week
/// (starting Sunday) shows the weekday, the current year omits the year.
pub fn format_mail_date<Tz: TimeZone>(date: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let day = date.date_naive();
    let today = now.date_naive();
    let time = date.format(TIME);

    if day == today {
        return time.to_string();
    }

    if today.pred_opt() == Some(day) {
        return format!("Yesterday, {}", time);
    }

    let days_into_week = i64::from(today.weekday().num_days_from_sunday());
    let start_of_week = today - Duration::days(days_into_week);

    if day >= start_of_week && day < today {
        format!("{}, {}", date.format("%a"), time)
    } else if date.year() == now.year() {
        format!("{}, {}", date.format("%b %-d"), time)
    } else {
        format!("{}, {}", date.format("%b %-d, %Y"), time)
    }
}

/// Format an elapsed duration (e.g., "45 min", "1 hour").
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.num_minutes();

    if total_minutes < 1 {
        "< 1 min".to_string()
    } else if total_minutes < 60 {
        format!("{} min", total_minutes)
    } else if total_minutes < 60 * 24 {
        let hours = total_minutes / 60;
        let mins = total_minutes % 60;
        if mins == 0 {
            format!("{} hour{}", hours, if hours == 1 { "" } else { "s" })
        } else {
            format!("{}h {}m", hours, mins)
        }
    } else {
        let days = total_minutes / (60 * 24);
        format!("{} day{}", days, if days == 1 { "" } else { "s" })
    }
}
