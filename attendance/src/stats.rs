//! Aggregation over attendance history for the dashboard and report views.
//!
//! Pure functions over records fetched from the backend; rendering is the
//! UI's problem. History arrives newest first and rejected records count as
//! absences throughout.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

use client::types::{Attendance, AttendanceResult, AttendanceStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonthlyStats {
    pub total_days: usize,
    pub present_days: usize,
    pub late_days: usize,
    pub absent_days: usize,
    /// Attended (present or late) over total, rounded to whole percent.
    pub attendance_percentage: u8,
    /// On-time over attended, rounded to whole percent. 0 when nothing was
    /// attended.
    pub punctuality_percentage: u8,
}

pub fn monthly_stats(records: &[Attendance]) -> MonthlyStats {
    let total = records.len();
    if total == 0 {
        return MonthlyStats::default();
    }

    let present = records
        .iter()
        .filter(|r| r.result == AttendanceResult::OnTime && r.status != AttendanceStatus::Rejected)
        .count();
    let late = records
        .iter()
        .filter(|r| r.result == AttendanceResult::Late && r.status != AttendanceStatus::Rejected)
        .count();
    let absent = records
        .iter()
        .filter(|r| r.status == AttendanceStatus::Rejected)
        .count();

    let attended = present + late;
    MonthlyStats {
        total_days: total,
        present_days: present,
        late_days: late,
        absent_days: absent,
        attendance_percentage: percent(attended, total),
        punctuality_percentage: if attended > 0 {
            percent(present, attended)
        } else {
            0
        },
    }
}

fn percent(part: usize, whole: usize) -> u8 {
    ((part as f64 / whole as f64) * 100.0).round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayAttendance {
    pub date: NaiveDate,
    pub attended: bool,
}

/// The last seven days ending at `today`, oldest first. A day counts as
/// attended when any non-rejected record carries its date key.
pub fn weekly_attendance(records: &[Attendance], today: NaiveDate) -> Vec<DayAttendance> {
    (0..7)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            let key = date_key(date);
            let attended = records
                .iter()
                .any(|r| r.date_key == key && r.status != AttendanceStatus::Rejected);
            DayAttendance { date, attended }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    PerfectWeek,
    Punctuality,
    Commitment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub kind: AchievementKind,
    pub title: &'static str,
    pub detail: &'static str,
}

/// Badges earned from the history. `records` must be newest first; the
/// perfect-week check looks at the seven most recent entries.
pub fn earned_achievements(records: &[Attendance]) -> Vec<Achievement> {
    let mut earned = Vec::new();

    let recent_on_time = records
        .iter()
        .take(7)
        .filter(|r| r.result == AttendanceResult::OnTime && r.status != AttendanceStatus::Rejected)
        .count();
    if recent_on_time >= 5 {
        earned.push(Achievement {
            kind: AchievementKind::PerfectWeek,
            title: "Perfect week",
            detail: "5 on-time check-ins in your last 7",
        });
    }

    let on_time_total = records
        .iter()
        .filter(|r| r.result == AttendanceResult::OnTime)
        .count();
    if on_time_total >= 10 {
        earned.push(Achievement {
            kind: AchievementKind::Punctuality,
            title: "Punctuality streak",
            detail: "10 or more on-time check-ins",
        });
    }

    if records.len() >= 20 {
        earned.push(Achievement {
            kind: AchievementKind::Commitment,
            title: "Full commitment",
            detail: "20 check-ins recorded",
        });
    }

    earned
}

/// Latest record per date key. When the backend hands back more than one
/// record for a day, the one later in the list wins.
pub fn group_by_date(records: &[Attendance]) -> HashMap<String, Attendance> {
    let mut by_date = HashMap::new();
    for record in records {
        by_date.insert(record.date_key.clone(), record.clone());
    }
    by_date
}

/// "YYYY-MM-DD".
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}
