//! Year/month stepping used by the time navigator and the playback timer.
//!
//! The timer lives outside the core; it calls `playback_tick` on each beat.

use serde::{Deserialize, Serialize};

use crate::models::Selection;

const MONTH_NAMES: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "month")]
pub enum PlaybackTick {
  /// No year selected; nothing to play through.
  Idle,
  Advance(u32),
  /// Stepped past December: month cleared, playback should stop.
  Finished,
}

/// `years` must be sorted ascending (as `available_years` returns them).
pub fn prev_year(years: &[i32], selected: Option<i32>) -> Option<i32> {
  let idx = years.iter().position(|&y| Some(y) == selected)?;
  idx.checked_sub(1).map(|i| years[i])
}

pub fn next_year(years: &[i32], selected: Option<i32>) -> Option<i32> {
  let idx = years.iter().position(|&y| Some(y) == selected)?;
  years.get(idx + 1).copied()
}

/// The month after the current one, or `None` when stepping is not possible.
pub fn next_month(selection: &Selection) -> Option<u32> {
  selection.year?;
  let m = selection.month.map_or(0, |m| m + 1);
  (m <= 11).then_some(m)
}

pub fn prev_month(selection: &Selection) -> Option<u32> {
  selection.year?;
  match selection.month {
    None => Some(11),
    Some(m) => m.checked_sub(1),
  }
}

pub fn playback_tick(selection: &Selection) -> PlaybackTick {
  if selection.year.is_none() {
    return PlaybackTick::Idle;
  }
  match next_month(selection) {
    Some(m) => PlaybackTick::Advance(m),
    None => PlaybackTick::Finished,
  }
}

/// `"March (Month 03)"`, or `"--"` when no month is selected.
pub fn month_label(month: Option<u32>) -> String {
  match month.and_then(|m| MONTH_NAMES.get(m as usize).map(|name| (m, name))) {
    Some((m, name)) => format!("{name} (Month {:02})", m + 1),
    None => "--".to_string(),
  }
}

pub fn year_label(year: Option<i32>) -> String {
  year.map_or_else(|| "All Years".to_string(), |y| y.to_string())
}
