use crate::error::CoreError;
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fixed wall-clock trading session block.
///
/// Windows are evaluated in a single configured UTC offset (the market
/// reference clock). They never overlap, and some hours (the weekend) fall in
/// no window at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionWindow {
    TokyoAm,
    TokyoPm,
    LondonAm,
    LondonPm,
    #[serde(rename = "newyork_am")]
    NewYorkAm,
    #[serde(rename = "newyork_pm")]
    NewYorkPm,
}

impl SessionWindow {
    pub const ALL: [SessionWindow; 6] = [
        SessionWindow::TokyoAm,
        SessionWindow::TokyoPm,
        SessionWindow::LondonAm,
        SessionWindow::LondonPm,
        SessionWindow::NewYorkAm,
        SessionWindow::NewYorkPm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionWindow::TokyoAm => "tokyo_am",
            SessionWindow::TokyoPm => "tokyo_pm",
            SessionWindow::LondonAm => "london_am",
            SessionWindow::LondonPm => "london_pm",
            SessionWindow::NewYorkAm => "newyork_am",
            SessionWindow::NewYorkPm => "newyork_pm",
        }
    }

    /// The window containing `time` on the clock at `offset`, if any.
    pub fn at(time: DateTime<Utc>, offset: FixedOffset) -> Option<Self> {
        let local = time.with_timezone(&offset);
        let hour = local.hour();
        let day = local.weekday();
        SessionWindow::ALL
            .into_iter()
            .find(|window| window.contains(day, hour))
    }

    fn contains(&self, day: Weekday, hour: u32) -> bool {
        let day_index = day.number_from_monday();
        let weekday = day_index <= 5;
        match self {
            SessionWindow::TokyoAm => weekday && (7..12).contains(&hour),
            SessionWindow::TokyoPm => weekday && (12..15).contains(&hour),
            SessionWindow::LondonAm => weekday && (15..20).contains(&hour),
            SessionWindow::LondonPm => weekday && (20..22).contains(&hour),
            SessionWindow::NewYorkAm => {
                let late = day != Weekday::Sat && hour >= 22;
                let early = day != Weekday::Mon && hour < 3;
                day_index <= 6 && (late || early)
            }
            SessionWindow::NewYorkPm => (2..=6).contains(&day_index) && (3..7).contains(&hour),
        }
    }
}

impl fmt::Display for SessionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionWindow {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionWindow::ALL
            .into_iter()
            .find(|window| window.as_str() == s)
            .ok_or_else(|| CoreError::InvalidInput("session window".to_string(), s.to_string()))
    }
}
