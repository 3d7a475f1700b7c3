//! Batch windows: the daily periods in which history cleanup may run.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};

use crate::config::{ConfigError, HistoryCleanupConfig, WindowTimes};

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// A concrete window, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BatchWindow {
    pub fn is_within(&self, date: DateTime<Utc>) -> bool {
        self.start <= date && date < self.end
    }
}

/// Resolves the configured daily and per-weekday window times into
/// concrete windows.
#[derive(Debug, Clone, Default)]
pub struct BatchWindowManager {
    daily: Option<WindowTimes>,
    /// Overrides indexed by days from Monday.
    weekdays: [Option<WindowTimes>; 7],
}

impl BatchWindowManager {
    pub fn new(daily: Option<WindowTimes>, weekdays: [Option<WindowTimes>; 7]) -> Self {
        Self { daily, weekdays }
    }

    pub fn from_config(config: &HistoryCleanupConfig) -> Result<Self, ConfigError> {
        let mut weekdays = [None; 7];
        for day in WEEKDAYS {
            weekdays[day.num_days_from_monday() as usize] = config.weekday_window(day)?;
        }
        Ok(Self::new(config.daily_window()?, weekdays))
    }

    fn times_for(&self, day: Weekday) -> Option<WindowTimes> {
        self.weekdays[day.num_days_from_monday() as usize].or(self.daily)
    }

    /// The window that starts on the day of `date`, if one is configured.
    /// A window whose end is not after its start closes on the next day.
    pub fn create_window(&self, date: DateTime<Utc>) -> Option<BatchWindow> {
        let times = self.times_for(date.weekday())?;
        let day = date.date_naive();
        let start = day.and_time(times.start).and_utc();
        let mut end = day.and_time(times.end).and_utc();
        if end <= start {
            end += Duration::days(1);
        }
        Some(BatchWindow { start, end })
    }

    /// The window `date` falls into, or else the next one to open.
    pub fn current_or_next_window(&self, date: DateTime<Utc>) -> Option<BatchWindow> {
        if let Some(previous) = self.create_window(date - Duration::days(1))
            && previous.is_within(date)
        {
            return Some(previous);
        }
        if let Some(today) = self.create_window(date)
            && today.end > date
        {
            return Some(today);
        }
        self.first_window_after_day_of(date)
    }

    /// The next window that opens after `date`.
    pub fn next_window(&self, date: DateTime<Utc>) -> Option<BatchWindow> {
        match self.current_or_next_window(date) {
            Some(window) if window.start > date => Some(window),
            _ => (0..=7)
                .filter_map(|days| self.create_window(date + Duration::days(days)))
                .find(|window| window.start > date),
        }
    }

    pub fn is_window_configured(&self) -> bool {
        self.daily.is_some() || self.weekdays.iter().any(Option::is_some)
    }

    fn first_window_after_day_of(&self, date: DateTime<Utc>) -> Option<BatchWindow> {
        (1..=7).find_map(|days| self.create_window(date + Duration::days(days)))
    }
}
