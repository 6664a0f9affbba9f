//! Traffic accounting windows.

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::Serialize;

/// A fixed accounting period. Counters accumulate until the window is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Window {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::OneMinute, Window::FiveMinutes, Window::ThirtyMinutes];

    /// Reset cadence of this window.
    pub fn period(self) -> Duration {
        match self {
            Window::OneMinute => Duration::from_secs(60),
            Window::FiveMinutes => Duration::from_secs(5 * 60),
            Window::ThirtyMinutes => Duration::from_secs(30 * 60),
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Window::OneMinute => 0,
            Window::FiveMinutes => 1,
            Window::ThirtyMinutes => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Window::OneMinute => "1m",
            Window::FiveMinutes => "5m",
            Window::ThirtyMinutes => "30m",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Byte counters for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowCounters {
    /// When this window was last started or reset.
    pub started_at: SystemTime,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl WindowCounters {
    pub(crate) fn starting_at(now: SystemTime) -> Self {
        Self {
            started_at: now,
            bytes_read: 0,
            bytes_written: 0,
        }
    }
}
