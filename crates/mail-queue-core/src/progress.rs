use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of named steps a single-recipient send walks through.
pub const SINGLE_EMAIL_STEPS: u32 = 5;

/// Snapshot of how far a running task has got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u32,
    pub total: u32,
    /// 0-100, rounded
    pub percent: u8,
    pub message: String,
    /// "k/5" label, only set for single-recipient sends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Progress {
    pub fn new(current: u32, total: u32, message: impl Into<String>) -> Self {
        Progress {
            current,
            total,
            percent: percent(current, total),
            message: message.into(),
            step: None,
            timestamp: Utc::now(),
        }
    }

    /// Progress for step `step` of a single-recipient send.
    pub fn step(step: u32, message: impl Into<String>) -> Self {
        let mut progress = Progress::new(step, SINGLE_EMAIL_STEPS, message);
        progress.step = Some(format!("{}/{}", step, SINGLE_EMAIL_STEPS));
        progress
    }
}

/// `round(current / total * 100)`, clamped to 100; 0 when `total` is 0.
pub fn percent(current: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let value = (current as f64 / total as f64 * 100.0).round();
    value.clamp(0.0, 100.0) as u8
}

/// `sent / total * 100` rounded to one decimal place; 0.0 when `total` is 0.
pub fn success_rate(sent: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = sent as f64 / total as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}
