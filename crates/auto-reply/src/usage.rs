//! Per-sender daily AI reply quota.
//!
//! The whole counter map resets when the wall-clock date rolls over.
//! Read-then-increment is atomic per process: callers hold the containing
//! mutex for the duration of [`AiUsage::check_and_increment`].

use std::collections::HashMap;

use chrono::{Local, NaiveDate};

#[derive(Debug)]
pub struct AiUsage {
    date: NaiveDate,
    counts: HashMap<String, u32>,
}

impl Default for AiUsage {
    fn default() -> Self {
        Self::new()
    }
}

impl AiUsage {
    pub fn new() -> Self {
        Self {
            date: Local::now().date_naive(),
            counts: HashMap::new(),
        }
    }

    /// Consume one reply slot for `sender` if the quota allows it.
    ///
    /// `limit == 0` means unlimited (nothing is counted).
    pub fn check_and_increment(&mut self, sender: &str, limit: u32) -> bool {
        self.check_and_increment_on(sender, limit, Local::now().date_naive())
    }

    /// Same as [`Self::check_and_increment`] with an explicit "today".
    pub fn check_and_increment_on(&mut self, sender: &str, limit: u32, today: NaiveDate) -> bool {
        if limit == 0 {
            return true;
        }
        if self.date != today {
            self.date = today;
            self.counts.clear();
        }
        let count = self.counts.entry(sender.to_string()).or_insert(0);
        if *count >= limit {
            return false;
        }
        *count += 1;
        true
    }
}
