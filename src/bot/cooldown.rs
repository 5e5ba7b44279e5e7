use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::UserId;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{PlaybackError, PlaybackResult};

/// Per-user minimum interval between `play` commands
pub struct PlayCooldown {
    interval: Duration,
    last_use: DashMap<UserId, Instant>,
}

impl PlayCooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_use: DashMap::new(),
        }
    }

    /// Records a use, or refuses with the remaining wait. A refused attempt
    /// does not restart the interval.
    pub fn check(&self, user_id: UserId) -> PlaybackResult<()> {
        let now = Instant::now();

        match self.last_use.entry(user_id) {
            Entry::Occupied(mut last) => {
                let elapsed = now.saturating_duration_since(*last.get());
                if elapsed < self.interval {
                    return Err(PlaybackError::RateLimited {
                        remaining: self.interval - elapsed,
                    });
                }
                last.insert(now);
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
            }
        }

        Ok(())
    }
}
