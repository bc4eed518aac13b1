use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::daily_log::DailyLog;

/// Per-subscription buffer before a slow consumer starts lagging.
const CHANNEL_CAPACITY: usize = 32;

/// In-process change feed keyed by (user, date).
///
/// Both store backends publish every successful write here; `subscribe`
/// hands out a broadcast receiver for one record. Single-instance scope;
/// for multi-instance deployments this would need LISTEN/NOTIFY or Redis.
#[derive(Default)]
pub struct ChangeFeed {
    channels: Mutex<HashMap<(Uuid, NaiveDate), broadcast::Sender<DailyLog>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user_id: Uuid, date: NaiveDate) -> broadcast::Receiver<DailyLog> {
        let mut channels = self.channels.lock().expect("change feed lock poisoned");
        channels
            .entry((user_id, date))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn publish(&self, log: &DailyLog) {
        let mut channels = self.channels.lock().expect("change feed lock poisoned");
        let key = (log.user_id, log.log_date);
        if let Some(tx) = channels.get(&key) {
            // send() only errors when every receiver is gone; drop the idle
            // channel instead of keeping it alive forever.
            if tx.send(log.clone()).is_err() {
                channels.remove(&key);
            }
        }
    }
}
