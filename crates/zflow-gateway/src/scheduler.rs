/*!
 * Value polling schedule.
 *
 * Values with a configured poll interval are registered on first publish.
 * The gateway ticks the scheduler periodically and asks the device driver
 * to refresh every value that is due.
 */
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::debug;

use zflow_devices::NodeId;

#[derive(Debug, Clone)]
struct PollEntry {
    interval: Duration,
    next: Instant,
}

/// Poll entries keyed by node and value id
#[derive(Debug, Default)]
pub struct PollScheduler {
    entries: BTreeMap<(NodeId, String), PollEntry>,
}

impl PollScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value. Returns `false` when it is already scheduled.
    pub fn register(&mut self, node_id: NodeId, value_id: &str, interval: Duration, now: Instant) -> bool {
        let key = (node_id, value_id.to_string());
        if self.entries.contains_key(&key) {
            return false;
        }
        debug!("Polling {}-{} every {:?}", node_id, value_id, interval);
        self.entries.insert(
            key,
            PollEntry {
                interval,
                next: now + interval,
            },
        );
        true
    }

    /// Drop every entry of a node
    pub fn remove_node(&mut self, node_id: NodeId) {
        self.entries.retain(|(id, _), _| *id != node_id);
    }

    /// Values due at `now`; their next deadline moves one interval past `now`
    pub fn due(&mut self, now: Instant) -> Vec<(NodeId, String)> {
        self.entries
            .iter_mut()
            .filter(|(_, entry)| entry.next <= now)
            .map(|(key, entry)| {
                entry.next = now + entry.interval;
                key.clone()
            })
            .collect()
    }

    /// Number of scheduled values
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_entries() {
        let start = Instant::now();
        let mut scheduler = PollScheduler::new();
        assert!(scheduler.register(2, "49-0-Air temperature", Duration::from_secs(10), start));
        assert!(scheduler.register(2, "50-0-value-65537", Duration::from_secs(30), start));
        assert!(!scheduler.register(2, "49-0-Air temperature", Duration::from_secs(5), start));

        assert!(scheduler.due(start + Duration::from_secs(5)).is_empty());
        assert_eq!(
            scheduler.due(start + Duration::from_secs(10)),
            vec![(2, "49-0-Air temperature".to_string())]
        );
        assert!(scheduler.due(start + Duration::from_secs(15)).is_empty());
        assert_eq!(scheduler.due(start + Duration::from_secs(30)).len(), 2);
    }

    #[test]
    fn test_remove_node() {
        let now = Instant::now();
        let mut scheduler = PollScheduler::new();
        scheduler.register(2, "49-0-Air temperature", Duration::from_secs(1), now);
        scheduler.register(3, "49-0-Air temperature", Duration::from_secs(1), now);
        scheduler.remove_node(2);
        assert_eq!(scheduler.len(), 1);
    }
}
