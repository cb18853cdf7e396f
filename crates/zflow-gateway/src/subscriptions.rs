/*!
 * Write-back subscriptions.
 *
 * Every writable value gets its topic registered here the first time it is
 * published. Subscriptions are issued per topic depth with one wildcard
 * pattern, not per topic.
 */
use std::collections::{BTreeSet, HashMap};

use zflow_core::config::ValueOverride;
use zflow_devices::NodeId;

/// Value behind a write-back topic
#[derive(Debug, Clone, PartialEq)]
pub struct TopicValue {
    /// Node
    pub node_id: NodeId,
    /// Node-less value id
    pub value_id: String,
    /// Override resolved for the value
    pub conf: Option<ValueOverride>,
}

/// Topic-value map and subscribed depths
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    topics: HashMap<String, TopicValue>,
    depths: BTreeSet<usize>,
}

/// Number of segments in a topic
pub fn depth(topic: &str) -> usize {
    topic.split('/').count()
}

/// Single-level wildcard pattern matching every topic of a depth
pub fn wildcard_pattern(depth: usize) -> String {
    vec!["+"; depth].join("/")
}

impl SubscriptionManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a topic. Returns the depth when it needs a new subscription.
    pub fn track(&mut self, topic: &str, entry: TopicValue) -> Option<usize> {
        self.topics.insert(topic.to_string(), entry);
        let depth = depth(topic);
        self.depths.insert(depth).then_some(depth)
    }

    /// Whether a topic is registered
    pub fn is_tracked(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Forget a depth whose subscription failed, so the next topic retries it
    pub fn forget_depth(&mut self, depth: usize) {
        self.depths.remove(&depth);
    }

    /// Value behind a topic
    pub fn lookup(&self, topic: &str) -> Option<&TopicValue> {
        self.topics.get(topic)
    }

    /// Values whose topic ends with `suffix` on a segment boundary
    pub fn matching_suffix(&self, suffix: &str) -> Vec<TopicValue> {
        let mut matches: Vec<(&String, &TopicValue)> = self
            .topics
            .iter()
            .filter(|(topic, _)| {
                topic.as_str() == suffix
                    || topic
                        .strip_suffix(suffix)
                        .map(|rest| rest.ends_with('/'))
                        .unwrap_or(false)
            })
            .collect();
        matches.sort_by(|a, b| a.0.cmp(b.0));
        matches.into_iter().map(|(_, v)| v.clone()).collect()
    }

    /// Drop every topic of a node. Returns how many were removed.
    pub fn purge_node(&mut self, node_id: NodeId) -> usize {
        let before = self.topics.len();
        self.topics.retain(|_, v| v.node_id != node_id);
        before - self.topics.len()
    }

    /// Subscribed depths
    pub fn depths(&self) -> Vec<usize> {
        self.depths.iter().copied().collect()
    }

    /// Number of registered topics
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether no topic is registered
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(node_id: NodeId, value_id: &str) -> TopicValue {
        TopicValue {
            node_id,
            value_id: value_id.to_string(),
            conf: None,
        }
    }

    #[test]
    fn test_one_subscription_per_depth() {
        let mut manager = SubscriptionManager::new();
        assert_eq!(manager.track("a/switch_binary/endpoint_0/targetValue", entry(1, "37-0-targetValue")), Some(4));
        assert_eq!(manager.track("b/switch_binary/endpoint_0/targetValue", entry(2, "37-0-targetValue")), None);
        assert_eq!(manager.track("b/thermostat_setpoint/endpoint_0/setpoint/1", entry(2, "67-0-setpoint-1")), Some(5));
        assert_eq!(manager.depths(), vec![4, 5]);
        assert_eq!(wildcard_pattern(4), "+/+/+/+");
    }

    #[test]
    fn test_lookup_and_suffix() {
        let mut manager = SubscriptionManager::new();
        manager.track("kitchen/lamp/switch_binary/endpoint_0/targetValue", entry(1, "37-0-targetValue"));
        manager.track("hall/lamp/switch_binary/endpoint_0/targetValue", entry(2, "37-0-targetValue"));
        manager.track("hall/xlamp/switch_binary/endpoint_0/targetValue", entry(3, "37-0-targetValue"));

        assert_eq!(manager.lookup("hall/lamp/switch_binary/endpoint_0/targetValue").map(|v| v.node_id), Some(2));
        let matches = manager.matching_suffix("lamp/switch_binary/endpoint_0/targetValue");
        assert_eq!(matches.iter().map(|v| v.node_id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_purge_node_and_forget_depth() {
        let mut manager = SubscriptionManager::new();
        manager.track("a/b", entry(1, "37-0-targetValue"));
        manager.track("a/c", entry(2, "37-0-targetValue"));
        assert_eq!(manager.purge_node(1), 1);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.depths(), vec![2]);

        manager.forget_depth(2);
        assert_eq!(manager.track("a/d", entry(2, "38-0-targetValue")), Some(2));
    }
}
