use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

/// Temporary provider blacklist. Entries expire automatically on the next
/// read; there is no separate sweep.
pub struct ProviderAvailabilityTracker {
    unavailable_until: DashMap<String, DateTime<Utc>>,
}

impl ProviderAvailabilityTracker {
    pub fn new() -> Self {
        Self {
            unavailable_until: DashMap::new(),
        }
    }

    /// Mark a provider unavailable until `now + duration`.
    pub fn mark_unavailable(&self, provider: &str, duration: Duration) {
        let until = Utc::now() + duration;
        info!("Marking provider '{}' unavailable until {}", provider, until);
        self.unavailable_until.insert(provider.to_string(), until);
    }

    /// True strictly at or after the expiry timestamp, false before it. A
    /// stale entry is removed on the read that observes its expiry.
    pub fn is_available(&self, provider: &str) -> bool {
        self.is_available_at(provider, Utc::now())
    }

    pub(crate) fn is_available_at(&self, provider: &str, now: DateTime<Utc>) -> bool {
        let expired = match self.unavailable_until.get(provider) {
            Some(until) if now < *until => return false,
            Some(_) => true,
            None => return true,
        };

        if expired {
            debug!("Availability entry for '{}' expired, removing", provider);
            self.unavailable_until.remove(provider);
        }
        true
    }

    pub fn blacklisted_count(&self) -> usize {
        self.unavailable_until.len()
    }
}

impl Default for ProviderAvailabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_is_available_by_default() {
        let tracker = ProviderAvailabilityTracker::new();
        assert!(tracker.is_available("openai"));
    }

    #[test]
    fn unavailable_before_expiry_available_at_and_after() {
        let tracker = ProviderAvailabilityTracker::new();
        tracker.mark_unavailable("openai", Duration::minutes(5));

        let marked_at = Utc::now();
        assert!(!tracker.is_available_at("openai", marked_at));
        assert!(!tracker.is_available_at("openai", marked_at + Duration::minutes(4)));
        assert!(tracker.is_available_at("openai", marked_at + Duration::minutes(6)));
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let tracker = ProviderAvailabilityTracker::new();
        tracker.mark_unavailable("openai", Duration::milliseconds(-1));

        assert!(tracker.is_available("openai"));
        assert_eq!(tracker.blacklisted_count(), 0);
    }

    #[test]
    fn remarking_extends_the_blacklist() {
        let tracker = ProviderAvailabilityTracker::new();
        tracker.mark_unavailable("openai", Duration::minutes(1));
        tracker.mark_unavailable("openai", Duration::minutes(30));

        let now = Utc::now();
        assert!(!tracker.is_available_at("openai", now + Duration::minutes(5)));
    }
}
