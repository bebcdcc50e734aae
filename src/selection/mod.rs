pub mod availability;
pub mod performance;
pub mod registry;
pub mod selector;

pub use availability::ProviderAvailabilityTracker;
pub use performance::PerformanceTracker;
pub use registry::ModelCapabilityRegistry;
pub use selector::ModelSelector;
