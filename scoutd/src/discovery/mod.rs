pub mod events;
pub mod orchestrator;
pub mod registry;

pub use events::{DiscoveryEvent, InstanceResolver, ResolvedInstance, ServiceBrowser};
pub use orchestrator::Orchestrator;
pub use registry::{DedupKeys, ServiceTypeRegistry, Settle};
