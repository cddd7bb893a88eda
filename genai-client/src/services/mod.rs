pub mod entitlement;
pub mod metrics;
pub mod poller;
pub mod prompts;
pub mod providers;
pub mod quota;
pub mod usage_store;

pub use entitlement::{EntitlementService, HttpEntitlementClient};
pub use poller::{OperationPoller, PollConfig, PollState};
pub use quota::{QuotaDecision, QuotaGate};
pub use usage_store::UsageRepository;
