pub mod orchestrator;
pub mod sweeper;

pub use orchestrator::{
    OrderError, OrderItemRequest, OrderOrchestrator, OrderPolicy, PaymentRedirect, Resolution,
    WebhookResolution,
};
pub use sweeper::{ExpirySweeper, SweepReport, SweeperSettings};
