pub mod admin;
pub mod fetch_latest;
pub mod handle_item;
pub mod run_tick;
pub mod scheduler;

pub use admin::AdminUseCase;
pub use fetch_latest::RetryingFetcher;
pub use handle_item::{HandleItemUseCase, ItemOutcome};
pub use run_tick::{RunTickUseCase, TickReport};
pub use scheduler::{PollScheduler, SchedulerState};
