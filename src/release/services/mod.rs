//! Application services for release mutation and dependency reconciliation.

mod controller;
mod guard;
mod release;
mod resync;
mod state_cache;

pub use controller::{ControllerError, ControllerResult, DependencyReconciliationController};
pub use guard::{BUSY_MESSAGE_PREFIX, GuardError, GuardResult, ReleaseMutationGuard};
pub use release::{
    ReleaseReloader, ReleaseService, ReleaseServiceError, ReleaseServiceResult,
};
pub use resync::{ResyncError, ResyncReport, ResyncResult, ResyncService};
pub use state_cache::{StateCache, StateCacheError, StateCacheResult};
