pub mod execute;
pub mod install;
pub mod plan;
pub mod scan;

pub use execute::{execute_plan, SyncFailure, SyncOperationKind, SyncOptions, SyncReport};
pub use install::{Installer, WheelInstaller};
pub use plan::{build_plan, SyncPlan};
pub use scan::{scan_installed, InstalledRecord};
