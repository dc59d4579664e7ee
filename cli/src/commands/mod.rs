//! CLI command implementations.
//!
//! - `up`: apply pending migration files forward
//! - `down`: revert one applied migration
//! - `status`: ledger and pending-set listing
//! - `plan`: preview SQL without executing
//! - `create`: scaffold a new migration file pair
//! - `sync`: reconcile declared schema against the live database
//! - `hash`: print the schema hash migrations pin themselves to

mod create;
mod down;
mod hash;
mod plan;
mod status;
mod sync;
mod up;

pub use create::migrate_create;
pub use down::migrate_down;
pub use hash::hash;
pub use plan::plan;
pub use status::migrate_status;
pub use sync::sync;
pub use up::migrate_up;
