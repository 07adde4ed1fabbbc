//! Database models.
//!
//! These map directly to the schema. JSON columns are kept as strings here and
//! decoded by the helpers on each model.

pub mod job;
pub mod notification;
pub mod rule;
pub mod sync_state;
pub mod tag;
pub mod user;

pub use job::*;
pub use notification::*;
pub use rule::*;
pub use sync_state::*;
pub use tag::*;
pub use user::*;
