//! Data models exchanged with the FMU settings API.
//!
//! These models match the server's JSON records for seamless interoperability.

mod cache;
mod lock;
mod project;
mod session;

pub use cache::*;
pub use lock::*;
pub use project::*;
pub use session::*;
