pub mod admin_guard;
pub mod caller;

pub use admin_guard::admin_guard;
pub use caller::{caller_role, require_role, Caller, CallerSource};
