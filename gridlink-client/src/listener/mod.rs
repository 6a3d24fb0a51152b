//! Events published by the client: lifecycle transitions and membership
//! changes.

mod lifecycle;
mod membership;

pub use lifecycle::LifecycleEvent;
pub use membership::{Member, MemberEvent, MemberEventType};
