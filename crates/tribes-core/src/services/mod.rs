//! Async services shared by every front end

mod list_service;
mod membership;

pub use list_service::ListService;
pub use membership::{MembershipProvider, StaticMembership};
