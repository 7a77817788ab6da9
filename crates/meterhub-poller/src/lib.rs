//! Fleet polling: credential resolution across storage generations and
//! the bounded concurrent fan-out over enrolled tenants.

pub mod poller;
pub mod resolver;
