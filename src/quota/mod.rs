pub mod enforcer;
pub mod policy;

pub use enforcer::{start_of_utc_day, QuotaEnforcer};
pub use policy::PlanLimits;
