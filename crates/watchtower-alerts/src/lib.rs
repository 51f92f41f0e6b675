//! # Watchtower Alerts - The Alert Governor
//!
//! A family of per-subject state machines between the aggregators and the
//! notification sink. The governor decides whether an observation warrants
//! an outbound notification:
//!
//! - rate-threshold hysteresis with a minimum drop step and a cooldown,
//! - consecutive-miss criticals for validators,
//! - recent-miss criticals and recoveries for finality providers,
//! - per-validator and aggregate rules for BLS checkpoints,
//! - jailed/active transitions, always delivered, no cooldown.
//!
//! State is process-local and lost on restart. Delivery is at-most-once:
//! state advances before the sink is invoked and a sink failure drops the
//! alert.

pub mod config;
pub mod error;
pub mod governor;
pub mod state;

pub use config::AlertPolicy;
pub use error::{AlertError, AlertResult};
pub use governor::{AlertGovernor, JailedSubject};
pub use state::AlertState;
