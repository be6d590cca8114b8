//! Roster escalation — pool aggregation, staffing policy, coordination
//!
//! ## Flow
//!
//! ```text
//! EscalationRequest ─► PoolDirectory ─► Paginator (reserve pool)
//!                                          │
//!                                          ▼
//!                     SeverityPolicy (first round(N * f) members)
//!                                          │
//!                                          ▼
//!                     RosterPlatform::add_queue_members (additive only)
//! ```

pub mod escalation;
pub mod pagination;
pub mod policy;

pub use escalation::{EscalationCoordinator, EscalationError, EscalationOutcome, PoolDirectory};
pub use pagination::{AggregateError, PageItem, Paginator};
pub use policy::{proportional_count, PolicyError, SeverityPolicy};
