//! Domain models for Podium.
//!
//! # Core Concepts
//!
//! ## Permanent Entities
//!
//! - [`Project`]: A hackathon entry that judges are routed to. Carries a
//!   `seen` counter (how many times it has been assigned) and the `active` /
//!   `prioritized` flags that drive assignment.
//! - [`Judge`]: A judging account. Holds at most one in-progress assignment
//!   (`current`), the append-only log of completed judgements
//!   (`seen_projects`), and the batch-ranking ballot history.
//! - [`Flag`]: Audit entry written whenever a judge skips a project or takes
//!   a break.
//!
//! ## Configuration
//!
//! - [`Options`]: Global event configuration (minimum views, batch ranking
//!   size, judging-ended gate, scoring categories). A single row, created
//!   lazily with defaults on first read.

mod flag;
mod judge;
mod options;
mod project;

pub use flag::*;
pub use judge::*;
pub use options::*;
pub use project::*;
