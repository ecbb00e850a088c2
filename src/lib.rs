//! Podium: a hackathon judging server.
//!
//! Judges are shown projects one at a time, score them, and periodically
//! submit batch rankings; admins export a final ordering. The interesting
//! part lives in [`judging`] (fair assignment under mutual-exclusion and
//! coverage constraints, steered by a pairwise comparison matrix) and
//! [`ranking`] (Borda and Copeland aggregation of the partial ballots).
//! [`db`] is the SQLite store everything persists through and [`api`] is
//! the thin HTTP surface over it all.

pub mod api;
pub mod db;
pub mod judging;
pub mod models;
pub mod ranking;
