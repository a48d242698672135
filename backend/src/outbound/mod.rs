//! Outbound adapters: PostgreSQL persistence, the durable job queue, and the
//! outbound email transport.

pub mod email;
pub mod persistence;
pub mod queue;
