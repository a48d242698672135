//! Availability scheduling core: magic-link tokens, weekly prompts,
//! overlap-based meeting suggestions, and the job orchestration that drives
//! a prompt from creation through reminders to its deadline.

pub mod domain;
pub mod inbound;
pub mod outbound;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
