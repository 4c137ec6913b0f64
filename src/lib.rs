//! Contract triage — decision pipeline for school-contract email.
//!
//! Each inbound message is extracted, classified (category, priority,
//! sentiment), associated with a registry contract, and routed to exactly
//! one department — idempotently, even under mailbox redelivery.

pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod mailbox;
pub mod matching;
pub mod message;
pub mod pipeline;
pub mod routing;
pub mod store;
