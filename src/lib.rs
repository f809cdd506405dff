//! TokenWatch - token price alert monitor
//!
//! Subscribers track on-chain token addresses with a percentage threshold;
//! a periodic sweep resolves current quotes through a TTL-bounded durable
//! cache and pushes an alert whenever the price moves past the threshold
//! relative to the last-alerted baseline.
//!
//! The conversational front end and the delivery channel are external
//! collaborators: the former drives [`modules::CommandService`], the latter
//! implements [`utils::Notifier`].

pub mod config;
pub mod error;
pub mod modules;
pub mod utils;
