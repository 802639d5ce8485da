//! kpeek - Kafka diagnostics
//!
//! Two commands built on a small direct-protocol Kafka client:
//! `check` verifies a broker answers and lists what it hosts, `drain` reads a
//! topic from the beginning and reports how each payload is encoded, using
//! [`kpeek_sniff`] for classification and decoding.

pub mod args;
pub mod check;
pub mod drain;
pub mod kafka_client;
pub mod report;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
