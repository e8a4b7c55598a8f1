//! Core data model: part addresses, part trees, envelopes and addresses.

pub mod address;
pub mod envelope;
pub mod part;
pub mod tree;
