//! Core data model: rules, messages, body parts, and removal records.

pub mod address;
pub mod message;
pub mod part;
pub mod rule;
