//! Activity logging: JSONL writer plus the non-blocking logger thread.

pub mod activity;
pub mod jsonl;
