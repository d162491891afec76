pub mod auth;
pub mod browse;
pub mod browse_cache;
pub mod catalog;
pub mod grouping;
pub mod moderation;
pub mod storage;
pub mod submission;
