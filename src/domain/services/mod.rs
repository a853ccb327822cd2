pub mod adapter;
pub mod blacklist;
pub mod cache;
pub mod dispatch;
pub mod event_admin;
pub mod filter;
pub mod handler_resolver;
pub mod registry;
pub mod security;
pub mod topic;
pub mod worker_pool;
