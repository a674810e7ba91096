pub mod aggregator;
pub mod background_workers;
pub mod catalog;
pub mod catalog_handlers;
pub mod condition_log;
pub mod handler_utils;
pub mod physical_restore;
pub mod pitr;
pub mod resync;
pub mod store;
pub mod types;
