pub mod collector;
pub mod config;
pub mod fetch_error;
pub mod model;
pub mod parsers;
pub mod registry;
pub mod report;
pub mod retriever;
pub mod retry;
pub mod storage;
