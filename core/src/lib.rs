pub mod clock;
pub mod csv_log;
pub mod db;
pub mod models;
pub mod recommend;
pub mod resolver;
pub mod selectors;
pub mod service;
pub mod store;
