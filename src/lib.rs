pub mod api;
pub mod config;
pub mod db;
pub mod lock;
pub mod notify;
pub mod payout;
pub mod processor;
