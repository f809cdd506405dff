//! Utility modules

pub mod alerts;
pub mod database;
pub mod logger;

pub use alerts::{Notifier, TelegramNotifier};
pub use database::DatabaseService;
pub use logger::init_logger;
