pub mod app_config;
pub mod ledger;

pub use app_config::Config;
pub use ledger::Ledger;
