mod config_cmd;
mod gc;
mod list;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use gc::GcCommand;
pub use list::ListCommand;
pub use sync_cmd::SyncCommand;
