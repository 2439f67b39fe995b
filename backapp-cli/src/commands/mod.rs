mod browse;
mod check;
mod history;
mod run;
mod serve;

pub use browse::{browse_local, browse_server, test_connection};
pub use check::run_check;
pub use history::{delete_run, list_files, list_runs, show_logs};
pub use run::run_backup;
pub use serve::run_serve;
