mod checks;
mod commands;
mod down;
mod info;
mod run;
mod status;
mod up;
mod utils;

pub use checks::run_checks;
pub use commands::{Cli, Commands, OutputFormat};
pub use down::bring_down;
pub use info::show_version;
pub use run::run_watchdog;
pub use status::show_status;
pub use up::bring_up;
pub use utils::{init_logging, InterfaceOverrides};
