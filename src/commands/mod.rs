mod conflicts;
mod envs;
mod init;
mod monitor;
mod resolve;
mod status;
mod switch;
mod validate;

pub use conflicts::run_conflicts;
pub use envs::run_envs;
pub use init::run_init;
pub use monitor::run_monitor;
pub use resolve::run_resolve;
pub use status::run_status;
pub use switch::run_switch;
pub use validate::run_validate;
