pub mod parser;
pub mod types;

pub use parser::{Parser, CONFIG_FILE_NAME};
pub use types::{Environment, IsolationLevel, PortRange, Registry};
