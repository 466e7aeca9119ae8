mod constants;
mod defaults;
mod env;
mod file;
mod load;
mod paths;
mod types;
mod util;

pub use types::{AgentConfig, IngestConfig};

#[cfg(test)]
use util::parse_bool;

#[cfg(test)]
mod tests;
