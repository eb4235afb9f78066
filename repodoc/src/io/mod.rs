//! Side-effecting helpers: configuration, oracle backends, prompts, the seed
//! survey and output persistence.

pub mod config;
pub mod oracle;
pub mod persist;
pub mod process;
pub mod prompt;
pub mod seed;
