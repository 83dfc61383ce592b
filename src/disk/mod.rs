pub mod assemble;
pub mod builder;
mod cli;
pub mod commands;
pub mod constants;
pub mod convert;
pub mod deploy;
pub mod error;
pub mod gpt;
pub mod layout;
pub mod release;
pub mod rootfs;
pub mod stage;
pub mod staging;
pub mod types;
pub mod utils;

pub use builder::{BuildOutput, RawImageBuilder};
pub use cli::DiskAction;
pub use commands::run;
pub use error::{ImageError, Phase};
