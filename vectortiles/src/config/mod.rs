//! Configuration file loading and resolution into renderable layers.

mod env;
pub use env::{Env, FauxEnv, OsEnv};

mod error;
pub use error::{ConfigFileError, ConfigFileResult};

mod file;
pub use file::*;

mod resolve;
pub use resolve::TileService;
