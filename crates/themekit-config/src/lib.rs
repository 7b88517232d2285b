pub mod dev;
pub mod discovery;
pub mod error;
pub mod theme;

pub use dev::*;
pub use discovery::{CONFIG_FILE_NAME, ConfigDiscovery, DEFAULT_ENV_PREFIX};
pub use error::*;
pub use theme::{MANIFEST_FILE_NAME, ThemeRoot};
