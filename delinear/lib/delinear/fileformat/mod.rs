mod loader;

pub use loader::{load_module, parse_module, ModuleLoader};
