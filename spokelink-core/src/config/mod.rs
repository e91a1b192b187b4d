pub mod loader;
pub mod model;


pub use loader::{get_config_path, load_config, load_config_from_path, parse_config};
pub use model::SpokeConfig;
