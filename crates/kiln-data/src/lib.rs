pub mod loader;
pub mod preset_file;
pub mod schema;

pub use loader::{AssetSetup, DataLoadError, load_asset_manifest, load_asset_setup};
pub use preset_file::{read_preset_file, write_preset_file};
