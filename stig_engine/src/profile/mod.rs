//! Control profile discovery and loading

pub mod error;
pub mod loader;

pub use error::ProfileError;
pub use loader::{
    discover_control_files, load_control_file, load_profile, Profile, ProfileMetadata,
    ATTRIBUTES_FILE, CONTROLS_DIR, FIXTURES_DIR, METADATA_FILE,
};
