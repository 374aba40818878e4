pub mod manifest;
pub mod parsed;
pub mod version_file;

pub use manifest::{
    MojangVersionProvider, ResilientVersionProvider, StaticVersionProvider, VersionEntry,
    VersionProvider,
};
pub use parsed::ParsedVersion;
pub use version_file::VersionJson;
