pub mod manifest;
pub mod snapshot;

pub use manifest::{ManifestAddReport, ManifestEditor, ManifestRemoveReport};
pub use snapshot::{current_project_root, discover_project_root, ProjectSnapshot};
