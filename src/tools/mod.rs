pub mod provisioner;
pub mod search_path;

pub use provisioner::{ensure_tool, ToolInstall, ToolProvisioner};
pub use search_path::{prepend_search_dir, search_path_with};
