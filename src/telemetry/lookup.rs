use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Finds tracing tools on the command search path.
#[derive(Debug, Clone, Default)]
pub struct ToolLookup {
    search_path: Vec<PathBuf>,
}

pub(crate) fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

impl ToolLookup {
    /// Search the directories of the `PATH` environment variable, as read now.
    pub fn from_env() -> Self {
        let search_path = env::var_os("PATH")
            .map(|path| env::split_paths(&path).collect())
            .unwrap_or_default();
        ToolLookup { search_path }
    }

    pub fn new(search_path: Vec<PathBuf>) -> Self {
        ToolLookup { search_path }
    }

    /// First executable named `tool` in the search path.
    pub fn find(&self, tool: &str) -> Option<PathBuf> {
        self.search_path
            .iter()
            .map(|dir| dir.join(tool))
            .find(|candidate| is_executable(candidate))
    }
}
