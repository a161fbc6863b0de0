use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use nix::unistd::{self, AccessFlags};
use thiserror::Error;

const PATH_KEY: &'static str = "PATH";

#[derive(Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
	#[error("command not found: {0}")]
	NotFound(String),
}

/// Directories listed in `$PATH`, in order. An empty entry means the current directory.
pub fn search_path_from_env() -> Vec<PathBuf> {
	match env::var_os(PATH_KEY) {
		Some(value) => split_search_path(&value),
		None => vec![],
	}
}

pub fn split_search_path(value: &OsStr) -> Vec<PathBuf> {
	env::split_paths(value)
		.map(|p| if p.as_os_str().is_empty() { PathBuf::from(".") } else { p })
		.collect()
}

fn is_executable(path: &Path) -> bool {
	path.is_file() && unistd::access(path, AccessFlags::X_OK).is_ok()
}

/// Locates `name` in `search_path`. A name containing `/` is checked as given.
pub fn resolve(name: &str, search_path: &[PathBuf]) -> Result<PathBuf, ResolveError> {
	if name.is_empty() {
		return Err(ResolveError::NotFound(name.to_string()));
	}
	if name.contains('/') {
		let path = PathBuf::from(name);
		return if is_executable(&path) { Ok(path) } else { Err(ResolveError::NotFound(name.to_string())) };
	}
	search_path.iter()
		.map(|dir| dir.join(name))
		.find(|candidate| is_executable(candidate))
		.ok_or_else(|| ResolveError::NotFound(name.to_string()))
}
