use std::path::PathBuf;

use crate::bookmark;
use crate::job;
use crate::path;

pub struct State {
	pub search_path: Vec<PathBuf>,
	pub job_tracker: job::JobTracker,
	pub bookmarks: bookmark::BookmarkStore,
	/// Set by `exit` once it is allowed to terminate.
	pub exit_status: Option<i32>,
	pub replaying_bookmark: bool,
}

impl State {
	pub fn new() -> State {
		State::with_search_path(path::search_path_from_env())
	}

	pub fn with_search_path(search_path: Vec<PathBuf>) -> State {
		State {
			search_path: search_path,
			job_tracker: job::JobTracker::new(),
			bookmarks: bookmark::BookmarkStore::new(),
			exit_status: None,
			replaying_bookmark: false,
		}
	}
}
