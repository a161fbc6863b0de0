use thiserror::Error;

pub const CAPACITY: usize = 10;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum BookmarkError {
	#[error("bookmark list is full")]
	Full,
	#[error("nothing to bookmark")]
	Empty,
	#[error("invalid bookmark index")]
	NotFound,
}

/// Saved command lines, addressed by position. Deleting shifts later entries down.
#[derive(Debug, Default)]
pub struct BookmarkStore {
	entries: Vec<String>,
}

impl BookmarkStore {
	pub fn new() -> BookmarkStore {
		BookmarkStore::default()
	}

	pub fn add(&mut self, text: &str) -> Result<usize, BookmarkError> {
		let text = text.trim();
		if text.is_empty() {
			return Err(BookmarkError::Empty);
		}
		if self.entries.len() >= CAPACITY {
			return Err(BookmarkError::Full);
		}
		self.entries.push(text.to_string());
		Ok(self.entries.len() - 1)
	}

	pub fn list(&self) -> impl Iterator<Item = (usize, &str)> {
		self.entries.iter().map(|s| s.as_str()).enumerate()
	}

	pub fn get(&self, index: usize) -> Result<&str, BookmarkError> {
		self.entries.get(index).map(|s| s.as_str()).ok_or(BookmarkError::NotFound)
	}

	pub fn delete(&mut self, index: usize) -> Result<String, BookmarkError> {
		if index < self.entries.len() {
			Ok(self.entries.remove(index))
		} else {
			Err(BookmarkError::NotFound)
		}
	}
}
