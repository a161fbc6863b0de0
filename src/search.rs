use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

const SOURCE_EXTENSIONS: &'static [&'static str] = &["c", "C", "h", "H"];

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Match {
	pub path: PathBuf,
	pub line_number: usize,
	pub line: String,
}

#[derive(Debug, Error)]
#[error("{}: {source}", .path.display())]
pub struct SearchError {
	pub path: PathBuf,
	#[source]
	pub source: io::Error,
}

struct OpenFile {
	path: PathBuf,
	reader: BufReader<File>,
	line_number: usize,
}

/// Lazy walk over source files yielding every line that contains the needle.
///
/// Errors are yielded per entry; the walk carries on after them.
pub struct Search {
	needle: String,
	recursive: bool,
	pending: Vec<PathBuf>,
	entries: Option<(PathBuf, fs::ReadDir)>,
	file: Option<OpenFile>,
}

pub fn is_source_file(path: &Path) -> bool {
	path.extension().and_then(OsStr::to_str).map_or(false, |ext| SOURCE_EXTENSIONS.contains(&ext))
}

pub fn search(start_dir: &Path, needle: &str, recursive: bool) -> Search {
	Search {
		needle: needle.to_string(),
		recursive: recursive,
		pending: vec![start_dir.to_path_buf()],
		entries: None,
		file: None,
	}
}

impl Search {
	fn next_line(&mut self) -> Option<Result<Match, SearchError>> {
		let file = self.file.as_mut()?;
		let mut buf = vec![];
		loop {
			buf.clear();
			match file.reader.read_until(b'\n', &mut buf) {
				Ok(0) => break,
				Ok(_) => {
					file.line_number += 1;
					let line = String::from_utf8_lossy(&buf);
					if line.contains(self.needle.as_str()) {
						let line = line.trim_end_matches(&['\n', '\r'][..]).to_string();
						return Some(Ok(Match { path: file.path.clone(), line_number: file.line_number, line: line }));
					}
				},
				Err(e) => {
					let path = file.path.clone();
					self.file = None;
					return Some(Err(SearchError { path: path, source: e }));
				},
			}
		}
		self.file = None;
		None
	}

	fn next_entry(&mut self) -> Option<Result<(), SearchError>> {
		let (dir, entries) = self.entries.as_mut()?;
		let entry = match entries.next() {
			Some(Ok(entry)) => entry,
			Some(Err(e)) => return Some(Err(SearchError { path: dir.clone(), source: e })),
			None => {
				self.entries = None;
				return None;
			},
		};
		let path = entry.path();
		let file_type = match entry.file_type() {
			Ok(t) => t,
			Err(e) => return Some(Err(SearchError { path: path, source: e })),
		};
		if file_type.is_dir() {
			if self.recursive {
				self.pending.push(path);
			}
		} else if file_type.is_file() && is_source_file(&path) {
			match File::open(&path) {
				Ok(f) => self.file = Some(OpenFile { path: path, reader: BufReader::new(f), line_number: 0 }),
				Err(e) => return Some(Err(SearchError { path: path, source: e })),
			}
		}
		Some(Ok(()))
	}
}

impl Iterator for Search {
	type Item = Result<Match, SearchError>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			if self.file.is_some() {
				if let Some(r) = self.next_line() {
					return Some(r);
				}
				continue;
			}
			if self.entries.is_some() {
				match self.next_entry() {
					Some(Err(e)) => return Some(Err(e)),
					_ => continue,
				}
			}
			let dir = self.pending.pop()?;
			match fs::read_dir(&dir) {
				Ok(entries) => self.entries = Some((dir, entries)),
				Err(e) => return Some(Err(SearchError { path: dir, source: e })),
			}
		}
	}
}
