use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{IntoRawFd, RawFd};

use nix::fcntl::{self, FcntlArg};
use nix::unistd;
use thiserror::Error;

use crate::types::{Redirect, RedirectType};

const CREATE_MODE: u32 = 0o644;
const STREAMS: [RawFd; 3] = [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO];
// Saved copies live above the range a child would inherit by convention.
const SAVED_FD_MIN: RawFd = 10;

#[derive(Debug, Error)]
pub enum RedirectError {
	#[error("{path}: {source}")]
	Open { path: String, #[source] source: io::Error },
	#[error("cannot rebind standard stream: {0}")]
	Dup(#[from] nix::Error),
}

/// A redirection target opened but not yet bound to its stream.
#[derive(Debug)]
pub struct OpenRedirect {
	pub typ: RedirectType,
	pub file: File,
}

fn flush_std() {
	let _ = io::stdout().flush();
	let _ = io::stderr().flush();
}

pub fn open(redirect: &Redirect) -> Result<OpenRedirect, RedirectError> {
	let mut oopt = OpenOptions::new();
	let _ = match redirect.typ {
		RedirectType::Input => oopt.read(true),
		RedirectType::Output | RedirectType::Error => oopt.write(true).create(true).truncate(true),
		RedirectType::Append => oopt.append(true).create(true),
	};
	oopt.mode(CREATE_MODE);
	let file = oopt.open(&redirect.target).map_err(|e| RedirectError::Open { path: redirect.target.clone(), source: e })?;
	Ok(OpenRedirect { typ: redirect.typ, file: file })
}

/// Opens every target in order, failing on the first one that cannot be opened.
pub fn open_all(redirects: &[Redirect]) -> Result<Vec<OpenRedirect>, RedirectError> {
	redirects.iter().map(open).collect()
}

/// Binds an opened target to its standard stream, closing the original descriptor.
pub fn install(redirect: OpenRedirect) -> nix::Result<()> {
	let target = redirect.typ.target_fd();
	let fd = redirect.file.into_raw_fd();
	if fd != target {
		unistd::dup2(fd, target)?;
		unistd::close(fd)?;
	}
	Ok(())
}

/// Duplicates of the three standard streams taken before any redirection.
///
/// Dropping restores the originals; `restore` does the same and reports errors.
#[derive(Debug)]
pub struct SavedStreams {
	fds: [RawFd; 3],
	restored: bool,
}

impl SavedStreams {
	fn capture() -> Result<SavedStreams, RedirectError> {
		flush_std();
		let mut saved = SavedStreams { fds: [-1; 3], restored: false };
		for (slot, &fd) in saved.fds.iter_mut().zip(STREAMS.iter()) {
			*slot = fcntl::fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(SAVED_FD_MIN))?;
		}
		Ok(saved)
	}

	pub fn restore(mut self) -> Result<(), RedirectError> {
		self.put_back()
	}

	fn put_back(&mut self) -> Result<(), RedirectError> {
		if self.restored {
			return Ok(());
		}
		self.restored = true;
		flush_std();
		let mut result = Ok(());
		for (&saved, &fd) in self.fds.iter().zip(STREAMS.iter()) {
			if saved < 0 {
				continue;
			}
			if let Err(e) = unistd::dup2(saved, fd) {
				if result.is_ok() { result = Err(RedirectError::Dup(e)); }
			}
			let _ = unistd::close(saved);
		}
		result
	}
}

impl Drop for SavedStreams {
	fn drop(&mut self) {
		if let Err(e) = self.put_back() {
			log::error!("failed to restore standard streams: {}", e);
		}
	}
}

/// Saves the standard streams, then applies `redirects` left to right.
///
/// Later redirects for the same stream override earlier ones. On error the streams
/// are already restored when this returns.
pub fn apply(redirects: &[Redirect]) -> Result<SavedStreams, RedirectError> {
	let saved = SavedStreams::capture()?;
	for r in redirects {
		let opened = open(r)?;
		install(opened)?;
		log::debug!("redirected fd {} {} {}", r.typ.target_fd(), r.typ.operator(), r.target);
	}
	Ok(saved)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use std::mem::ManuallyDrop;
	use std::os::unix::fs::MetadataExt;
	use std::os::unix::io::FromRawFd;

	use serial_test::serial;

	fn borrow_fd(fd: RawFd) -> ManuallyDrop<File> {
		ManuallyDrop::new(unsafe { File::from_raw_fd(fd) })
	}

	fn identity(fd: RawFd) -> (u64, u64) {
		let meta = borrow_fd(fd).metadata().unwrap();
		(meta.dev(), meta.ino())
	}

	fn identities() -> Vec<(u64, u64)> {
		STREAMS.iter().map(|&fd| identity(fd)).collect()
	}

	fn redirect_to(typ: RedirectType, path: &std::path::Path) -> Redirect {
		Redirect { typ: typ, target: path.to_str().unwrap().to_string() }
	}

	#[test]
	#[serial]
	fn empty_apply_round_trips() {
		let before = identities();
		let saved = apply(&[]).unwrap();
		assert_eq!(identities(), before);
		saved.restore().unwrap();
		assert_eq!(identities(), before);
	}

	#[test]
	#[serial]
	fn error_stream_goes_to_file_and_comes_back() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("err.txt");
		let before = identities();
		let saved = apply(&[redirect_to(RedirectType::Error, &path)]).unwrap();
		assert_ne!(identity(2), before[2]);
		assert_eq!(identity(1), before[1]);
		borrow_fd(2).write_all(b"oops\n").unwrap();
		saved.restore().unwrap();
		assert_eq!(identities(), before);
		assert_eq!(fs::read_to_string(&path).unwrap(), "oops\n");
	}

	#[test]
	#[serial]
	fn append_keeps_existing_content() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("log.txt");
		fs::write(&path, "one\n").unwrap();
		let before = identities();
		{
			let _saved = apply(&[redirect_to(RedirectType::Append, &path)]).unwrap();
			let meta = borrow_fd(1).metadata().unwrap();
			assert_eq!((meta.dev(), meta.ino()), {
				let m = fs::metadata(&path).unwrap();
				(m.dev(), m.ino())
			});
		}
		assert_eq!(identities(), before);
		assert!(fs::read_to_string(&path).unwrap().starts_with("one\n"));
	}

	#[test]
	#[serial]
	fn later_spec_for_same_stream_wins() {
		let dir = tempfile::tempdir().unwrap();
		let first = dir.path().join("first.txt");
		let second = dir.path().join("second.txt");
		let before = identities();
		let saved = apply(&[redirect_to(RedirectType::Output, &first), redirect_to(RedirectType::Output, &second)]).unwrap();
		let m = fs::metadata(&second).unwrap();
		assert_eq!(identity(1), (m.dev(), m.ino()));
		saved.restore().unwrap();
		assert_eq!(identities(), before);
		assert!(first.exists());
	}

	#[test]
	#[serial]
	fn missing_input_fails_and_restores() {
		let dir = tempfile::tempdir().unwrap();
		let out = dir.path().join("out.txt");
		let missing = dir.path().join("missing.txt");
		let before = identities();
		let r = apply(&[redirect_to(RedirectType::Output, &out), redirect_to(RedirectType::Input, &missing)]);
		match r {
			Err(RedirectError::Open { path, .. }) => assert!(path.ends_with("missing.txt")),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(identities(), before);
	}

	#[test]
	#[serial]
	fn input_redirect_reads_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("in.txt");
		fs::write(&path, "data").unwrap();
		let saved = apply(&[redirect_to(RedirectType::Input, &path)]).unwrap();
		let mut buf = String::new();
		io::Read::read_to_string(&mut *borrow_fd(0), &mut buf).unwrap();
		saved.restore().unwrap();
		assert_eq!(buf, "data");
	}
}
