use std::ffi::{CStr, CString, NulError};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;

use crate::redirect::{self, OpenRedirect};
use crate::types::CommandLine;

/// Exit status of a child whose image could not be replaced.
pub const EXEC_FAILED: i32 = 126;

#[derive(Debug, Error)]
pub enum LaunchError {
	#[error("fork failed: {0}")]
	ForkFailed(nix::Error),
	#[error("argument contains a NUL byte")]
	Nul(#[from] NulError),
}

fn reset_signals() {
	let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
	for &sig in &[Signal::SIGTSTP, Signal::SIGINT] {
		let _ = unsafe { signal::sigaction(sig, &action) };
	}
}

fn child_fail(program: &str, what: &dyn std::fmt::Display) -> ! {
	let _ = writeln!(&mut io::stderr(), "myshell: {}: {}", program, what);
	unsafe { libc::_exit(EXEC_FAILED) }
}

fn exec_child(cmd: &CommandLine, path: &CStr, argv: &[CString], redirects: Vec<OpenRedirect>) -> ! {
	reset_signals();
	if cmd.is_background() {
		let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
	}
	for r in redirects {
		if let Err(e) = redirect::install(r) {
			child_fail(cmd.program(), &e);
		}
	}
	let e = match unistd::execv(path, argv) {
		Ok(never) => match never {},
		Err(e) => e,
	};
	child_fail(cmd.program(), &e)
}

/// Forks and execs `path` with the arguments of `cmd`. Does not wait.
///
/// `redirects` are bound inside the child only; the caller's streams are untouched.
pub fn launch(cmd: &CommandLine, path: &Path, redirects: Vec<OpenRedirect>) -> Result<Pid, LaunchError> {
	let path_c = CString::new(path.as_os_str().as_bytes())?;
	let argv: Result<Vec<CString>, NulError> = cmd.arguments().iter().map(|s| CString::new(s.as_bytes())).collect();
	let argv = argv?;

	match unsafe { unistd::fork() } {
		Err(e) => Err(LaunchError::ForkFailed(e)),
		Ok(ForkResult::Parent { child }) => {
			log::debug!("forked {} as pid {}", path.display(), child);
			Ok(child)
		},
		Ok(ForkResult::Child) => exec_child(cmd, &path_c, &argv, redirects),
	}
}
