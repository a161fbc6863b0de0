use thiserror::Error;

use crate::builtin;
use crate::global;
use crate::job::{JobResult, State};
use crate::launch::{self, LaunchError};
use crate::parser;
use crate::path::{self, ResolveError};
use crate::redirect::{self, RedirectError};
use crate::types::CommandLine;

pub const STATUS_NOT_FOUND: u8 = 127;
pub const STATUS_SYNTAX: u8 = 2;

#[derive(Debug, Error)]
enum ExecError {
	#[error(transparent)]
	Resolve(#[from] ResolveError),
	#[error(transparent)]
	Redirect(#[from] RedirectError),
	#[error(transparent)]
	Launch(#[from] LaunchError),
	#[error("wait failed: {0}")]
	Wait(#[from] nix::Error),
}

impl ExecError {
	fn status(&self) -> u8 {
		match *self {
			ExecError::Resolve(_) => STATUS_NOT_FOUND,
			ExecError::Launch(_) => launch::EXEC_FAILED as u8,
			ExecError::Redirect(_) | ExecError::Wait(_) => 1,
		}
	}

	fn report(&self, program: &str) {
		match *self {
			ExecError::Resolve(ref e) => eprintln!("myshell: {}", e),
			ref e => eprintln!("myshell: {}: {}", program, e),
		}
	}
}

fn report(result: &JobResult) -> u8 {
	match result.state {
		State::Exited(0) => log::debug!("pid {} exited with status 0", result.pid),
		State::Exited(code) => eprintln!("myshell: {}: exited with status {}", result.program, code),
		State::Signaled(sig) => eprintln!("myshell: {}: terminated by signal {}", result.program, sig.as_str()),
		State::Stopped => println!("\n[{}] Stopped {}", result.pid, result.program),
		State::Running => {},
	}
	result.state.code()
}

/// Waits for the tracked foreground job and reports how it ended.
pub fn wait_and_report(state: &mut global::State) -> u8 {
	match state.job_tracker.wait_foreground() {
		Ok(result) => report(&result),
		Err(e) => {
			eprintln!("myshell: wait failed: {}", e);
			1
		},
	}
}

/// Prints background and suspended jobs that finished since the last check.
pub fn report_finished(state: &mut global::State) {
	for result in state.job_tracker.reap_background_nonblocking() {
		match result.state {
			State::Exited(0) => println!("[{}] Done {}", result.pid, result.program),
			State::Exited(code) => println!("[{}] Exit {} {}", result.pid, code, result.program),
			State::Signaled(sig) => println!("[{}] Killed ({}) {}", result.pid, sig.as_str(), result.program),
			State::Running | State::Stopped => {},
		}
	}
}

fn run_background(state: &mut global::State, cmd: &CommandLine, exe: &std::path::Path) -> Result<u8, ExecError> {
	let redirects = redirect::open_all(cmd.redirects())?;
	let pid = launch::launch(cmd, exe, redirects)?;
	state.job_tracker.register_background(pid, cmd.program());
	println!("[{}]", pid);
	Ok(0)
}

fn run_foreground(state: &mut global::State, cmd: &CommandLine, exe: &std::path::Path) -> Result<u8, ExecError> {
	let saved = redirect::apply(cmd.redirects())?;
	let pid = launch::launch(cmd, exe, vec![])?;
	state.job_tracker.track_foreground(pid, cmd.program());
	let result = state.job_tracker.wait_foreground();
	saved.restore()?;
	Ok(report(&result?))
}

fn run_external(state: &mut global::State, cmd: &CommandLine) -> Result<u8, ExecError> {
	let exe = path::resolve(cmd.program(), &state.search_path)?;
	log::debug!("{} resolved to {}", cmd.program(), exe.display());
	if cmd.is_background() {
		run_background(state, cmd, &exe)
	} else {
		run_foreground(state, cmd, &exe)
	}
}

/// Runs one command line: a builtin in-process, anything else as a child process.
pub fn dispatch(state: &mut global::State, cmd: &CommandLine) -> u8 {
	if let Some(builtin) = builtin::match_builtin(cmd.program()) {
		if !cmd.redirects().is_empty() || cmd.is_background() {
			log::warn!("{}: builtins ignore redirection and `&'", cmd.program());
		}
		return builtin(state, &cmd.arguments()[1..]);
	}
	match run_external(state, cmd) {
		Ok(status) => status,
		Err(e) => {
			e.report(cmd.program());
			e.status()
		},
	}
}

/// Tokenizes and dispatches a raw input line. Blank lines succeed without doing anything.
pub fn eval_line(state: &mut global::State, line: &str) -> u8 {
	match parser::parse(line) {
		Ok(Some(cmd)) => dispatch(state, &cmd),
		Ok(None) => 0,
		Err(e) => {
			eprintln!("myshell: {}", e);
			STATUS_SYNTAX
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::{self, File};
	use std::mem::ManuallyDrop;
	use std::os::unix::fs::MetadataExt;
	use std::os::unix::io::FromRawFd;
	use std::thread;
	use std::time::Duration;

	use serial_test::serial;

	fn identities() -> Vec<(u64, u64)> {
		(0..3).map(|fd| {
			let f = ManuallyDrop::new(unsafe { File::from_raw_fd(fd) });
			let meta = f.metadata().unwrap();
			(meta.dev(), meta.ino())
		}).collect()
	}

	fn state() -> global::State {
		global::State::new()
	}

	fn settle(state: &mut global::State) {
		for _ in 0..100 {
			report_finished(state);
			if !state.job_tracker.has_outstanding() { return; }
			thread::sleep(Duration::from_millis(20));
		}
		panic!("background jobs did not finish");
	}

	#[test]
	#[serial]
	fn redirected_output_lands_in_file() {
		let dir = tempfile::tempdir().unwrap();
		let out = dir.path().join("out.txt");
		let mut state = state();
		let before = identities();
		let status = eval_line(&mut state, &format!("echo hi > {}", out.display()));
		assert_eq!(status, 0);
		assert_eq!(identities(), before);
		assert!(fs::read_to_string(&out).unwrap().contains("hi\n"));
		assert_eq!(state.job_tracker.foreground(), None);
	}

	#[test]
	#[serial]
	fn plain_command_leaves_streams_alone() {
		let mut state = state();
		let before = identities();
		assert_eq!(eval_line(&mut state, "true"), 0);
		assert_eq!(eval_line(&mut state, "false"), 1);
		assert_eq!(identities(), before);
	}

	#[test]
	#[serial]
	fn unknown_command_spawns_nothing() {
		let mut state = state();
		assert_eq!(eval_line(&mut state, "badcommand123"), STATUS_NOT_FOUND);
		assert_eq!(state.job_tracker.foreground(), None);
		assert!(!state.job_tracker.has_outstanding());
	}

	#[test]
	#[serial]
	fn syntax_errors_spawn_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let out = dir.path().join("never.txt");
		let mut state = state();
		assert_eq!(eval_line(&mut state, &format!("touch {}&", out.display())), STATUS_SYNTAX);
		assert!(!out.exists());
		assert!(!state.job_tracker.has_outstanding());
	}

	#[test]
	#[serial]
	fn missing_input_aborts_command() {
		let dir = tempfile::tempdir().unwrap();
		let marker = dir.path().join("marker");
		let mut state = state();
		let before = identities();
		let line = format!("touch {} < {}", marker.display(), dir.path().join("missing").display());
		assert_eq!(eval_line(&mut state, &line), 1);
		assert!(!marker.exists());
		assert_eq!(identities(), before);
	}

	#[test]
	#[serial]
	fn background_job_and_exit_refusal() {
		let mut state = state();
		let before = identities();
		assert_eq!(eval_line(&mut state, "sleep 30 &"), 0);
		assert_eq!(identities(), before);
		assert_eq!(state.job_tracker.foreground(), None);
		let pid = state.job_tracker.outstanding().next().unwrap().pid;

		assert_eq!(eval_line(&mut state, "exit"), 1);
		assert_eq!(state.exit_status, None);

		nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL).unwrap();
		settle(&mut state);
		assert_eq!(eval_line(&mut state, "exit"), 0);
		assert_eq!(state.exit_status, Some(0));
	}

	#[test]
	#[serial]
	fn background_redirection_is_done_by_the_child() {
		let dir = tempfile::tempdir().unwrap();
		let out = dir.path().join("bg.txt");
		let mut state = state();
		let before = identities();
		assert_eq!(eval_line(&mut state, &format!("echo bg > {} &", out.display())), 0);
		assert_eq!(identities(), before);
		settle(&mut state);
		assert_eq!(fs::read_to_string(&out).unwrap(), "bg\n");
	}

	#[test]
	#[serial]
	fn bookmark_replays_through_dispatcher() {
		let dir = tempfile::tempdir().unwrap();
		let out = dir.path().join("mark.txt");
		let mut state = state();
		assert_eq!(eval_line(&mut state, &format!("bookmark \"echo marked > {}\"", out.display())), 0);
		assert_eq!(eval_line(&mut state, "bookmark add false"), 0);
		assert_eq!(eval_line(&mut state, "bookmark -i 0"), 0);
		assert!(fs::read_to_string(&out).unwrap().contains("marked\n"));
		assert_eq!(eval_line(&mut state, "bookmark -i 1"), 1);
	}

	#[test]
	#[serial]
	fn bookmark_cannot_replay_itself() {
		let mut state = state();
		assert_eq!(eval_line(&mut state, "bookmark \"bookmark -i 0\""), 0);
		assert_eq!(eval_line(&mut state, "bookmark -i 0"), 1);
		assert!(!state.replaying_bookmark);
	}
}
