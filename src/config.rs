use std::fs::File;
use std::io;
use std::os::unix::io::{FromRawFd, RawFd};

use argh::FromArgs;
use env_logger::{Builder, Env, Target};
use nix::fcntl::{self, FcntlArg};

pub const DEFAULT_PROMPT: &'static str = "myshell: ";
const LOG_FD_MIN: RawFd = 10;

#[derive(FromArgs, Debug)]
/// Interactive command interpreter with single-job foreground control.
pub struct Options {
	#[argh(option, short = 'c')]
	/// run one command line and exit with its status
	pub command: Option<String>,

	#[argh(option, default = "String::from(DEFAULT_PROMPT)")]
	/// text printed before each input line
	pub prompt: String,

	#[argh(switch, short = 'q')]
	/// do not print the welcome banner
	pub quiet: bool,
}

/// Logs go to a private copy of the startup stderr, so `2>` never captures them.
pub fn init_logging() -> io::Result<()> {
	let fd = fcntl::fcntl(libc::STDERR_FILENO, FcntlArg::F_DUPFD_CLOEXEC(LOG_FD_MIN))?;
	let sink = unsafe { File::from_raw_fd(fd) };
	Builder::from_env(Env::default().default_filter_or("warn"))
		.target(Target::Pipe(Box::new(sink)))
		.try_init()
		.map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
