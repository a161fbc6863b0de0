use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

// State the stop-signal handler may touch. Zero means no foreground job.
static FOREGROUND_PID: AtomicI32 = AtomicI32::new(0);
static FOREGROUND_STOPPED: AtomicBool = AtomicBool::new(false);
static STRAY_STOPS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State { Running, Stopped, Exited(i32), Signaled(Signal) }

impl State {
	pub fn is_terminated(self) -> bool {
		match self {
			State::Exited(..) | State::Signaled(..) => true,
			State::Running | State::Stopped => false,
		}
	}

	/// Shell-style status: the exit code, or 128 plus the signal number.
	pub fn code(self) -> u8 {
		match self {
			State::Exited(code) => code as u8,
			State::Signaled(sig) => 128u8.wrapping_add(sig as u8),
			State::Stopped => 128u8.wrapping_add(Signal::SIGTSTP as u8),
			State::Running => 0,
		}
	}
}

trait WaitStatusExt {
	fn state(self) -> State;
}

impl WaitStatusExt for WaitStatus {
	fn state(self) -> State {
		match self {
			WaitStatus::Exited(_, code) => State::Exited(code),
			WaitStatus::Signaled(_, sig, _) => State::Signaled(sig),
			WaitStatus::Stopped(..) => State::Stopped,
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceEvent(..) | WaitStatus::PtraceSyscall(..) => State::Stopped,
			WaitStatus::Continued(..) => State::Running,
			WaitStatus::StillAlive => State::Running,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Job {
	pub pid: Pid,
	pub program: String,
	pub state: State,
	pub is_background: bool,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct JobResult {
	pub pid: Pid,
	pub program: String,
	pub state: State,
}

impl From<Job> for JobResult {
	fn from(job: Job) -> JobResult {
		JobResult { pid: job.pid, program: job.program, state: job.state }
	}
}

/// Runs in signal context: only atomics and `kill(2)`.
pub fn deliver_stop() {
	let pid = FOREGROUND_PID.load(Ordering::SeqCst);
	if pid > 0 {
		let _ = signal::kill(Pid::from_raw(pid), Signal::SIGTSTP);
		FOREGROUND_STOPPED.store(true, Ordering::SeqCst);
	} else {
		STRAY_STOPS.fetch_add(1, Ordering::SeqCst);
	}
}

/// Stop signals that arrived while nothing was in the foreground since the last call.
pub fn take_stray_stops() -> usize {
	STRAY_STOPS.swap(0, Ordering::SeqCst)
}

extern "C" fn handle_stop(_: libc::c_int) {
	deliver_stop();
}

extern "C" fn handle_interrupt(_: libc::c_int) {}

/// Catches the stop signal for the foreground job and keeps the interpreter alive on interrupt.
pub fn install_handlers() -> nix::Result<()> {
	let stop = SigAction::new(SigHandler::Handler(handle_stop), SaFlags::SA_RESTART, SigSet::empty());
	let interrupt = SigAction::new(SigHandler::Handler(handle_interrupt), SaFlags::SA_RESTART, SigSet::empty());
	unsafe {
		signal::sigaction(Signal::SIGTSTP, &stop)?;
		signal::sigaction(Signal::SIGINT, &interrupt)?;
	}
	Ok(())
}

/// Single foreground slot plus the jobs that are still outstanding.
#[derive(Debug, Default)]
pub struct JobTracker {
	foreground: Option<Job>,
	background: Vec<Job>,
	suspended: Vec<Job>,
}

impl JobTracker {
	pub fn new() -> JobTracker {
		JobTracker::default()
	}

	/// Panics if a foreground job is already tracked; the dispatcher must wait first.
	pub fn track_foreground(&mut self, pid: Pid, program: &str) {
		assert!(self.foreground.is_none(), "track_foreground: foreground slot already holds pid {}",
		        self.foreground.as_ref().map_or(0, |j| j.pid.as_raw()));
		self.foreground = Some(Job { pid: pid, program: program.to_string(), state: State::Running, is_background: false });
		FOREGROUND_STOPPED.store(false, Ordering::SeqCst);
		FOREGROUND_PID.store(pid.as_raw(), Ordering::SeqCst);
	}

	pub fn foreground(&self) -> Option<(Pid, State)> {
		self.foreground.as_ref().map(|job| {
			let state = if FOREGROUND_STOPPED.load(Ordering::SeqCst) { State::Stopped } else { job.state };
			(job.pid, state)
		})
	}

	fn release_foreground(&mut self) -> Option<Job> {
		FOREGROUND_PID.store(0, Ordering::SeqCst);
		FOREGROUND_STOPPED.store(false, Ordering::SeqCst);
		self.foreground.take()
	}

	/// Blocks until the foreground job leaves the running state and clears the slot.
	///
	/// A job that stops is moved to the suspended list, where it stays outstanding
	/// until resumed with [`JobTracker::resume_suspended`].
	///
	/// Panics if no foreground job is tracked.
	pub fn wait_foreground(&mut self) -> nix::Result<JobResult> {
		let pid = match self.foreground {
			Some(ref job) => job.pid,
			None => panic!("wait_foreground: no foreground job is tracked"),
		};
		loop {
			let status = match wait::waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
				Ok(status) => status,
				Err(Errno::EINTR) => continue,
				Err(e) => {
					self.release_foreground();
					return Err(e);
				},
			};
			let state = status.state();
			if state == State::Running {
				continue;
			}
			let mut job = match self.release_foreground() {
				Some(job) => job,
				None => unreachable!(),
			};
			job.state = state;
			if state == State::Stopped {
				log::debug!("pid {} stopped", pid);
				self.suspended.push(job.clone());
			}
			return Ok(JobResult::from(job));
		}
	}

	pub fn register_background(&mut self, pid: Pid, program: &str) {
		self.background.push(Job { pid: pid, program: program.to_string(), state: State::Running, is_background: true });
	}

	/// Continues the most recently suspended job and makes it the foreground job.
	pub fn resume_suspended(&mut self) -> nix::Result<Option<Pid>> {
		let job = match self.suspended.pop() {
			Some(job) => job,
			None => return Ok(None),
		};
		if let Err(e) = signal::kill(job.pid, Signal::SIGCONT) {
			self.suspended.push(job);
			return Err(e);
		}
		self.track_foreground(job.pid, &job.program);
		Ok(Some(job.pid))
	}

	/// Collects background and suspended jobs that have terminated, without blocking.
	pub fn reap_background_nonblocking(&mut self) -> Vec<JobResult> {
		let mut finished = vec![];
		for jobs in [&mut self.background, &mut self.suspended] {
			jobs.retain_mut(|job| {
				match wait::waitpid(job.pid, Some(WaitPidFlag::WNOHANG)) {
					Ok(status) => {
						let state = status.state();
						if state.is_terminated() {
							job.state = state;
							finished.push(JobResult::from(job.clone()));
							false
						} else {
							true
						}
					},
					Err(e) => {
						log::warn!("dropping job {}: {}", job.pid, e);
						false
					},
				}
			});
		}
		finished
	}

	pub fn has_outstanding(&self) -> bool {
		!self.background.is_empty() || !self.suspended.is_empty()
	}

	pub fn outstanding(&self) -> impl Iterator<Item = &Job> {
		self.background.iter().chain(self.suspended.iter())
	}
}
