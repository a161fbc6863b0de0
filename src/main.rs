mod bookmark;
mod builtin;
mod config;
mod eval;
mod global;
mod job;
mod launch;
mod parser;
mod path;
mod redirect;
mod search;
mod types;

use std::io::{self, Write};
use std::process;

use anyhow::Context;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const BANNER: &'static str = "Welcome to myshell! Type in your commands.";

fn interactive(state: &mut global::State, options: &config::Options) -> anyhow::Result<i32> {
	if !options.quiet {
		println!("{}", BANNER);
	}
	let mut editor = DefaultEditor::new().context("cannot initialise line editor")?;
	loop {
		debug_assert!(state.job_tracker.foreground().is_none());
		eval::report_finished(state);
		let stray = job::take_stray_stops();
		if stray > 0 {
			log::debug!("ignored {} stop signal(s) with no foreground job", stray);
		}

		match editor.readline(&options.prompt) {
			Ok(line) => {
				if !line.trim().is_empty() {
					let _ = editor.add_history_entry(line.as_str());
				}
				eval::eval_line(state, &line);
				if let Some(status) = state.exit_status {
					return Ok(status);
				}
			},
			Err(ReadlineError::Interrupted) => continue,
			Err(ReadlineError::Eof) => {
				eval::report_finished(state);
				for job in state.job_tracker.outstanding() {
					log::warn!("abandoning job {} ({})", job.pid, job.program);
				}
				return Ok(0);
			},
			Err(e) => return Err(e).context("cannot read input"),
		}
	}
}

fn run(options: config::Options) -> anyhow::Result<i32> {
	job::install_handlers().context("cannot install signal handlers")?;
	let mut state = global::State::new();
	match options.command {
		Some(ref line) => Ok(eval::eval_line(&mut state, line) as i32),
		None => interactive(&mut state, &options),
	}
}

fn main() {
	let options: config::Options = argh::from_env();
	if let Err(e) = config::init_logging() {
		eprintln!("myshell: logging disabled: {}", e);
	}
	let status = run(options);
	let _ = io::stdout().flush();
	match status {
		Ok(status) => process::exit(status),
		Err(e) => {
			eprintln!("myshell: {:#}", e);
			process::exit(1);
		},
	}
}
