use std::path::Path;

use argh::{EarlyExit, FromArgs};

use crate::eval;
use crate::global;
use crate::search;

pub type Builtin = fn(&mut global::State, &[String]) -> u8;

fn parse_args<T: FromArgs>(name: &str, args: &[String]) -> Result<T, u8> {
	let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
	T::from_args(&[name], &args).map_err(|EarlyExit { output, status }| {
		match status {
			Ok(()) => { println!("{}", output.trim_end()); 0 },
			Err(()) => { eprintln!("{}", output.trim_end()); 2 },
		}
	})
}

pub fn builtin_exit(state: &mut global::State, _: &[String]) -> u8 {
	eval::report_finished(state);
	if state.job_tracker.has_outstanding() {
		eprintln!("myshell: there are unfinished jobs; exit refused");
		for job in state.job_tracker.outstanding() {
			let kind = if job.is_background { "running" } else { "stopped" };
			eprintln!("[{}] {} {}", job.pid, kind, job.program);
		}
		return 1;
	}
	state.exit_status = Some(0);
	0
}

#[derive(FromArgs)]
/// Print lines of C source and header files that contain a string.
struct SearchArgs {
	#[argh(switch, short = 'r')]
	/// descend into subdirectories
	recursive: bool,

	#[argh(positional)]
	/// text to look for
	needle: String,
}

pub fn builtin_search(_: &mut global::State, args: &[String]) -> u8 {
	let args: SearchArgs = match parse_args("search", args) {
		Ok(a) => a,
		Err(status) => return status,
	};
	let mut found = false;
	for result in search::search(Path::new("."), &args.needle, args.recursive) {
		match result {
			Ok(m) => {
				found = true;
				println!("{:<5}: {} -> {}", m.line_number, m.path.display(), m.line);
			},
			Err(e) => eprintln!("search: {}", e),
		}
	}
	if found { 0 } else { 1 }
}

#[derive(FromArgs)]
/// Store, list, run and delete command lines.
struct BookmarkArgs {
	#[argh(switch, short = 'l')]
	/// list stored bookmarks
	list: bool,

	#[argh(option, short = 'i')]
	/// run the bookmark at this index
	index: Option<String>,

	#[argh(option, short = 'd')]
	/// delete the bookmark at this index
	delete: Option<String>,

	#[argh(positional, greedy)]
	/// command line to store
	text: Vec<String>,
}

fn parse_index(raw: &str) -> Option<usize> {
	raw.parse().ok()
}

fn replay_bookmark(state: &mut global::State, raw_index: &str) -> u8 {
	let text = match parse_index(raw_index).map(|i| state.bookmarks.get(i)) {
		Some(Ok(text)) => text.to_string(),
		_ => {
			eprintln!("bookmark: invalid bookmark index");
			return 1;
		},
	};
	if state.replaying_bookmark {
		eprintln!("bookmark: cannot run a bookmark from inside a bookmark");
		return 1;
	}
	state.replaying_bookmark = true;
	let status = eval::eval_line(state, &text);
	state.replaying_bookmark = false;
	status
}

pub fn builtin_bookmark(state: &mut global::State, args: &[String]) -> u8 {
	let args: BookmarkArgs = match parse_args("bookmark", args) {
		Ok(a) => a,
		Err(status) => return status,
	};
	let actions = [args.list, args.index.is_some(), args.delete.is_some(), !args.text.is_empty()];
	if actions.iter().filter(|&&a| a).count() != 1 {
		eprintln!("Usage: bookmark [-l | -i <index> | -d <index> | <command...>]");
		return 2;
	}

	if args.list {
		for (i, text) in state.bookmarks.list() {
			println!("{} \"{}\"", i, text);
		}
		return 0;
	}
	if let Some(ref raw) = args.index {
		return replay_bookmark(state, raw);
	}
	if let Some(ref raw) = args.delete {
		return match parse_index(raw).map(|i| state.bookmarks.delete(i)) {
			Some(Ok(_)) => 0,
			_ => {
				eprintln!("bookmark: invalid bookmark index");
				1
			},
		};
	}

	let words = if args.text[0] == "add" { &args.text[1..] } else { &args.text[..] };
	match state.bookmarks.add(&words.join(" ")) {
		Ok(_) => 0,
		Err(e) => {
			eprintln!("bookmark: {}", e);
			1
		},
	}
}

pub fn builtin_fg(state: &mut global::State, _: &[String]) -> u8 {
	match state.job_tracker.resume_suspended() {
		Ok(Some(pid)) => {
			log::debug!("resumed pid {}", pid);
			eval::wait_and_report(state)
		},
		Ok(None) => {
			eprintln!("fg: no stopped job");
			1
		},
		Err(e) => {
			eprintln!("fg: {}", e);
			1
		},
	}
}

pub fn match_builtin(name: &str) -> Option<Builtin> {
	match name {
		"exit" => Some(builtin_exit),
		"search" => Some(builtin_search),
		"bookmark" => Some(builtin_bookmark),
		"fg" => Some(builtin_fg),
		_ => None,
	}
}
