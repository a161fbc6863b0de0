use thiserror::Error;

pub const MAX_LINE: usize = 1024;
pub const MAX_ARGS: usize = 64;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectType { Input, Output, Append, Error }

impl RedirectType {
	/// The standard stream this redirection rebinds.
	pub fn target_fd(self) -> i32 {
		match self {
			RedirectType::Input => libc::STDIN_FILENO,
			RedirectType::Output | RedirectType::Append => libc::STDOUT_FILENO,
			RedirectType::Error => libc::STDERR_FILENO,
		}
	}

	pub fn operator(self) -> &'static str {
		match self {
			RedirectType::Input => "<",
			RedirectType::Output => ">",
			RedirectType::Append => ">>",
			RedirectType::Error => "2>",
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Redirect {
	pub typ: RedirectType,
	pub target: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum ParseError {
	#[error("syntax error near unexpected token `&'")]
	StrayAmpersand,
	#[error("syntax error: unterminated quote")]
	UnterminatedQuote,
	#[error("syntax error: missing filename after `{0}'")]
	MissingTarget(&'static str),
	#[error("syntax error: unsupported redirection `{0}'")]
	UnsupportedRedirect(String),
	#[error("syntax error: empty command")]
	EmptyCommand,
	#[error("input line longer than {} bytes", MAX_LINE)]
	LineTooLong,
	#[error("more than {} arguments", MAX_ARGS)]
	TooManyArguments,
	#[error("argument contains a NUL byte")]
	NulByte,
}

/// One parsed input line. `arguments()[0]` is always the program name.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CommandLine {
	arguments: Vec<String>,
	is_background: bool,
	redirects: Vec<Redirect>,
}

impl CommandLine {
	pub fn new(arguments: Vec<String>, is_background: bool, redirects: Vec<Redirect>) -> Result<CommandLine, ParseError> {
		if arguments.is_empty() || arguments[0].is_empty() {
			return Err(ParseError::EmptyCommand);
		}
		if arguments.len() > MAX_ARGS {
			return Err(ParseError::TooManyArguments);
		}
		let words = arguments.iter().chain(redirects.iter().map(|r| &r.target));
		for word in words {
			if word.len() > MAX_LINE {
				return Err(ParseError::LineTooLong);
			}
			if word.as_bytes().contains(&0) {
				return Err(ParseError::NulByte);
			}
		}
		Ok(CommandLine { arguments: arguments, is_background: is_background, redirects: redirects })
	}

	pub fn program(&self) -> &str {
		&self.arguments[0]
	}

	pub fn arguments(&self) -> &[String] {
		&self.arguments
	}

	pub fn is_background(&self) -> bool {
		self.is_background
	}

	pub fn redirects(&self) -> &[Redirect] {
		&self.redirects
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn words(ws: &[&str]) -> Vec<String> {
		ws.iter().map(|w| w.to_string()).collect()
	}

	#[test]
	fn program_is_first_argument() {
		let cmd = CommandLine::new(words(&["ls", "-l"]), false, vec![]).unwrap();
		assert_eq!(cmd.program(), "ls");
		assert_eq!(cmd.arguments().len(), 2);
		assert!(!cmd.is_background());
	}

	#[test]
	fn rejects_empty_and_oversized() {
		assert_eq!(CommandLine::new(vec![], false, vec![]), Err(ParseError::EmptyCommand));
		let many = vec!["x".to_string(); MAX_ARGS + 1];
		assert_eq!(CommandLine::new(many, false, vec![]), Err(ParseError::TooManyArguments));
		let nul = words(&["echo", "a\0b"]);
		assert_eq!(CommandLine::new(nul, false, vec![]), Err(ParseError::NulByte));
	}

	#[test]
	fn redirect_targets_standard_streams() {
		assert_eq!(RedirectType::Input.target_fd(), 0);
		assert_eq!(RedirectType::Append.target_fd(), 1);
		assert_eq!(RedirectType::Error.target_fd(), 2);
	}
}
