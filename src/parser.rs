use crate::types::*;

type ParseResult<T> = Result<T, ParseError>;

struct Parser<'a> {
	line: &'a [u8],
	i: usize,
}

impl<'a> Parser<'a> {
	fn peek_at(&self, offset: usize) -> Option<u8> {
		self.line.get(self.i + offset).cloned()
	}

	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.line.get(self.i) {
			if !f(*c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		match c {
			b' ' | b'\t' | b'\n' | b'\r' => true,
			_ => false,
		}
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Parser::is_whitespace);
	}

	fn at_boundary(&self) -> bool {
		self.peek_at(0).map_or(true, Parser::is_whitespace)
	}

	// Reads one word, removing double quotes. Returns None when nothing was consumed.
	fn read_word(&mut self) -> ParseResult<Option<String>> {
		let orig = self.i;
		let mut buf: Vec<u8> = vec![];
		loop {
			match self.peek_at(0) {
				None => break,
				Some(c) if Parser::is_whitespace(c) => break,
				Some(b'<') | Some(b'>') => break,
				Some(b'&') => return Err(ParseError::StrayAmpersand),
				Some(b'"') => {
					self.i += 1;
					loop {
						match self.peek_at(0) {
							None => return Err(ParseError::UnterminatedQuote),
							Some(b'"') => { self.i += 1; break; },
							Some(c) => { buf.push(c); self.i += 1; },
						}
					}
				},
				Some(c) => { buf.push(c); self.i += 1; },
			}
		}
		if orig == self.i {
			Ok(None)
		} else {
			Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
		}
	}

	fn read_operator(&mut self) -> ParseResult<Option<RedirectType>> {
		let typ = match (self.peek_at(0), self.peek_at(1)) {
			(Some(b'<'), _) => {
				self.i += 1;
				RedirectType::Input
			},
			(Some(b'>'), Some(b'>')) => {
				self.i += 2;
				RedirectType::Append
			},
			(Some(b'>'), _) => {
				self.i += 1;
				RedirectType::Output
			},
			(Some(b'2'), Some(b'>')) => {
				if self.peek_at(2) == Some(b'>') {
					return Err(ParseError::UnsupportedRedirect("2>>".to_string()));
				}
				self.i += 2;
				RedirectType::Error
			},
			_ => return Ok(None),
		};
		Ok(Some(typ))
	}

	fn parse_redirect(&mut self, typ: RedirectType) -> ParseResult<Redirect> {
		self.skip_whitespaces();
		match self.read_word()? {
			Some(target) => Ok(Redirect { typ: typ, target: target }),
			None => Err(ParseError::MissingTarget(typ.operator())),
		}
	}

	fn parse_command(&mut self) -> ParseResult<Option<CommandLine>> {
		let mut arguments: Vec<String> = vec![];
		let mut redirects: Vec<Redirect> = vec![];
		let mut is_background = false;

		loop {
			self.skip_whitespaces();
			match self.peek_at(0) {
				None => { break; },
				Some(b'&') => {
					self.i += 1;
					if !self.at_boundary() {
						return Err(ParseError::StrayAmpersand);
					}
					self.skip_whitespaces();
					if self.peek_at(0).is_some() {
						return Err(ParseError::StrayAmpersand);
					}
					is_background = true;
					break;
				},
				_ => {},
			}
			if let Some(typ) = self.read_operator()? {
				let redirect = self.parse_redirect(typ)?;
				redirects.push(redirect);
				continue;
			}
			match self.read_word()? {
				Some(word) => arguments.push(word),
				None => { return Err(ParseError::EmptyCommand); },
			}
		}

		if arguments.is_empty() && redirects.is_empty() && !is_background {
			return Ok(None);
		}
		CommandLine::new(arguments, is_background, redirects).map(Some)
	}
}

/// Splits a raw input line into a command line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> ParseResult<Option<CommandLine>> {
	if line.len() > MAX_LINE {
		return Err(ParseError::LineTooLong);
	}
	let mut parser = Parser { line: line.as_bytes(), i: 0 };
	parser.parse_command()
}
