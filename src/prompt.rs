//! Operator confirmation
//!
//! Blocks until the operator confirms the public key was registered with
//! the venue and types the venue-issued API key.

use std::io::{self, BufRead, Write};

/// Out-of-band registration step performed by a human
pub trait OperatorPrompt {
    /// Show `public_key_pem`, wait for confirmation, return the issued credential
    fn confirm_registration(&mut self, public_key_pem: &str) -> io::Result<String>;
}

/// Line-based prompt over any reader/writer pair
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stdout> {
    /// Prompt on the process terminal
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before registration was confirmed",
            ));
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> OperatorPrompt for TerminalPrompt<R, W> {
    fn confirm_registration(&mut self, public_key_pem: &str) -> io::Result<String> {
        writeln!(self.output, "Public key PEM:\n{}", public_key_pem)?;

        loop {
            write!(
                self.output,
                "Have you registered the Ed25519 public key with the venue and are ready to \
                 provide the associated API key? (Type 'y' or 'yes' to confirm): "
            )?;
            self.output.flush()?;

            let answer = self.read_line()?.to_lowercase();
            if answer == "y" || answer == "yes" {
                break;
            }
            writeln!(
                self.output,
                "Registration not confirmed. Please type 'y' or 'yes' to proceed, or Ctrl+C to exit."
            )?;
        }

        loop {
            write!(
                self.output,
                "Please enter the API key associated with the registered public key: "
            )?;
            self.output.flush()?;

            let api_key = self.read_line()?;
            if !api_key.is_empty() {
                return Ok(api_key);
            }
            writeln!(self.output, "API key cannot be empty. Please try again.")?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_retries_until_confirmed_and_non_empty() {
        let input = Cursor::new("no\nmaybe\nYES\n\n   \n  venue-key-123  \n");
        let mut output = Vec::new();

        let key = TerminalPrompt::new(input, &mut output)
            .confirm_registration("PEM")
            .unwrap();
        assert_eq!(key, "venue-key-123");

        let shown = String::from_utf8(output).unwrap();
        assert_eq!(shown.matches("Registration not confirmed").count(), 2);
        assert_eq!(shown.matches("cannot be empty").count(), 2);
    }

    #[test]
    fn test_eof_is_an_error() {
        let mut output = Vec::new();
        let result = TerminalPrompt::new(Cursor::new("y\n"), &mut output).confirm_registration("PEM");
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }
}
