// Console messages and confirmations used by the commands

use colored::Colorize;
use std::io::{self, BufRead, Write};

/// Ask for a yes/no answer on stdin. Anything but `y`/`yes` is a no.
pub fn confirm(message: &str) -> io::Result<bool> {
    confirm_from(message, &mut io::stdin().lock())
}

/// [`confirm`] against an arbitrary reader.
pub fn confirm_from<R: BufRead>(message: &str, input: &mut R) -> io::Result<bool> {
    print!("{} [y/N] ", message.white().bold());
    io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    let response = line.trim().to_lowercase();
    Ok(response == "y" || response == "yes")
}

pub fn warn(message: &str) {
    println!("{}", format!("Warning: {}", message).yellow().bold());
}

pub fn info(message: &str) {
    println!("{}", message.cyan());
}

pub fn success(message: &str) {
    println!("{}", message.green().bold());
}

pub fn error(message: &str) {
    eprintln!("{}", message.red().bold());
}
