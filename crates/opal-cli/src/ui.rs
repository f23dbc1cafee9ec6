//! Console front-end: progress reporting and the interactive trust
//! prompt.

use std::io::{self, BufRead, Write};

use opal_core::Reporter;
use opal_core::coordinator::TrustPrompt;
use opal_schema::InterfaceUri;

/// Reports transfer progress on stderr, leaving stdout for the program.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Reporter for ConsoleReporter {
    fn fetching(&self, url: &str) {
        if !self.quiet {
            eprintln!("Fetching {url}");
        }
    }

    fn transfer_data(&self, _url: &str, data: &[u8]) {
        if !self.quiet {
            let _ = io::stderr().write_all(data);
        }
    }

    fn fetched(&self, url: &str, size: u64) {
        if !self.quiet {
            eprintln!("Fetched {url} ({size} bytes)");
        }
    }

    fn failed(&self, url: &str, reason: &str) {
        eprintln!("Failed to fetch {url}: {reason}");
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{msg}");
        }
    }

    fn error(&self, msg: &str) {
        eprintln!("Error: {msg}");
    }
}

/// Asks on stdin whether to trust newly seen signing keys.
#[derive(Debug, Clone, Copy)]
pub struct StdinPrompt;

impl TrustPrompt for StdinPrompt {
    fn confirm_keys(&self, uri: &InterfaceUri, domain: &str, fingerprints: &[String]) -> bool {
        println!("\nInterface: {uri}");
        println!("The feed is correctly signed with the following keys:");
        for fp in fingerprints {
            println!("- {fp}");
        }
        if fingerprints.len() == 1 {
            println!("Do you want to trust this key to sign feeds from '{domain}'?");
        } else {
            println!("Do you want to trust all of these keys to sign feeds from '{domain}'?");
        }

        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            print!("Trust [Y/N] ");
            let _ = io::stdout().flush();
            line.clear();
            match stdin.lock().read_line(&mut line) {
                // EOF or broken stdin: treat as refusal, never spin.
                Ok(0) | Err(_) => return false,
                Ok(_) => match line.trim() {
                    "y" | "Y" => return true,
                    "n" | "N" => return false,
                    _ => {}
                },
            }
        }
    }
}
