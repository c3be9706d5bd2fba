//! Flag pattern matching over sploit output lines.

use std::collections::BTreeSet;

use regex::Regex;

/// Compiled flag pattern announced by the farm server.
#[derive(Debug, Clone)]
pub struct FlagFormat {
    regex: Regex,
}

impl FlagFormat {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Distinct flags on one line.
    ///
    /// A pattern with exactly one capture group yields the group's text;
    /// any other pattern yields the whole match.
    pub fn find_flags(&self, line: &str) -> BTreeSet<String> {
        if self.regex.captures_len() == 2 {
            self.regex
                .captures_iter(line)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .collect()
        } else {
            self.regex
                .find_iter(line)
                .map(|m| m.as_str().to_string())
                .collect()
        }
    }
}
