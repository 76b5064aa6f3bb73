//! Filename filter for candidate selection.
//! Empty = everything, `regex:<pattern>` = regular expression searched in the
//! name, anything else = suffix match (e.g. ".rhd").

use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::errors::MoverError;

const REGEX_PREFIX: &str = "regex:";

#[derive(Debug, Clone, Default)]
pub enum FileFilter {
    #[default]
    Any,
    Suffix(String),
    Pattern(Regex),
}

impl FileFilter {
    pub fn parse(raw: &str) -> Result<Self, MoverError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(FileFilter::Any);
        }
        if let Some(pattern) = trimmed.strip_prefix(REGEX_PREFIX) {
            let re = Regex::new(pattern.trim()).map_err(|e| {
                MoverError::config(format!("invalid file_filter regex '{}': {e}", pattern.trim()))
            })?;
            return Ok(FileFilter::Pattern(re));
        }
        Ok(FileFilter::Suffix(trimmed.to_string()))
    }

    pub fn matches(&self, file_name: &str) -> bool {
        match self {
            FileFilter::Any => true,
            FileFilter::Suffix(s) => file_name.ends_with(s.as_str()),
            FileFilter::Pattern(re) => re.is_match(file_name),
        }
    }
}

impl FromStr for FileFilter {
    type Err = MoverError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FileFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFilter::Any => f.write_str("<any>"),
            FileFilter::Suffix(s) => f.write_str(s),
            FileFilter::Pattern(re) => write!(f, "{REGEX_PREFIX}{}", re.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_everything() {
        let f = FileFilter::parse("  ").unwrap();
        assert!(f.matches("a.rhd"));
        assert!(f.matches("notes.txt"));
    }

    #[test]
    fn suffix_match() {
        let f = FileFilter::parse(".rhd").unwrap();
        assert!(f.matches("a.rhd"));
        assert!(!f.matches("a.rhd.lock"));
        assert!(!f.matches("a.txt"));
    }

    #[test]
    fn regex_form_searches_name() {
        let f = FileFilter::parse(r"regex:^run_\d+\.rhd$").unwrap();
        assert!(f.matches("run_12.rhd"));
        assert!(!f.matches("run_x.rhd"));
        assert_eq!(f.to_string(), r"regex:^run_\d+\.rhd$");
    }

    #[test]
    fn bad_regex_is_configuration_error() {
        let err = FileFilter::parse("regex:(unclosed").unwrap_err();
        assert!(matches!(err, MoverError::Configuration(_)));
    }
}
