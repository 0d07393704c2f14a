//! Keyword matching against a fixed, ordered policy.
//!
//! Each keyword is compiled once into a case-insensitive regex:
//! - the keyword text is escaped, so `.` or `(` are literal characters
//! - word boundaries are asserted at each end that starts or ends with a word character
//! - words of a multi-word phrase must be adjacent, separated only by whitespace
//!
//! Policy order is match priority. The first keyword that matches wins.

use regex::Regex;
use tracing::debug;

use crate::error::PolicyError;

/// A single compiled keyword.
#[derive(Debug, Clone)]
struct Keyword {
    /// Lowercased keyword as configured.
    term: String,
    regex: Regex,
}

impl Keyword {
    fn compile(term: String) -> Result<Self, PolicyError> {
        let regex = Regex::new(&keyword_pattern(&term)).map_err(|source| PolicyError::Compile {
            keyword: term.clone(),
            source,
        })?;
        Ok(Self { term, regex })
    }
}

/// Build the regex source for one keyword.
fn keyword_pattern(term: &str) -> String {
    let body = term
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");

    let starts_with_word = term.chars().next().is_some_and(is_word_char);
    let ends_with_word = term.chars().last().is_some_and(is_word_char);

    format!(
        "(?i){}{}{}",
        if starts_with_word { r"\b" } else { "" },
        body,
        if ends_with_word { r"\b" } else { "" },
    )
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Ordered keyword policy, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    keywords: Vec<Keyword>,
}

impl KeywordPolicy {
    /// Compile a policy from keywords in priority order.
    ///
    /// Keywords are trimmed and lowercased; blank entries are dropped.
    pub fn new<I, S>(keywords: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .map(Keyword::compile)
            .collect::<Result<Vec<_>, _>>()?;

        if keywords.is_empty() {
            return Err(PolicyError::Empty);
        }

        Ok(Self { keywords })
    }

    /// Number of keywords in the policy.
    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Keywords in priority order.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(|k| k.term.as_str())
    }

    /// Return the first keyword, in policy order, that appears in `text`.
    pub fn find_match(&self, text: &str) -> Option<&str> {
        let matched = self
            .keywords
            .iter()
            .find(|k| k.regex.is_match(text))
            .map(|k| k.term.as_str());

        if let Some(keyword) = matched {
            debug!(keyword, "Keyword matched");
        }
        matched
    }
}

/// Free-function form of [`KeywordPolicy::find_match`].
pub fn match_keyword<'p>(text: &str, policy: &'p KeywordPolicy) -> Option<&'p str> {
    policy.find_match(text)
}
