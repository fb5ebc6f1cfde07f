//! Domain types shared by the retriever, the task resolver and the HTTP layer.
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::html;

/// Input identifiers that are rejected before any cache or source access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("task name must not be empty")]
    EmptyTask,
    #[error("language must not be empty")]
    EmptyLanguage,
    #[error("invalid language identifier: {0:?}")]
    InvalidLanguage(String),
    #[error("invalid task identifier: {0:?}")]
    InvalidTask(String),
}

/// A case-insensitive programming language identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Language {
    /// The identifier as it was given, used for display and for querying the source.
    name: String,
    /// The lower-cased identifier, used as cache key component and markup tag.
    key: String,
}

impl Language {
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyLanguage);
        }
        if name
            .chars()
            .any(|c| c.is_control() || matches!(c, '/' | ':' | '|' | '{' | '}'))
        {
            return Err(ValidationError::InvalidLanguage(name.to_owned()));
        }

        Ok(Self {
            name: name.to_owned(),
            key: name.to_lowercase(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The name with the first letter of every word upper-cased, e.g. `Common lisp` for `common lisp`.
    pub fn display_name(&self) -> String {
        title_case(&self.name)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Upper-cases the first letter of every whitespace separated word.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

/// A programming task, optionally qualified by a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: None,
        }
    }

    pub fn grouped(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: Some(group.into()),
        }
    }

    /// Parses a page title of the form `name` or `group/name`.
    pub fn from_title(title: &str) -> Self {
        match title.split_once('/') {
            Some((group, name)) if !group.is_empty() && !name.is_empty() => {
                Self::grouped(group, name)
            }
            _ => Self::new(title),
        }
    }

    /// Builds a task from URL path segments, rejecting empty names.
    pub fn from_segments(group: Option<&str>, name: &str) -> Result<Self, ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyTask);
        }
        match group {
            Some(group) if group.trim().is_empty() => {
                Err(ValidationError::InvalidTask(format!("{group}/{name}")))
            }
            Some(group) => Ok(Self::grouped(group, name)),
            None => Ok(Self::new(name)),
        }
    }

    /// The task name including its group, `group/name`.
    pub fn qualified_name(&self) -> String {
        match &self.group {
            Some(group) => format!("{group}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(group) = &self.group {
            write!(f, "{group}/")?;
        }
        f.write_str(&self.name)
    }
}

/// A ready-to-embed HTML code block for one task in one language.
///
/// An empty fragment means the snippet was not found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeFragment(String);

impl CodeFragment {
    /// Wraps an already HTML-escaped snippet body into a code block tagged with the language.
    pub fn wrap(language: &Language, body: &str) -> Self {
        if body.is_empty() {
            return Self::default();
        }
        let class: String = language
            .key()
            .chars()
            .map(|c| if c.is_whitespace() { '-' } else { c })
            .collect();
        Self(format!(
            r#"<pre><code class="language-{}">{body}</code></pre>"#,
            html::escape(&class)
        ))
    }

    /// Takes a value read back from the cache, which is already wrapped.
    pub fn from_cached(value: String) -> Self {
        Self(value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The unit of work of the retriever: one task in two languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairRequest {
    pub task: Task,
    pub lang1: Language,
    pub lang2: Language,
}

impl PairRequest {
    pub fn new(task: Task, lang1: Language, lang2: Language) -> Result<Self, ValidationError> {
        if task.name.trim().is_empty() {
            return Err(ValidationError::EmptyTask);
        }
        Ok(Self { task, lang1, lang2 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parse() {
        let lang = Language::parse(" Python ").unwrap();
        assert_eq!(lang.name(), "Python");
        assert_eq!(lang.key(), "python");

        assert_eq!(Language::parse(""), Err(ValidationError::EmptyLanguage));
        assert_eq!(Language::parse("   "), Err(ValidationError::EmptyLanguage));
        assert!(matches!(
            Language::parse("c::d"),
            Err(ValidationError::InvalidLanguage(_))
        ));
        assert!(Language::parse("C++").is_ok());
        assert!(Language::parse("C#").is_ok());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("go"), "Go");
        assert_eq!(title_case("common lisp"), "Common Lisp");
        assert_eq!(title_case("C++"), "C++");
        assert_eq!(Language::parse("python").unwrap().display_name(), "Python");
    }

    #[test]
    fn test_task_titles() {
        let task = Task::from_title("Sorting algorithms/Quicksort");
        assert_eq!(task.group.as_deref(), Some("Sorting algorithms"));
        assert_eq!(task.name, "Quicksort");
        assert_eq!(task.qualified_name(), "Sorting algorithms/Quicksort");
        assert_eq!(task.to_string(), "Sorting algorithms/Quicksort");

        let task = Task::from_title("Loops/For");
        assert_eq!(task, Task::grouped("Loops", "For"));

        let task = Task::from_title("Hello world");
        assert_eq!(task.group, None);
        assert_eq!(task.qualified_name(), "Hello world");
    }

    #[test]
    fn test_task_from_segments() {
        assert_eq!(
            Task::from_segments(None, "loops"),
            Ok(Task::new("loops"))
        );
        assert_eq!(
            Task::from_segments(Some("Loops"), "For"),
            Ok(Task::grouped("Loops", "For"))
        );
        assert_eq!(
            Task::from_segments(None, " "),
            Err(ValidationError::EmptyTask)
        );
        assert!(Task::from_segments(Some(""), "For").is_err());
    }

    #[test]
    fn test_fragment_wrap() {
        let go = Language::parse("Go").unwrap();
        let fragment = CodeFragment::wrap(&go, "fmt.Println(&quot;hi&quot;)");
        assert_eq!(
            fragment.as_str(),
            r#"<pre><code class="language-go">fmt.Println(&quot;hi&quot;)</code></pre>"#
        );

        let lisp = Language::parse("Common Lisp").unwrap();
        assert!(
            CodeFragment::wrap(&lisp, "(print 1)")
                .as_str()
                .starts_with(r#"<pre><code class="language-common-lisp">"#)
        );

        assert!(CodeFragment::wrap(&go, "").is_empty());
    }

    #[test]
    fn test_pair_request_rejects_empty_task() {
        let go = Language::parse("go").unwrap();
        let rust = Language::parse("rust").unwrap();
        assert_eq!(
            PairRequest::new(Task::new(""), go.clone(), rust.clone()),
            Err(ValidationError::EmptyTask)
        );
        assert!(PairRequest::new(Task::new("loops"), go, rust).is_ok());
    }
}
