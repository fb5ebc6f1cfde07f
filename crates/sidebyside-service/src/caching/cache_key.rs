use std::fmt;

use crate::types::{Language, Task};

/// The key of one cached snippet: `<qualified task name>::<lower-cased language>`.
///
/// The task is used exactly as given, including its group, while the language is folded to lower
/// case so that `Python` and `python` share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn snippet(task: &Task, language: &Language) -> Self {
        Self(format!("{}::{}", task.qualified_name(), language.key()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
