use once_cell::sync::Lazy;
use regex::Regex;

/// A level two section header naming a language, e.g. `=={{header|Go}}==`.
static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^==\s*\{\{\s*header\s*\|\s*([^}|]+?)\s*(?:\|[^}]*)?\}\}\s*==\s*$").unwrap()
});

/// Any level two section header.
static SECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^==[^=].*==\s*$").unwrap());

/// A source code block, `<syntaxhighlight lang="go">` or the older `<lang go>`.
static CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(syntaxhighlight|lang)\b[^>]*>(.*?)</(?:syntaxhighlight|lang)\s*>").unwrap()
});

/// Returns the first code block of the section about `language`.
///
/// Language names are matched case-insensitively. The returned text is raw wikitext content and
/// still needs escaping before it is embedded into HTML.
pub fn extract_snippet<'a>(text: &'a str, language: &str) -> Option<&'a str> {
    let header = HEADER_RE.captures_iter(text).find(|captures| {
        captures
            .get(1)
            .is_some_and(|name| name.as_str().eq_ignore_ascii_case(language))
    })?;
    let section_start = header.get(0)?.end();

    let rest = &text[section_start..];
    let section_end = SECTION_RE.find(rest).map_or(rest.len(), |m| m.start());
    let section = &rest[..section_end];

    let code = CODE_RE.captures(section)?.get(2)?.as_str();
    let code = code.trim_matches(|c| c == '\n' || c == '\r');
    (!code.trim().is_empty()).then_some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{{task|Iteration}}
Show a loop.

=={{header|Go}}==
<syntaxhighlight lang="go">
for i := 0; i < 3; i++ {
    fmt.Println(i)
}
</syntaxhighlight>
{{out}}
<pre>0 1 2</pre>

=={{header|Common Lisp}}==
No solution yet.

=={{header|Python}}==
Using range:
<lang python>for i in range(3):
    print(i)</lang>
Another:
<syntaxhighlight lang="python">print(*range(3))</syntaxhighlight>

=={{header|Rust|Rust 1.70}}==
<syntaxhighlight lang="rust">for i in 0..3 { println!("{i}"); }</syntaxhighlight>
"#;

    #[test]
    fn test_extracts_first_block() {
        assert_eq!(
            extract_snippet(PAGE, "Go"),
            Some("for i := 0; i < 3; i++ {\n    fmt.Println(i)\n}")
        );
        assert_eq!(
            extract_snippet(PAGE, "python"),
            Some("for i in range(3):\n    print(i)")
        );
        assert_eq!(
            extract_snippet(PAGE, "rust"),
            Some(r#"for i in 0..3 { println!("{i}"); }"#)
        );
    }

    #[test]
    fn test_does_not_leak_into_next_section() {
        // The Common Lisp section has no code, the Python block below must not be picked up.
        assert_eq!(extract_snippet(PAGE, "common lisp"), None);
    }

    #[test]
    fn test_unknown_language() {
        assert_eq!(extract_snippet(PAGE, "Cobol"), None);
        assert_eq!(extract_snippet("", "Go"), None);
    }
}
