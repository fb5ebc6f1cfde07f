//! HTML pages, rendered by placeholder substitution.
//!
//! Templates are embedded at build time. A placeholder is written `{{name}}` and replaced in a
//! single pass, so substituted values are never scanned for placeholders again.
use std::fmt::Write;

use once_cell::sync::Lazy;
use sidebyside_service::types::{CodeFragment, Language, Task};
use sidebyside_service::utils::html::escape;
use url::Url;

static HEADER: &str = include_str!("../static/header.html");
static INDEX: &str = include_str!("../static/index.html");
static TASKS: &str = include_str!("../static/tasks.html");
static CODEBLOCK: &str = include_str!("../static/codeblock.html");
static LANGUAGES: &str = include_str!("../static/languages.json");

pub const INDEX_TITLE: &str = "Side-by-side programming languages comparisons";

/// Base for building escaped paths.
static BASE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("http://localhost/").expect("static base url is valid"));

/// Parses the language list embedded at build time.
pub fn bundled_languages() -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_str(LANGUAGES)
}

/// Replaces every `{{key}}` in `template` with its value. Unknown placeholders are kept.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            rest = &rest[start..];
            break;
        };

        let key = after[..end].trim();
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + end + 4]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn header(title: &str) -> String {
    render(HEADER, &[("title", &*escape(title))])
}

/// The path of the codeblock page of `task`, with every segment percent-encoded.
pub fn codeblock_path(lang1: &Language, lang2: &Language, task: &Task) -> String {
    let mut url = BASE_URL.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .clear()
            .extend(["codeblock", lang1.name(), lang2.name()]);
        if let Some(group) = &task.group {
            segments.push(group);
        }
        segments.push(&task.name).push("");
    }
    url.path().to_owned()
}

pub fn index_page(languages: &[String]) -> String {
    let mut options = String::new();
    for language in languages {
        let language = escape(language);
        // infallible for strings
        let _ = writeln!(
            options,
            r#"    <option value="{language}">{language}</option>"#
        );
    }

    let mut page = header(INDEX_TITLE);
    page.push_str(&render(INDEX, &[("languages", options.trim_end())]));
    page
}

pub fn tasks_page(lang1: &Language, lang2: &Language, tasks: &[Task]) -> String {
    let title = format!(
        "{} x {} side-by-side",
        lang1.display_name(),
        lang2.display_name()
    );

    let mut items = String::new();
    for task in tasks {
        let path = codeblock_path(lang1, lang2, task);
        let _ = writeln!(
            items,
            r#"  <li><details data-src="{path}"><summary>{name}</summary><div></div></details></li>"#,
            name = escape(&task.qualified_name()),
        );
    }

    let mut page = header(&title);
    page.push_str(&render(
        TASKS,
        &[
            ("lang1", &*escape(&lang1.display_name())),
            ("lang2", &*escape(&lang2.display_name())),
            ("tasks", items.trim_end()),
        ],
    ));
    page
}

/// The two code blocks, embedded verbatim.
pub fn codeblock_page(code1: &CodeFragment, code2: &CodeFragment) -> String {
    render(
        CODEBLOCK,
        &[("lang1", code1.as_str()), ("lang2", code2.as_str())],
    )
}
