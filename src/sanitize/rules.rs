//! Detection rules that raise the suspicion score of untrusted input.

use std::sync::LazyLock;

use regex::Regex;

/// A condition that was observed while sanitizing a value.
///
/// Each rule carries a weight that is added to the suspicion score when the rule
/// triggers. Patterns that indicate an attack (script tags, SQL meta sequences)
/// weigh more than a single stray character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// A single control or invisible formatting character was stripped.
    ControlChar,
    /// Two or more control or invisible formatting characters were stripped.
    RepeatedControlChars,
    /// An opening or closing `<script>` tag.
    ScriptTag,
    /// An inline event handler attribute such as `onerror=`.
    EventHandler,
    /// A `javascript:`, `vbscript:` or `data:text/html` URI.
    ScriptUri,
    /// An HTML tag other than `<script>`.
    HtmlTag,
    /// A sequence commonly used in SQL injection.
    SqlMeta,
    /// A relative path that climbs out of its directory.
    PathTraversal,
    /// Non-ASCII characters were removed because the policy does not allow unicode.
    NonAscii,
    /// Characters were removed by the special character filter.
    SpecialChars,
}

impl Rule {
    /// The stable identifier reported in logs and results.
    pub fn id(self) -> &'static str {
        match self {
            Rule::ControlChar => "control_char",
            Rule::RepeatedControlChars => "repeated_control_chars",
            Rule::ScriptTag => "script_tag",
            Rule::EventHandler => "event_handler",
            Rule::ScriptUri => "script_uri",
            Rule::HtmlTag => "html_tag",
            Rule::SqlMeta => "sql_meta",
            Rule::PathTraversal => "path_traversal",
            Rule::NonAscii => "non_ascii",
            Rule::SpecialChars => "special_chars",
        }
    }

    /// How much the rule adds to the suspicion score.
    pub fn weight(self) -> u32 {
        match self {
            Rule::ScriptTag => 5,
            Rule::SqlMeta => 4,
            Rule::RepeatedControlChars | Rule::EventHandler | Rule::ScriptUri => 3,
            Rule::PathTraversal => 2,
            Rule::ControlChar | Rule::HtmlTag | Rule::NonAscii | Rule::SpecialChars => 1,
        }
    }
}

static SCRIPT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*/?\s*script\b").expect("valid script tag pattern"));

static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bon(?:error|load|unload|click|dblclick|mouse\w*|key\w*|focus|blur|submit|change|input|abort|toggle)\s*=",
    )
    .expect("valid event handler pattern")
});

static SCRIPT_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:javascript|vbscript)\s*:|\bdata\s*:\s*text/html")
        .expect("valid script URI pattern")
});

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*/?\s*[a-zA-Z][a-zA-Z0-9-]*\b[^>]*>").expect("valid HTML tag pattern")
});

static SQL_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        '\s*(?:or|and)\s+\S+\s*= |
        '\s*; |
        ;\s*(?:drop|delete|insert|update|truncate|alter|create|exec)\b |
        \bunion\s+(?:all\s+)?select\b |
        -- |
        /\* |
        \*/
        ",
    )
    .expect("valid SQL meta pattern")
});

static PATH_TRAVERSAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\./|\.\.\\").expect("valid path traversal pattern"));

/// Return the pattern rules that match `text`, in a fixed order.
///
/// Character-level rules (control characters, non-ASCII, special characters) are
/// decided by the cleaning steps themselves and are not reported here.
pub(super) fn detect_patterns(text: &str) -> Vec<Rule> {
    let mut matched = Vec::new();

    if SCRIPT_TAG.is_match(text) {
        matched.push(Rule::ScriptTag);
    }

    if EVENT_HANDLER.is_match(text) {
        matched.push(Rule::EventHandler);
    }

    if SCRIPT_URI.is_match(text) {
        matched.push(Rule::ScriptUri);
    }

    if HTML_TAG
        .find_iter(text)
        .any(|tag| !SCRIPT_TAG.is_match(tag.as_str()))
    {
        matched.push(Rule::HtmlTag);
    }

    if SQL_META.is_match(text) {
        matched.push(Rule::SqlMeta);
    }

    if PATH_TRAVERSAL.is_match(text) {
        matched.push(Rule::PathTraversal);
    }

    matched
}
