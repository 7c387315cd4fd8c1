//! Scored, policy-driven sanitization of untrusted strings.
//!
//! [sanitize] is a pure function: it cleans a value according to a
//! [SanitizationPolicy] and reports which [Rule]s were triggered along with a
//! suspicion score. [Sanitizer] wraps it with the process-wide
//! [SanitizeConfig], selects policies by field name, logs suspicious input and
//! rejects input whose score exceeds the configured threshold.

mod field;
mod query;
mod rules;

pub use field::{FieldClass, policy_for};
pub use query::sanitize_query;
pub use rules::Rule;

use serde_json::{Map, Value};
use tracing::Level;

use crate::validation::{FieldError, ValidationError};

/// How aggressively special characters are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialCharMode {
    /// Keep every character, e.g. for passwords.
    None,
    /// Remove a denylist of high-risk characters and keep common punctuation.
    Balanced,
    /// Keep only alphanumeric characters, spaces and [STRICT_PUNCTUATION].
    Strict,
}

/// Characters removed in [SpecialCharMode::Balanced].
pub const BALANCED_DENYLIST: &[char] = &['<', '>', '`', '\\', '{', '}', '|', '^', '[', ']'];

/// Punctuation kept in [SpecialCharMode::Strict].
pub const STRICT_PUNCTUATION: &[char] = &['.', ',', '\'', '-', '_'];

/// Describes how a single value should be cleaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizationPolicy {
    /// Whether non-ASCII characters are kept.
    pub allow_unicode: bool,
    /// Whether HTML special characters are converted to entities.
    pub escape_html: bool,
    /// Which special characters are removed.
    pub special_char_mode: SpecialCharMode,
    /// Whether a positive suspicion score should be logged.
    pub log_suspicious: bool,
}

/// The outcome of sanitizing a string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SanitizationResult {
    /// The cleaned string.
    pub cleaned_value: String,
    /// The sum of the weights of `matched_rules`.
    pub suspicion_score: u32,
    /// The rules that were triggered, in the order they were checked.
    pub matched_rules: Vec<Rule>,
}

/// The outcome of sanitizing a JSON value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SanitizedJson {
    /// The JSON value with every string cleaned.
    pub cleaned_value: Value,
    /// The sum of the weights of `matched_rules`.
    pub suspicion_score: u32,
    /// The union of the rules triggered by every string, in first-seen order.
    pub matched_rules: Vec<Rule>,
    /// The highest score of any single string, key or value.
    pub max_string_score: u32,
    /// Raw object keys that were dropped because their cleaned form matched an
    /// earlier key in the same object.
    pub colliding_keys: Vec<String>,
}

/// Tracks the rules triggered while sanitizing.
#[derive(Debug, Default)]
struct Findings {
    score: u32,
    rules: Vec<Rule>,
}

impl Findings {
    fn flag(&mut self, rule: Rule) {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
            self.score += rule.weight();
        }
    }
}

/// Tracks the findings of every string inside a JSON value.
#[derive(Debug, Default)]
struct JsonFindings {
    union: Findings,
    max_string_score: u32,
    colliding_keys: Vec<String>,
}

impl JsonFindings {
    fn add(&mut self, result: &SanitizationResult) {
        for rule in &result.matched_rules {
            self.union.flag(*rule);
        }
        self.max_string_score = self.max_string_score.max(result.suspicion_score);
    }
}

/// Clean `raw` according to `policy` and score how suspicious it looked.
///
/// The steps always run in the same order:
/// 1. control and invisible formatting characters are stripped (tab and
///    newline are kept),
/// 2. the stripped text is checked against the pattern rules,
/// 3. HTML special characters are escaped if `policy.escape_html`,
/// 4. non-ASCII characters are removed and flagged if `!policy.allow_unicode`,
/// 5. special characters are filtered per `policy.special_char_mode`.
///
/// The function is deterministic and never panics. For any mode other than
/// [SpecialCharMode::None], sanitizing the cleaned value again returns the same
/// cleaned value.
pub fn sanitize(raw: &str, policy: &SanitizationPolicy) -> SanitizationResult {
    let mut findings = Findings::default();

    let (text, stripped_count) = strip_control_chars(raw);
    match stripped_count {
        0 => {}
        1 => findings.flag(Rule::ControlChar),
        _ => findings.flag(Rule::RepeatedControlChars),
    }

    for rule in rules::detect_patterns(&text) {
        findings.flag(rule);
    }

    let text = if policy.escape_html {
        escape_html(&text)
    } else {
        text
    };

    let text = if policy.allow_unicode {
        text
    } else {
        let (ascii, removed) = remove_non_ascii(&text);
        if removed {
            findings.flag(Rule::NonAscii);
        }
        ascii
    };

    let (text, removed) = filter_special_chars(&text, policy.special_char_mode);
    if removed {
        findings.flag(Rule::SpecialChars);
    }

    SanitizationResult {
        cleaned_value: text,
        suspicion_score: findings.score,
        matched_rules: findings.rules,
    }
}

/// Sanitize every string inside a JSON value.
///
/// Object keys and string values are cleaned with `policy`. Numbers, booleans
/// and nulls pass through unchanged and add nothing to the score. Each string
/// is scored on its own: `max_string_score` is the score to compare against a
/// threshold, while `suspicion_score` always equals the summed weights of
/// `matched_rules`.
///
/// If two keys of one object clean to the same string, the first key in
/// iteration order is kept and the others are reported in `colliding_keys`.
pub fn sanitize_value(value: &Value, policy: &SanitizationPolicy) -> SanitizedJson {
    let mut findings = JsonFindings::default();
    let cleaned_value = sanitize_value_inner(value, policy, &mut findings);

    SanitizedJson {
        cleaned_value,
        suspicion_score: findings.union.score,
        matched_rules: findings.union.rules,
        max_string_score: findings.max_string_score,
        colliding_keys: findings.colliding_keys,
    }
}

fn sanitize_value_inner(
    value: &Value,
    policy: &SanitizationPolicy,
    findings: &mut JsonFindings,
) -> Value {
    match value {
        Value::String(raw) => {
            let result = sanitize(raw, policy);
            findings.add(&result);
            Value::String(result.cleaned_value)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_value_inner(item, policy, findings))
                .collect(),
        ),
        Value::Object(entries) => {
            let mut cleaned = Map::with_capacity(entries.len());

            for (raw_key, item) in entries {
                let key = sanitize(raw_key, policy);
                findings.add(&key);
                let item = sanitize_value_inner(item, policy, findings);

                if cleaned.contains_key(&key.cleaned_value) {
                    findings.colliding_keys.push(raw_key.clone());
                } else {
                    cleaned.insert(key.cleaned_value, item);
                }
            }

            Value::Object(cleaned)
        }
        other => other.clone(),
    }
}

fn is_invisible_formatting(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
            | '\u{E0000}'..='\u{E007F}'
    )
}

fn strip_control_chars(raw: &str) -> (String, usize) {
    let mut stripped = 0;
    let text = raw
        .chars()
        .filter(|&c| {
            let keep = c == '\t'
                || c == '\n'
                || !(c.is_control() || is_invisible_formatting(c));
            if !keep {
                stripped += 1;
            }
            keep
        })
        .collect();

    (text, stripped)
}

/// The entities produced by [escape_html].
const HTML_ENTITIES: [&str; 5] = ["&amp;", "&lt;", "&gt;", "&quot;", "&#x27;"];

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for (i, c) in text.char_indices() {
        match c {
            '&' if HTML_ENTITIES
                .iter()
                .any(|entity| text[i..].starts_with(entity)) =>
            {
                escaped.push('&')
            }
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }

    escaped
}

fn remove_non_ascii(text: &str) -> (String, bool) {
    let ascii: String = text.chars().filter(char::is_ascii).collect();
    let removed = ascii.len() != text.len();

    (ascii, removed)
}

fn filter_special_chars(text: &str, mode: SpecialCharMode) -> (String, bool) {
    let keep: fn(char) -> bool = match mode {
        SpecialCharMode::None => return (text.to_owned(), false),
        SpecialCharMode::Balanced => |c| !BALANCED_DENYLIST.contains(&c),
        SpecialCharMode::Strict => {
            |c: char| c.is_alphanumeric() || c == ' ' || STRICT_PUNCTUATION.contains(&c)
        }
    };

    let filtered: String = text.chars().filter(|&c| keep(c)).collect();
    let removed = filtered.len() != text.len();

    (filtered, removed)
}

/// Rejects a value that lost characters because its policy only allows ASCII.
fn check_ascii(field_name: &str, rules: &[Rule]) -> Result<(), FieldError> {
    if rules.contains(&Rule::NonAscii) {
        return Err(FieldError::new(
            field_name,
            ValidationError::InvalidFormat,
            "Only ASCII characters are allowed",
        ));
    }

    Ok(())
}

/// Process-wide settings for sanitization, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeConfig {
    /// Whether suspicious input is logged at all.
    pub log_suspicious: bool,
    /// The level suspicious input is logged at.
    pub log_level: Level,
    /// Values that score above this are rejected instead of cleaned.
    pub rejection_threshold: u32,
}

impl SanitizeConfig {
    /// The default score above which input is rejected.
    pub const DEFAULT_REJECTION_THRESHOLD: u32 = 5;
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            log_suspicious: true,
            log_level: Level::WARN,
            rejection_threshold: Self::DEFAULT_REJECTION_THRESHOLD,
        }
    }
}

/// Sanitizes request fields using the policy for each field and the app's
/// [SanitizeConfig].
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    config: SanitizeConfig,
}

impl Sanitizer {
    /// Create a sanitizer with the given config.
    pub fn new(config: SanitizeConfig) -> Self {
        Self { config }
    }

    /// The config this sanitizer was built with.
    pub fn config(&self) -> &SanitizeConfig {
        &self.config
    }

    /// Sanitize the value of the field `field_name` with the policy for that field.
    pub fn sanitize(&self, field_name: &str, raw: &str) -> SanitizationResult {
        self.sanitize_with_policy(field_name, raw, &policy_for(field_name))
    }

    /// Sanitize the value of the field `field_name` with an explicit policy.
    pub fn sanitize_with_policy(
        &self,
        field_name: &str,
        raw: &str,
        policy: &SanitizationPolicy,
    ) -> SanitizationResult {
        let result = sanitize(raw, policy);
        self.observe(
            field_name,
            policy,
            result.suspicion_score,
            &result.matched_rules,
        );
        result
    }

    /// Sanitize every string in the JSON value of the field `field_name`.
    pub fn sanitize_json(&self, field_name: &str, value: &Value) -> SanitizedJson {
        let policy = policy_for(field_name);
        let result = sanitize_value(value, &policy);
        self.observe(
            field_name,
            &policy,
            result.suspicion_score,
            &result.matched_rules,
        );
        result
    }

    /// Sanitize a field and return the cleaned value.
    ///
    /// # Errors
    ///
    /// Returns a field error with:
    /// - [ValidationError::Suspicious] if the suspicion score is above the
    ///   rejection threshold,
    /// - [ValidationError::InvalidFormat] if the field only allows ASCII and
    ///   non-ASCII characters had to be removed.
    pub fn clean(&self, field_name: &str, raw: &str) -> Result<String, FieldError> {
        let result = self.sanitize(field_name, raw);
        self.check_threshold(field_name, result.suspicion_score)?;
        check_ascii(field_name, &result.matched_rules)?;

        Ok(result.cleaned_value)
    }

    /// Sanitize a JSON field and return the cleaned value.
    ///
    /// # Errors
    ///
    /// Returns a field error with:
    /// - [ValidationError::Suspicious] if any single string scored above the
    ///   rejection threshold,
    /// - [ValidationError::InvalidFormat] if non-ASCII characters had to be
    ///   removed or two object keys became the same once cleaned.
    pub fn clean_json(&self, field_name: &str, value: &Value) -> Result<Value, FieldError> {
        let result = self.sanitize_json(field_name, value);
        self.check_threshold(field_name, result.max_string_score)?;
        check_ascii(field_name, &result.matched_rules)?;

        if !result.colliding_keys.is_empty() {
            return Err(FieldError::new(
                field_name,
                ValidationError::InvalidFormat,
                "Keys must stay distinct once special characters are removed",
            ));
        }

        Ok(result.cleaned_value)
    }

    fn check_threshold(&self, field_name: &str, score: u32) -> Result<(), FieldError> {
        if score > self.config.rejection_threshold {
            return Err(FieldError::new(
                field_name,
                ValidationError::Suspicious,
                "Input contains disallowed content",
            ));
        }

        Ok(())
    }

    fn observe(&self, field: &str, policy: &SanitizationPolicy, score: u32, rules: &[Rule]) {
        if score == 0 || !policy.log_suspicious || !self.config.log_suspicious {
            return;
        }

        let rules: Vec<&str> = rules.iter().map(|rule| rule.id()).collect();
        let level = self.config.log_level;

        if level == Level::ERROR {
            tracing::error!(category = "sanitize", field, score, ?rules, "Suspicious input");
        } else if level == Level::WARN {
            tracing::warn!(category = "sanitize", field, score, ?rules, "Suspicious input");
        } else if level == Level::INFO {
            tracing::info!(category = "sanitize", field, score, ?rules, "Suspicious input");
        } else if level == Level::DEBUG {
            tracing::debug!(category = "sanitize", field, score, ?rules, "Suspicious input");
        } else {
            tracing::trace!(category = "sanitize", field, score, ?rules, "Suspicious input");
        }
    }
}

#[cfg(test)]
mod sanitize_tests {
    use serde_json::json;

    use super::{
        FieldClass, Rule, SanitizationPolicy, SpecialCharMode, policy_for, sanitize,
        sanitize_value,
    };

    fn all_policies() -> Vec<SanitizationPolicy> {
        let mut policies = vec![
            FieldClass::Name.policy(),
            FieldClass::Identifier.policy(),
            FieldClass::Password.policy(),
            FieldClass::Default.policy(),
        ];

        for mode in [SpecialCharMode::Balanced, SpecialCharMode::Strict] {
            for allow_unicode in [true, false] {
                for escape_html in [true, false] {
                    policies.push(SanitizationPolicy {
                        allow_unicode,
                        escape_html,
                        special_char_mode: mode,
                        log_suspicious: false,
                    });
                }
            }
        }

        policies
    }

    const SAMPLES: [&str; 12] = [
        "",
        "Jane Doe",
        "jane.doe+budget@example.com",
        "<script>alert(1)</script>",
        "Tom & Jerry's \"show\"",
        "&amp; &lt;b&gt; &#x27;",
        "Zoë Ångström-Łukasz",
        "a\u{0}b\u{7}c\u{1b}d",
        "user\u{200B}name",
        "' OR 1=1; DROP TABLE user; --",
        "{`rm -rf /`} | ^ [x] \\ ~",
        "&{lt;&l[t;",
    ];

    #[test]
    fn script_is_escaped_and_flagged_by_default_policy() {
        let result = sanitize("<script>alert(1)</script>", &policy_for("description"));

        assert!(!result.cleaned_value.contains("<script>"));
        assert_eq!(
            result.cleaned_value,
            "&lt;script&gt;alert(1)&lt;/script&gt;"
        );
        assert!(result.suspicion_score > 0);
        assert!(result.matched_rules.contains(&Rule::ScriptTag));
    }

    #[test]
    fn clean_input_is_unchanged_and_scores_zero() {
        let result = sanitize("Jane Doe", &FieldClass::Name.policy());

        assert_eq!(result.cleaned_value, "Jane Doe");
        assert_eq!(result.suspicion_score, 0);
        assert!(result.matched_rules.is_empty());
    }

    #[test]
    fn empty_input_is_a_no_op() {
        for policy in all_policies() {
            let result = sanitize("", &policy);

            assert_eq!(result.cleaned_value, "");
            assert_eq!(result.suspicion_score, 0);
        }
    }

    #[test]
    fn sanitize_is_deterministic() {
        for policy in all_policies() {
            for sample in SAMPLES {
                assert_eq!(sanitize(sample, &policy), sanitize(sample, &policy));
            }
        }
    }

    #[test]
    fn cleaned_value_is_a_fixed_point() {
        for policy in all_policies() {
            if policy.special_char_mode == SpecialCharMode::None {
                continue;
            }

            for sample in SAMPLES {
                let first = sanitize(sample, &policy);
                let second = sanitize(&first.cleaned_value, &policy);

                assert_eq!(
                    first.cleaned_value, second.cleaned_value,
                    "second pass changed {sample:?} under {policy:?}"
                );
            }
        }
    }

    #[test]
    fn single_control_char_weighs_less_than_repeated() {
        let policy = FieldClass::Password.policy();
        let single = sanitize("pass\u{0}word", &policy);
        let repeated = sanitize("p\u{0}a\u{1}s\u{2}s", &policy);

        assert_eq!(single.cleaned_value, "password");
        assert_eq!(single.matched_rules, vec![Rule::ControlChar]);
        assert_eq!(repeated.cleaned_value, "pass");
        assert_eq!(repeated.matched_rules, vec![Rule::RepeatedControlChars]);
        assert!(repeated.suspicion_score > single.suspicion_score);
    }

    #[test]
    fn tabs_and_newlines_survive_control_stripping() {
        let result = sanitize("line one\n\tline two", &FieldClass::Password.policy());

        assert_eq!(result.cleaned_value, "line one\n\tline two");
        assert_eq!(result.suspicion_score, 0);
    }

    #[test]
    fn invisible_characters_are_stripped() {
        let result = sanitize("user\u{200B}name\u{202E}", &FieldClass::Identifier.policy());

        assert_eq!(result.cleaned_value, "username");
        assert_eq!(result.matched_rules, vec![Rule::RepeatedControlChars]);
    }

    #[test]
    fn patterns_split_by_control_characters_are_detected() {
        let result = sanitize("<scr\u{0}ipt>", &FieldClass::Default.policy());

        assert!(result.matched_rules.contains(&Rule::ScriptTag));
        assert!(result.matched_rules.contains(&Rule::ControlChar));
    }

    #[test]
    fn non_ascii_is_removed_and_flagged_when_unicode_is_not_allowed() {
        let result = sanitize("zoë@example.com", &FieldClass::Identifier.policy());

        assert_eq!(result.cleaned_value, "zo@example.com");
        assert_eq!(result.matched_rules, vec![Rule::NonAscii]);
        assert_eq!(result.suspicion_score, Rule::NonAscii.weight());
    }

    #[test]
    fn unicode_names_are_kept() {
        let result = sanitize("Zoë Ångström-Łukasz", &FieldClass::Name.policy());

        assert_eq!(result.cleaned_value, "Zoë Ångström-Łukasz");
        assert_eq!(result.suspicion_score, 0);
    }

    #[test]
    fn strict_mode_keeps_only_safe_punctuation() {
        let result = sanitize("O'Brien, Jr. <b>(CEO)!</b>", &FieldClass::Name.policy());

        assert_eq!(result.cleaned_value, "O'Brien, Jr. bCEOb");
        assert!(result.matched_rules.contains(&Rule::HtmlTag));
        assert!(result.matched_rules.contains(&Rule::SpecialChars));
    }

    #[test]
    fn balanced_mode_keeps_common_punctuation() {
        let result = sanitize(
            "jane.doe+budget_2024@example.com",
            &FieldClass::Identifier.policy(),
        );

        assert_eq!(result.cleaned_value, "jane.doe+budget_2024@example.com");
        assert_eq!(result.suspicion_score, 0);
    }

    #[test]
    fn balanced_mode_removes_denylisted_characters() {
        let result = sanitize("a{b}|c^[d]`e\\f", &FieldClass::Identifier.policy());

        assert_eq!(result.cleaned_value, "abcdef");
        assert_eq!(result.matched_rules, vec![Rule::SpecialChars]);
    }

    #[test]
    fn password_mode_keeps_special_characters() {
        let result = sanitize("P@$$w0rd<>{}|^", &FieldClass::Password.policy());

        assert_eq!(result.cleaned_value, "P@$$w0rd<>{}|^");
        assert!(!result.matched_rules.contains(&Rule::SpecialChars));
    }

    #[test]
    fn existing_entities_are_not_escaped_twice() {
        let policy = FieldClass::Default.policy();
        let result = sanitize("Tom &amp; Jerry & co", &policy);

        assert_eq!(result.cleaned_value, "Tom &amp; Jerry &amp; co");
    }

    #[test]
    fn each_rule_is_counted_once() {
        let result = sanitize(
            "<script></script><script></script>",
            &FieldClass::Default.policy(),
        );

        assert_eq!(result.matched_rules, vec![Rule::ScriptTag]);
        assert_eq!(result.suspicion_score, Rule::ScriptTag.weight());
    }

    #[test]
    fn score_is_the_sum_of_rule_weights() {
        for policy in all_policies() {
            for sample in SAMPLES {
                let result = sanitize(sample, &policy);
                let total: u32 = result.matched_rules.iter().map(|rule| rule.weight()).sum();

                assert_eq!(result.suspicion_score, total);
            }
        }
    }

    #[test]
    fn json_strings_are_sanitized_and_other_values_pass_through() {
        let value = json!({
            "note": "<b>hi</b>",
            "count": 3,
            "enabled": true,
            "missing": null,
            "tags": ["ok", "<script>"],
        });

        let result = sanitize_value(&value, &FieldClass::Default.policy());

        assert_eq!(
            result.cleaned_value,
            json!({
                "note": "&lt;b&gt;hi&lt;/b&gt;",
                "count": 3,
                "enabled": true,
                "missing": null,
                "tags": ["ok", "&lt;script&gt;"],
            })
        );
        assert_eq!(result.matched_rules, vec![Rule::HtmlTag, Rule::ScriptTag]);
        assert_eq!(
            result.suspicion_score,
            Rule::HtmlTag.weight() + Rule::ScriptTag.weight()
        );
    }

    #[test]
    fn json_score_is_the_sum_of_rule_weights_and_worst_string_is_tracked() {
        let value = json!({
            "a": "x[1]",
            "b": "y[2]",
            "c": "<script>",
            "d": "z[3]",
        });

        let result = sanitize_value(&value, &FieldClass::Default.policy());
        let total: u32 = result.matched_rules.iter().map(|rule| rule.weight()).sum();

        assert_eq!(result.suspicion_score, total);
        assert_eq!(result.max_string_score, Rule::ScriptTag.weight());
        assert_eq!(result.matched_rules, vec![Rule::SpecialChars, Rule::ScriptTag]);
    }

    #[test]
    fn keys_that_clean_to_the_same_string_are_reported() {
        let value = json!({"a[": 1, "a]": 2, "b": 3});

        let result = sanitize_value(&value, &FieldClass::Default.policy());

        assert_eq!(result.cleaned_value, json!({"a": 1, "b": 3}));
        assert_eq!(result.colliding_keys, vec!["a]".to_owned()]);
    }

    #[test]
    fn non_string_json_scores_zero() {
        for value in [json!(42), json!(false), json!(null), json!(1.5)] {
            let result = sanitize_value(&value, &FieldClass::Default.policy());

            assert_eq!(result.cleaned_value, value);
            assert_eq!(result.suspicion_score, 0);
            assert!(result.matched_rules.is_empty());
        }
    }
}
