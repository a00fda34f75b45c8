//! Template scanning, substitution and brace escaping.
//!
//! Node templates are resolved in two sequential substitution passes:
//!
//! 1. placeholder values are substituted into the template;
//! 2. reference aliases are substituted into the result of pass 1.
//!
//! Each pass uses the same syntax: `{name}` is a field, `{{` and `}}` are
//! escaped literal braces. A reference hole is therefore written `{{name}}`
//! (it survives pass 1 as `{name}`), and raw SQL braces that must reach the
//! final text are written `{{{{` / `}}}}`. Substituted values are inserted
//! verbatim and never re-parsed within the same pass.

use std::borrow::Cow;

use crate::error::{QueryModelError, Result};

/// One piece of a template at a single substitution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text with escaped braces already collapsed.
    Literal(Cow<'a, str>),
    /// A `{name}` field.
    Field(&'a str),
}

/// Split `template` into literal text and fields for one pass.
pub fn parse(template: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let bytes = template.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                literal.push_str(&template[start..i]);
                literal.push('{');
                i += 2;
                start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                literal.push_str(&template[start..i]);
                literal.push('}');
                i += 2;
                start = i;
            }
            b'{' => {
                literal.push_str(&template[start..i]);
                let name_start = i + 1;
                let Some(len) = template[name_start..].find(['{', '}']) else {
                    return Err(QueryModelError::TemplateSyntax(format!(
                        "unclosed '{{' at byte {i}"
                    )));
                };
                if bytes[name_start + len] == b'{' {
                    return Err(QueryModelError::TemplateSyntax(format!(
                        "unexpected '{{' inside field at byte {}",
                        name_start + len
                    )));
                }
                let name = &template[name_start..name_start + len];
                if name.is_empty() {
                    return Err(QueryModelError::TemplateSyntax(format!(
                        "empty field at byte {i}"
                    )));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(Cow::Owned(std::mem::take(&mut literal))));
                }
                segments.push(Segment::Field(name));
                i = name_start + len + 1;
                start = i;
            }
            b'}' => {
                return Err(QueryModelError::TemplateSyntax(format!(
                    "single '}}' at byte {i}"
                )));
            }
            _ => i += 1,
        }
    }

    if literal.is_empty() {
        if start < bytes.len() {
            segments.push(Segment::Literal(Cow::Borrowed(&template[start..])));
        }
    } else {
        literal.push_str(&template[start..]);
        segments.push(Segment::Literal(Cow::Owned(literal)));
    }
    Ok(segments)
}

/// Field names of one pass, in order of first appearance, without repeats.
pub fn field_names(template: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for segment in parse(template)? {
        if let Segment::Field(name) = segment
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Run one substitution pass. `lookup` returns the text for a field; a field
/// without a value fails with [`QueryModelError::MissingTemplateValue`].
pub fn substitute<'v, F>(template: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<&'v str>,
{
    let mut out = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Field(name) => match lookup(name) {
                Some(value) => out.push_str(value),
                None => return Err(QueryModelError::MissingTemplateValue(name.to_string())),
            },
        }
    }
    Ok(out)
}

/// Escape a placeholder value so it passes through pass 2 literally.
///
/// Every brace is doubled once: the value is inserted verbatim by pass 1 and
/// collapsed back to single braces by pass 2.
pub fn escape_placeholder_value(value: &str) -> String {
    value.replace('{', "{{").replace('}', "}}")
}

/// Escape raw SQL text that is written directly into a template so it
/// survives both passes unchanged. Every brace is quadrupled.
pub fn escape_raw_template_text(value: &str) -> String {
    value.replace('{', "{{{{").replace('}', "}}}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in<'a>(map: &'a HashMap<&str, &str>) -> impl Fn(&str) -> Option<&'a str> {
        move |name| map.get(name).copied()
    }

    // ── parse ───────────────────────────────────────────────────────

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(
            parse("select 1").unwrap(),
            vec![Segment::Literal(Cow::Borrowed("select 1"))]
        );
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_fields_and_escapes() {
        let segments = parse("select {col} from {{src}}").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal(Cow::Borrowed("select ")),
                Segment::Field("col"),
                Segment::Literal(Cow::Owned(" from {src}".to_string())),
            ]
        );
    }

    #[test]
    fn test_parse_field_at_end() {
        let segments = parse("x{a}").unwrap();
        assert_eq!(
            segments,
            vec![Segment::Literal(Cow::Borrowed("x")), Segment::Field("a")]
        );
    }

    #[test]
    fn test_parse_keeps_field_whitespace() {
        assert_eq!(parse("{ a }").unwrap(), vec![Segment::Field(" a ")]);
        assert_eq!(
            field_names("{a} { a }").unwrap(),
            vec!["a".to_string(), " a ".to_string()]
        );
    }

    #[test]
    fn test_parse_rejects_unclosed_brace() {
        let err = parse("select {col").unwrap_err();
        assert!(matches!(err, QueryModelError::TemplateSyntax(_)));
    }

    #[test]
    fn test_parse_rejects_single_closing_brace() {
        assert!(parse("select col}").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_field() {
        assert!(parse("select {}").is_err());
    }

    #[test]
    fn test_parse_rejects_nested_open_brace() {
        assert!(parse("{a{b}").is_err());
    }

    // ── field_names ─────────────────────────────────────────────────

    #[test]
    fn test_field_names_dedup_in_order() {
        assert_eq!(
            field_names("{b} {a} {b} {{c}}").unwrap(),
            vec!["b".to_string(), "a".to_string()]
        );
    }

    // ── substitute ──────────────────────────────────────────────────

    #[test]
    fn test_substitute_single_pass() {
        let values = HashMap::from([("col", "x")]);
        let out = substitute("select {col} from {{src}}", lookup_in(&values)).unwrap();
        assert_eq!(out, "select x from {src}");
    }

    #[test]
    fn test_substitute_missing_value() {
        let values = HashMap::new();
        let err = substitute("select {col}", lookup_in(&values)).unwrap_err();
        assert_eq!(err, QueryModelError::MissingTemplateValue("col".into()));
    }

    #[test]
    fn test_substitute_does_not_reparse_values() {
        let values = HashMap::from([("a", "{b}")]);
        assert_eq!(substitute("{a}", lookup_in(&values)).unwrap(), "{b}");
    }

    #[test]
    fn test_two_passes_resolve_reference() {
        let pass1 = HashMap::from([("col", "x")]);
        let pass2 = HashMap::from([("src", "cte_1")]);
        let out = substitute("select {col} from {{src}}", lookup_in(&pass1)).unwrap();
        let out = substitute(&out, lookup_in(&pass2)).unwrap();
        assert_eq!(out, "select x from cte_1");
    }

    // ── escaping ────────────────────────────────────────────────────

    #[test]
    fn test_escape_placeholder_value_without_braces_is_identity() {
        assert_eq!(escape_placeholder_value("abc 'x'"), "abc 'x'");
    }

    #[test]
    fn test_escape_placeholder_value_doubles_braces() {
        assert_eq!(escape_placeholder_value("{a}"), "{{a}}");
        assert_eq!(escape_placeholder_value("}{"), "}}{{");
        assert_eq!(escape_placeholder_value("{{"), "{{{{");
    }

    #[test]
    fn test_escape_raw_template_text_quadruples_braces() {
        assert_eq!(escape_raw_template_text("{a}"), "{{{{a}}}}");
        assert_eq!(escape_raw_template_text("plain"), "plain");
    }

    #[test]
    fn test_escaped_placeholder_survives_both_passes() {
        for raw in ["{", "}", "{}", "}{", "{{x}}", "json '{\"a\": {\"b\": 1}}'", "{{{"] {
            let escaped = escape_placeholder_value(raw);
            let pass1 = HashMap::from([("v", escaped.as_str())]);
            let out = substitute("select {v} from {{src}}", lookup_in(&pass1)).unwrap();
            let pass2 = HashMap::from([("src", "t")]);
            let out = substitute(&out, lookup_in(&pass2)).unwrap();
            assert_eq!(out, format!("select {raw} from t"), "raw value {raw:?}");
        }
    }

    #[test]
    fn test_escaped_raw_text_survives_both_passes() {
        for raw in ["{", "}", "{}", "'{\"k\": 1}'::jsonb", "}}{{"] {
            let template = format!("select {} as j from {{{{src}}}}", escape_raw_template_text(raw));
            let none: HashMap<&str, &str> = HashMap::new();
            let out = substitute(&template, lookup_in(&none)).unwrap();
            let pass2 = HashMap::from([("src", "t")]);
            let out = substitute(&out, lookup_in(&pass2)).unwrap();
            assert_eq!(out, format!("select {raw} as j from t"), "raw text {raw:?}");
        }
    }

    #[test]
    fn test_single_escaped_raw_text_is_eaten_by_second_pass() {
        // Doubling raw text only once is the classic mistake: pass 2 sees a field.
        let template = format!("select {}", escape_placeholder_value("{x}"));
        let none: HashMap<&str, &str> = HashMap::new();
        let out = substitute(&template, lookup_in(&none)).unwrap();
        assert_eq!(out, "select {x}");
        assert!(substitute(&out, lookup_in(&none)).is_err());
    }
}
