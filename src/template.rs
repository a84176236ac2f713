use std::borrow::Cow;
use std::collections::BTreeMap;

use regex::{Captures, Regex};

use crate::error::Error;
use crate::model::{FillReport, MissingPolicy, PlaceholderSyntax, Values};

pub(crate) struct Placeholders {
    pattern: Regex,
}

impl Placeholders {
    pub(crate) fn new(syntax: &PlaceholderSyntax) -> Result<Self, Error> {
        let (Some(open_first), Some(close_first)) =
            (syntax.open.chars().next(), syntax.close.chars().next())
        else {
            return Err(Error::InvalidSyntax("delimiters must not be empty".into()));
        };
        // Names may not contain markup or the first character of either
        // delimiter, so `{{a {{B}}` still finds `{{B}}`.
        let excluded = format!(
            "<>\\r\\n{}{}",
            regex::escape(&open_first.to_string()),
            regex::escape(&close_first.to_string())
        );
        let source = format!(
            "{}([^{}]+?){}",
            regex::escape(&syntax.open),
            excluded,
            regex::escape(&syntax.close)
        );
        let pattern = Regex::new(&source).map_err(|e| Error::InvalidSyntax(e.to_string()))?;
        Ok(Placeholders { pattern })
    }

    /// Distinct placeholder names in first-occurrence order.
    pub(crate) fn scan(&self, content: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for caps in self.pattern.captures_iter(content) {
            let name = placeholder_name(&caps);
            if !names.iter().any(|n| n.as_str() == name) {
                names.push(name.into_owned());
            }
        }
        names
    }

    /// Replace every placeholder that has a value in one left-to-right pass.
    /// Inserted text is never rescanned.
    pub(crate) fn fill(
        &self,
        content: &str,
        values: &Values,
        policy: MissingPolicy,
    ) -> Result<(String, FillReport), Error> {
        let mut escaped: BTreeMap<&str, Cow<str>> = BTreeMap::new();
        for (key, value) in values {
            escaped.insert(key.as_str(), escape_value(key, value)?);
        }

        let mut substitutions: BTreeMap<String, usize> = BTreeMap::new();
        let mut unfilled: Vec<String> = Vec::new();

        let filled = self.pattern.replace_all(content, |caps: &Captures| {
            let name = placeholder_name(caps);
            match escaped.get(&*name) {
                Some(value) => {
                    *substitutions.entry(name.into_owned()).or_insert(0) += 1;
                    value.to_string()
                }
                None => {
                    if !unfilled.iter().any(|n| n.as_str() == name) {
                        unfilled.push(name.into_owned());
                    }
                    caps[0].to_string()
                }
            }
        });

        if !unfilled.is_empty() {
            if policy == MissingPolicy::Fail {
                return Err(Error::UnfilledPlaceholders(unfilled));
            }
            log::warn!("left unfilled: {}", unfilled.join(", "));
        }

        let unused: Vec<String> = values
            .keys()
            .filter(|k| !substitutions.contains_key(k.as_str()))
            .cloned()
            .collect();
        if !unused.is_empty() {
            log::warn!("values never used: {}", unused.join(", "));
        }
        for (key, count) in &substitutions {
            log::debug!("replaced '{key}' x{count}");
        }

        let report = FillReport {
            substitutions,
            unfilled,
            unused,
        };
        Ok((filled.into_owned(), report))
    }
}

fn placeholder_name<'a>(caps: &Captures<'a>) -> Cow<'a, str> {
    let Some(raw) = caps.get(1) else {
        return Cow::Borrowed("");
    };
    let raw = raw.as_str().trim();
    match quick_xml::escape::unescape(raw) {
        Ok(Cow::Owned(name)) => Cow::Owned(name),
        _ => Cow::Borrowed(raw),
    }
}

fn is_xml_char(c: char) -> bool {
    !matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
}

/// Escape a replacement so it is safe in element text and attribute values.
pub(crate) fn escape_value<'a>(key: &str, value: &'a str) -> Result<Cow<'a, str>, Error> {
    if let Some(bad) = value.chars().find(|c| !is_xml_char(*c)) {
        return Err(Error::InvalidValue {
            key: key.to_string(),
            reason: format!("character U+{:04X} is not allowed in XML", bad as u32),
        });
    }
    Ok(quick_xml::escape::escape(value))
}
