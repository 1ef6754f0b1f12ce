//! Scenario variables and `${name}` substitution.

use std::collections::BTreeMap;

use serde::Serialize;

/// Named values substituted into send text and patterns.
///
/// Both `${name}` and `$name` are recognised. A reference to an unknown
/// variable is left in place, so regex anchors like `\$ $` pass through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, String>);

impl Variables {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Get a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over name/value pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Substitute variables verbatim.
    #[must_use]
    pub fn substitute(&self, template: &str) -> String {
        self.expand(template, |value, out| out.push_str(value))
    }

    /// Substitute variables into a regex, escaping their values.
    #[must_use]
    pub fn substitute_regex(&self, template: &str) -> String {
        self.expand(template, |value, out| out.push_str(&regex::escape(value)))
    }

    fn expand<F>(&self, template: &str, emit: F) -> String
    where
        F: Fn(&str, &mut String),
    {
        if self.0.is_empty() || !template.contains('$') {
            return template.to_string();
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
                match braced.find('}') {
                    Some(close) => (&braced[..close], close + 2),
                    None => ("", 0),
                }
            } else {
                let len = identifier_len(after);
                (&after[..len], len)
            };

            match self.0.get(name) {
                Some(value) if !name.is_empty() => {
                    emit(value, &mut out);
                    rest = &after[consumed..];
                }
                _ => {
                    out.push('$');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn identifier_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(*c == '_' || c.is_ascii_alphanumeric()))
        .map_or(s.len(), |(i, _)| i)
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Variables {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Variables {
        [("host", "10.0.0.2"), ("hostname", "switch-1"), ("lldp", "of_lldp")]
            .into_iter()
            .collect()
    }

    #[test]
    fn braced_and_bare_references() {
        let v = vars();
        assert_eq!(v.substitute("ping ${host}"), "ping 10.0.0.2");
        assert_eq!(v.substitute("ping $host -c 1"), "ping 10.0.0.2 -c 1");
        assert_eq!(v.substitute("$hostname"), "switch-1");
        assert_eq!(v.substitute("kytos/${lldp}_v2"), "kytos/of_lldp_v2");
    }

    #[test]
    fn unknown_and_malformed_left_alone() {
        let v = vars();
        assert_eq!(v.substitute("$HOME and ${missing}"), "$HOME and ${missing}");
        assert_eq!(v.substitute("cost: $5"), "cost: $5");
        assert_eq!(v.substitute("trailing $"), "trailing $");
        assert_eq!(v.substitute("open ${host"), "open ${host");
        assert_eq!(v.substitute(r"\$ $"), r"\$ $");
    }

    #[test]
    fn regex_values_are_escaped() {
        let v = vars();
        assert_eq!(
            v.substitute_regex(r"from ${host}: icmp_seq=\d+"),
            r"from 10\.0\.0\.2: icmp_seq=\d+"
        );
        assert_eq!(v.substitute_regex("prompt $"), "prompt $");
    }

    #[test]
    fn set_and_extend() {
        let mut v = Variables::new();
        assert!(v.is_empty());
        v.set("a", "1");
        v.extend([("b", "2")]);
        v.set("a", "3");
        assert_eq!(v.get("a"), Some("3"));
        assert_eq!(v.len(), 2);
        assert_eq!(v.iter().collect::<Vec<_>>(), [("a", "3"), ("b", "2")]);
    }
}
