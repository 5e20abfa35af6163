//! The package constraint value type (`MatchSpec`).
//!
//! A `MatchSpec` names a package and optionally constrains its version, build
//! string, source channel and subdir. It is an immutable value with a
//! canonical string form; the manifest model treats it as atomic.

use crate::types::Subdir;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '!', '~'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("match spec must not be empty")]
    Empty,
    #[error("invalid package name '{name}' in match spec '{spec}'")]
    InvalidName { spec: String, name: String },
    #[error("unexpected trailing tokens in match spec '{0}'")]
    TrailingTokens(String),
    #[error("malformed bracket expression in match spec '{0}'")]
    MalformedBrackets(String),
    #[error("unknown key '{key}' in match spec '{spec}' (expected version, build, channel or subdir)")]
    UnknownKey { spec: String, key: String },
    #[error("build string '{build}' in match spec '{spec}' looks like a version constraint")]
    InvalidBuild { spec: String, build: String },
}

/// A package name plus version/build/channel predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchSpec {
    name: String,
    version: Option<String>,
    build: Option<String>,
    channel: Option<String>,
    subdir: Option<Subdir>,
}

impl MatchSpec {
    /// A spec matching any version of `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            build: None,
            channel: None,
            subdir: None,
        }
    }

    /// Set the version expression. `*` and the empty string mean "any".
    /// Whitespace around `,`, `|` and comparison operators is dropped.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = wildcard_to_none(squash_constraint_whitespace(&version.into()));
        self
    }

    #[must_use]
    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = wildcard_to_none(build.into());
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        let channel = channel.into();
        self.channel = (!channel.trim().is_empty()).then_some(channel);
        self
    }

    #[must_use]
    pub fn with_subdir(mut self, subdir: impl Into<Subdir>) -> Self {
        self.subdir = Some(subdir.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn subdir(&self) -> Option<&Subdir> {
        self.subdir.as_ref()
    }

    /// True when the spec carries nothing beyond a name and a version, so it
    /// can be written as a plain `name = "version"` manifest entry.
    pub fn is_version_only(&self) -> bool {
        self.build.is_none() && self.channel.is_none() && self.subdir.is_none()
    }
}

fn wildcard_to_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "*" {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Drop whitespace that only separates parts of one version expression:
/// after an operator, `,` or `|`, and before `,` or `|`. Runs of remaining
/// whitespace collapse to one character.
fn squash_constraint_whitespace(input: &str) -> String {
    let chars: Vec<char> = input.trim().chars().collect();
    let mut out = String::with_capacity(chars.len());
    for (idx, &ch) in chars.iter().enumerate() {
        if ch.is_whitespace() {
            let prev = out.chars().last();
            let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
            let joins_prev = prev.is_some_and(|c| {
                c.is_whitespace() || matches!(c, ',' | '|') || OPERATOR_CHARS.contains(&c)
            });
            let joins_next = next.is_some_and(|c| matches!(c, ',' | '|'));
            if joins_prev || joins_next {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

fn validate_name(spec: &str, name: &str) -> Result<(), SpecError> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(SpecError::InvalidName {
            spec: spec.to_owned(),
            name: name.to_owned(),
        })
    }
}

/// Split `channel[/subdir]`; the suffix only counts as a subdir if conda knows it.
fn split_channel(prefix: &str) -> (String, Option<Subdir>) {
    if let Some((channel, subdir)) = prefix.rsplit_once('/') {
        let subdir = Subdir::from(subdir);
        if subdir.is_known() {
            return (channel.to_owned(), Some(subdir));
        }
    }
    (prefix.to_owned(), None)
}

/// Split a bracket body on commas that are not inside quotes.
fn split_bracket_pairs(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (idx, ch) in inner.char_indices() {
        match (quote, ch) {
            (None, '\'' | '"') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => {
                parts.push(&inner[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

fn apply_brackets(spec: &str, inner: &str, out: &mut MatchSpec) -> Result<(), SpecError> {
    for pair in split_bracket_pairs(inner) {
        if pair.trim().is_empty() {
            continue;
        }
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| SpecError::MalformedBrackets(spec.to_owned()))?;
        let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
        match key.trim() {
            "version" => out.version = wildcard_to_none(squash_constraint_whitespace(value)),
            "build" => out.build = wildcard_to_none(value.to_owned()),
            "channel" => out.channel = Some(value.to_owned()),
            "subdir" => out.subdir = Some(Subdir::from(value)),
            other => {
                return Err(SpecError::UnknownKey {
                    spec: spec.to_owned(),
                    key: other.to_owned(),
                })
            }
        }
    }
    Ok(())
}

impl FromStr for MatchSpec {
    type Err = SpecError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let spec = input.trim();
        if spec.is_empty() {
            return Err(SpecError::Empty);
        }

        let (channel, subdir, rest) = match spec.split_once("::") {
            Some((prefix, rest)) => {
                let (channel, subdir) = split_channel(prefix);
                (Some(channel), subdir, rest)
            }
            None => (None, None, spec),
        };

        let (body, brackets) = match rest.find('[') {
            Some(idx) => {
                let inner = rest[idx + 1..]
                    .trim_end()
                    .strip_suffix(']')
                    .ok_or_else(|| SpecError::MalformedBrackets(spec.to_owned()))?;
                (&rest[..idx], Some(inner))
            }
            None => (rest, None),
        };

        let body = squash_constraint_whitespace(body);
        let mut tokens = body.split_whitespace();
        let first = tokens.next().ok_or(SpecError::Empty)?;
        let (name, glued_version) = match first.find(OPERATOR_CHARS) {
            Some(idx) => (&first[..idx], Some(&first[idx..])),
            None => (first, None),
        };
        validate_name(spec, name)?;

        let version = match glued_version {
            Some(v) => Some(v.to_owned()),
            None => tokens.next().map(str::to_owned),
        };
        let build = tokens.next().map(str::to_owned);
        if tokens.next().is_some() {
            return Err(SpecError::TrailingTokens(spec.to_owned()));
        }
        if let Some(build) = &build {
            if build.starts_with(OPERATOR_CHARS) || build.starts_with([',', '|']) {
                return Err(SpecError::InvalidBuild {
                    spec: spec.to_owned(),
                    build: build.clone(),
                });
            }
        }

        let mut out = MatchSpec {
            name: name.to_owned(),
            version: version.and_then(wildcard_to_none),
            build: build.and_then(wildcard_to_none),
            channel,
            subdir,
        };
        if let Some(inner) = brackets {
            apply_brackets(spec, inner, &mut out)?;
        }
        Ok(out)
    }
}

impl fmt::Display for MatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(channel) = &self.channel {
            f.write_str(channel)?;
            if let Some(subdir) = &self.subdir {
                write!(f, "/{subdir}")?;
            }
            f.write_str("::")?;
        }
        f.write_str(&self.name)?;

        let has_space = |v: Option<&str>| v.is_some_and(|v| v.contains(char::is_whitespace));
        let mut brackets = Vec::new();
        if has_space(self.version()) || has_space(self.build()) {
            // Not expressible positionally; spell every field out.
            if let Some(version) = &self.version {
                brackets.push(format!("version='{version}'"));
            }
            if let Some(build) = &self.build {
                brackets.push(format!("build='{build}'"));
            }
        } else {
            match (&self.version, &self.build) {
                (Some(version), build) => {
                    if version.starts_with(OPERATOR_CHARS) {
                        f.write_str(version)?;
                    } else {
                        write!(f, " {version}")?;
                    }
                    if let Some(build) = build {
                        write!(f, " {build}")?;
                    }
                }
                (None, Some(build)) => write!(f, " * {build}")?,
                (None, None) => {}
            }
        }
        if self.channel.is_none() {
            if let Some(subdir) = &self.subdir {
                brackets.push(format!("subdir={subdir}"));
            }
        }
        if !brackets.is_empty() {
            write!(f, "[{}]", brackets.join(", "))?;
        }
        Ok(())
    }
}

impl PartialOrd for MatchSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MatchSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl Serialize for MatchSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MatchSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Parse a batch of spec strings, stopping at the first invalid one.
pub fn parse_specs<I, S>(specs: I) -> Result<Vec<MatchSpec>, SpecError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    specs.into_iter().map(|s| s.as_ref().parse()).collect()
}
