// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Addresses of objects within a configuration.
//!
//! Runs refer to objects in the configuration under test in several places: `target` and
//! `replace` directives, `expect_failures` declarations, and the references made by assertions.
//! All of these are written as dotted traversals, for example `module.network.aws_vpc.main[0]`.
//!
//! Only the traversal syntax is understood here. Whether the object exists is up to the engine.

use crate::errors::AddressParseError;
use std::fmt;

/// The kind of object an [`Address`] refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AddressKind {
    /// A module call, e.g. `module.network`.
    Module,

    /// A managed or data resource, e.g. `aws_instance.web` or `data.aws_ami.ubuntu`.
    Resource,

    /// An input variable, e.g. `var.region`.
    Variable,

    /// An output value, e.g. `output.url`.
    Output,

    /// A check block, e.g. `check.health`.
    Check,

    /// A local value, e.g. `local.tags`.
    Local,

    /// The outputs of an earlier run in the same file, e.g. `run.setup`.
    Run,
}

impl AddressKind {
    /// Returns true if objects of this kind can declare check rules, and can therefore be named in
    /// `expect_failures`.
    pub fn is_checkable(self) -> bool {
        matches!(
            self,
            Self::Resource | Self::Variable | Self::Output | Self::Check
        )
    }

    fn to_static_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Resource => "resource",
            Self::Variable => "variable",
            Self::Output => "output",
            Self::Check => "check",
            Self::Local => "local value",
            Self::Run => "run",
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

/// A parsed address.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Address {
    // Stored normalized so that equal addresses compare equal.
    normalized: String,
    kind: AddressKind,
}

impl Address {
    /// Parses an address used in a `target` directive: a module or a resource.
    pub fn parse_target(input: &str) -> Result<Self, AddressParseError> {
        let address = Self::parse_exact(input)?;
        match address.kind() {
            AddressKind::Module | AddressKind::Resource => Ok(address),
            other => Err(AddressParseError::new(
                input,
                format!("a {other} cannot be targeted, only modules and resources can"),
            )),
        }
    }

    /// Parses an address used in a `replace` directive: a resource.
    pub fn parse_replace(input: &str) -> Result<Self, AddressParseError> {
        let address = Self::parse_exact(input)?;
        match address.kind() {
            AddressKind::Resource => Ok(address),
            other => Err(AddressParseError::new(
                input,
                format!("only resources can be replaced, but this address refers to a {other}"),
            )),
        }
    }

    /// Parses an address used in `expect_failures`: any object that can declare check rules.
    pub fn parse_checkable(input: &str) -> Result<Self, AddressParseError> {
        let address = Self::parse_exact(input)?;
        if address.kind().is_checkable() {
            Ok(address)
        } else {
            Err(AddressParseError::new(
                input,
                format!("a {} cannot report check failures", address.kind()),
            ))
        }
    }

    /// Parses a reference made by an assertion.
    ///
    /// References may continue past the referenced object into its attributes, e.g.
    /// `aws_instance.web.public_ip`. The returned address is the referenced object only.
    pub fn parse_reference(input: &str) -> Result<Self, AddressParseError> {
        let segments = parse_segments(input)?;
        let (kind, consumed) = classify(input, &segments)?;
        Ok(Self::from_segments(kind, &segments[..consumed]))
    }

    /// Returns the kind of object this address refers to.
    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    /// Returns the normalized string form of the address.
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Returns true if the object is declared directly in the root module.
    pub fn is_in_root_module(&self) -> bool {
        self.kind != AddressKind::Module && !self.normalized.starts_with("module.")
    }

    /// Returns this address with the instance key of the final object removed, so that
    /// `aws_instance.web[0]` becomes `aws_instance.web`.
    pub fn without_instance_key(&self) -> Self {
        let Ok(mut segments) = parse_segments(&self.normalized) else {
            // Normalized addresses always reparse.
            return self.clone();
        };
        if let Some(last) = segments.last_mut() {
            last.key = None;
        }
        Self::from_segments(self.kind, &segments)
    }

    fn parse_exact(input: &str) -> Result<Self, AddressParseError> {
        let segments = parse_segments(input)?;
        let (kind, consumed) = classify(input, &segments)?;
        if consumed != segments.len() {
            return Err(AddressParseError::new(
                input,
                format!(
                    "unexpected attribute `{}` after {kind} address",
                    segments[consumed].name
                ),
            ));
        }
        Ok(Self::from_segments(kind, &segments))
    }

    fn from_segments(kind: AddressKind, segments: &[Segment<'_>]) -> Self {
        let mut normalized = String::new();
        for (ix, segment) in segments.iter().enumerate() {
            if ix > 0 {
                normalized.push('.');
            }
            normalized.push_str(segment.name);
            if let Some(key) = segment.key {
                normalized.push('[');
                normalized.push_str(key);
                normalized.push(']');
            }
        }
        Self {
            normalized,
            kind,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

#[derive(Clone, Copy, Debug)]
struct Segment<'a> {
    name: &'a str,
    // The raw contents of an index, without brackets: `0` or `"key"`.
    key: Option<&'a str>,
}

fn parse_segments(input: &str) -> Result<Vec<Segment<'_>>, AddressParseError> {
    let input_trimmed = input.trim();
    if input_trimmed.is_empty() {
        return Err(AddressParseError::new(input, "address is empty"));
    }

    let mut segments = Vec::new();
    let mut rest = input_trimmed;
    loop {
        let name_len = rest
            .char_indices()
            .find(|&(ix, c)| {
                !(c.is_ascii_alphabetic() || c == '_' || (ix > 0 && (c.is_ascii_digit() || c == '-')))
            })
            .map_or(rest.len(), |(ix, _)| ix);
        if name_len == 0 {
            return Err(AddressParseError::new(
                input,
                format!("expected an identifier at `{rest}`"),
            ));
        }
        let name = &rest[..name_len];
        rest = &rest[name_len..];

        let key = if let Some(after_bracket) = rest.strip_prefix('[') {
            let (key, remaining) = parse_key(input, after_bracket)?;
            rest = remaining;
            Some(key)
        } else {
            None
        };
        segments.push(Segment { name, key });

        if rest.is_empty() {
            break;
        }
        match rest.strip_prefix('.') {
            Some(remaining) => rest = remaining,
            None => {
                return Err(AddressParseError::new(
                    input,
                    format!("unexpected characters `{rest}`"),
                ));
            }
        }
    }

    Ok(segments)
}

// Parses the inside of an index, returning the key and the input after the closing bracket.
fn parse_key<'a>(input: &str, after_bracket: &'a str) -> Result<(&'a str, &'a str), AddressParseError> {
    let end = if let Some(quoted) = after_bracket.strip_prefix('"') {
        let close = quoted
            .find('"')
            .ok_or_else(|| AddressParseError::new(input, "unterminated string in index"))?;
        // Include both quotes in the key.
        close + 2
    } else {
        after_bracket
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(after_bracket.len())
    };
    if end == 0 {
        return Err(AddressParseError::new(
            input,
            "index must be a number or a quoted string",
        ));
    }
    let key = &after_bracket[..end];
    let remaining = after_bracket[end..]
        .strip_prefix(']')
        .ok_or_else(|| AddressParseError::new(input, "expected `]` after index"))?;
    Ok((key, remaining))
}

// Returns the kind of the address and the number of segments that make up the address itself.
fn classify(input: &str, segments: &[Segment<'_>]) -> Result<(AddressKind, usize), AddressParseError> {
    let mut ix = 0;
    while ix < segments.len() && segments[ix].name == "module" {
        if ix + 1 >= segments.len() {
            return Err(AddressParseError::new(input, "module call name is missing"));
        }
        ix += 2;
    }
    if ix == segments.len() {
        return Ok((AddressKind::Module, ix));
    }

    let root_only = |kind: AddressKind| {
        if ix > 0 {
            Err(AddressParseError::new(
                input,
                format!("a {kind} cannot be addressed inside a module path"),
            ))
        } else if segments.len() < 2 {
            Err(AddressParseError::new(
                input,
                format!("{kind} name is missing"),
            ))
        } else {
            Ok((kind, 2))
        }
    };

    match segments[ix].name {
        "var" => root_only(AddressKind::Variable),
        "output" => root_only(AddressKind::Output),
        "check" => root_only(AddressKind::Check),
        "local" => root_only(AddressKind::Local),
        "run" => root_only(AddressKind::Run),
        "data" => {
            if segments.len() < ix + 3 {
                Err(AddressParseError::new(
                    input,
                    "data resource address must have a type and a name",
                ))
            } else {
                Ok((AddressKind::Resource, ix + 3))
            }
        }
        _ => {
            if segments.len() < ix + 2 {
                Err(AddressParseError::new(
                    input,
                    "resource address must have a type and a name",
                ))
            } else {
                Ok((AddressKind::Resource, ix + 2))
            }
        }
    }
}
