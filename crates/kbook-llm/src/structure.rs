//! Book outline model and parsing
//!
//! An outline is an ordered mapping from section title to either a description
//! or one level of sub-sections. Parsing keeps the key order of the response
//! and rejects anything deeper than two levels.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::LlmError;

/// A leaf inside a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsection {
    pub title: String,
    pub description: String,
}

/// One top-level section; each becomes a chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Leaf { title: String, description: String },
    Group { title: String, children: Vec<Subsection> },
}

impl Section {
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Leaf { title, .. } | Self::Group { title, .. } => title,
        }
    }

    /// The chapter's outline as handed to the chapter prompt: the description
    /// itself, or the sub-sections as canonical pretty JSON.
    #[must_use]
    pub fn payload(&self) -> String {
        match self {
            Self::Leaf { description, .. } => description.clone(),
            Self::Group { children, .. } => to_pretty_json(&Children(children)),
        }
    }
}

/// Ordered, unique-keyed outline of at most two levels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookStructure {
    sections: Vec<Section>,
}

impl BookStructure {
    /// Build from sections, merging duplicate titles (last value wins, first position kept)
    #[must_use]
    pub fn new(sections: impl IntoIterator<Item = Section>) -> Self {
        let mut structure = Self::default();
        for section in sections {
            structure.upsert(section);
        }
        structure
    }

    fn upsert(&mut self, section: Section) {
        match self
            .sections
            .iter_mut()
            .find(|existing| existing.title() == section.title())
        {
            Some(existing) => *existing = section,
            None => self.sections.push(section),
        }
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Canonical serialization: two-space indented JSON in key order
    #[must_use]
    pub fn to_pretty_json(&self) -> String {
        to_pretty_json(self)
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> String {
    // Keys are always strings, so serialization cannot fail.
    serde_json::to_string_pretty(value).unwrap_or_default()
}

struct Children<'a>(&'a [Subsection]);

impl Serialize for Children<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for child in self.0 {
            map.serialize_entry(&child.title, &child.description)?;
        }
        map.end()
    }
}

impl Serialize for BookStructure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for section in &self.sections {
            match section {
                Section::Leaf { title, description } => map.serialize_entry(title, description)?,
                Section::Group { title, children } => {
                    map.serialize_entry(title, &Children(children))?;
                }
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BookStructure {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(StructureVisitor)
    }
}

struct StructureVisitor;

impl<'de> Visitor<'de> for StructureVisitor {
    type Value = BookStructure;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object mapping section titles to descriptions or sub-sections")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut structure = BookStructure::default();
        while let Some((title, body)) = map.next_entry::<String, SectionBody>()? {
            structure.upsert(match body {
                SectionBody::Description(description) => Section::Leaf { title, description },
                SectionBody::Children(children) => Section::Group { title, children },
            });
        }
        Ok(structure)
    }
}

enum SectionBody {
    Description(String),
    Children(Vec<Subsection>),
}

impl<'de> Deserialize<'de> for SectionBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SectionBodyVisitor)
    }
}

struct SectionBodyVisitor;

impl<'de> Visitor<'de> for SectionBodyVisitor {
    type Value = SectionBody;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a description string or an object of sub-section descriptions")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(SectionBody::Description(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(SectionBody::Description(v))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut children: Vec<Subsection> = Vec::new();
        // Sub-section values must be strings; a nested object fails here.
        while let Some((title, description)) = map.next_entry::<String, String>()? {
            match children.iter_mut().find(|c| c.title == title) {
                Some(existing) => existing.description = description,
                None => children.push(Subsection { title, description }),
            }
        }
        Ok(SectionBody::Children(children))
    }
}

static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(\w*)?\s*\n?(.*?)\n?\s*```$").unwrap());

/// Remove one surrounding Markdown code fence, if present
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    FENCE
        .captures(trimmed)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().trim())
        .filter(|body| !body.is_empty())
        .unwrap_or(trimmed)
}

/// Parse the accumulated outline response.
///
/// # Errors
///
/// `LlmError::MalformedResponse` carrying the raw text when the body is not a
/// JSON object of the expected shape or has no sections.
pub fn parse_structured_result(text: &str) -> Result<BookStructure, LlmError> {
    let body = strip_code_fence(text);
    let structure: BookStructure =
        serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse {
            message: format!("outline is not valid JSON of the expected shape: {e}"),
            raw: text.to_string(),
        })?;
    if structure.is_empty() {
        return Err(LlmError::MalformedResponse {
            message: "outline has no sections".to_string(),
            raw: text.to_string(),
        });
    }
    Ok(structure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = r#"{"Zeta basics":"Start here",
        "Alpha topics":{"Sub B":"b","Sub A":"a"},
        "Middle":"m"}"#;

    #[test]
    fn key_order_is_preserved() {
        let s = parse_structured_result(SAMPLE).unwrap();
        let titles: Vec<&str> = s.sections().iter().map(Section::title).collect();
        assert_eq!(titles, ["Zeta basics", "Alpha topics", "Middle"]);
        match &s.sections()[1] {
            Section::Group { children, .. } => {
                assert_eq!(children[0].title, "Sub B");
                assert_eq!(children[1].title, "Sub A");
            }
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn group_payload_is_two_space_json_in_order() {
        let s = parse_structured_result(SAMPLE).unwrap();
        assert_eq!(s.sections()[0].payload(), "Start here");
        assert_eq!(
            s.sections()[1].payload(),
            "{\n  \"Sub B\": \"b\",\n  \"Sub A\": \"a\"\n}"
        );
    }

    #[test]
    fn full_structure_serializes_like_pretty_json() {
        let s = parse_structured_result(r#"{"A":"x","B":{"c":"d"}}"#).unwrap();
        assert_eq!(
            s.to_pretty_json(),
            "{\n  \"A\": \"x\",\n  \"B\": {\n    \"c\": \"d\"\n  }\n}"
        );
    }

    #[test]
    fn third_level_is_rejected() {
        let err = parse_structured_result(r#"{"A":{"B":{"C":"too deep"}}}"#).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse { .. }));
        assert_eq!(err.raw_response(), Some(r#"{"A":{"B":{"C":"too deep"}}}"#));
    }

    #[test]
    fn non_string_values_and_non_objects_are_rejected() {
        for bad in [r#"{"A":1}"#, r#"{"A":["x"]}"#, r#"["A"]"#, "\"A\"", "not json", "{}"] {
            assert!(
                matches!(parse_structured_result(bad), Err(LlmError::MalformedResponse { .. })),
                "{bad} should be malformed"
            );
        }
    }

    #[test]
    fn duplicate_keys_keep_first_position_last_value() {
        let s = parse_structured_result(r#"{"A":"one","B":"b","A":"two"}"#).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.sections()[0].payload(), "two");
        assert_eq!(s.sections()[1].title(), "B");
    }

    #[test]
    fn fences_with_and_without_language_tag() {
        let plain = parse_structured_result(r#"{"A":"x"}"#).unwrap();
        for fenced in [
            "```json\n{\"A\":\"x\"}\n```",
            "```\n{\"A\":\"x\"}\n```",
            "  ```json {\"A\":\"x\"} ```  ",
        ] {
            assert_eq!(parse_structured_result(fenced).unwrap(), plain, "{fenced}");
        }
    }

    #[test]
    fn empty_fence_falls_back_to_whole_text() {
        assert_eq!(strip_code_fence("``````"), "``````");
    }

    fn arb_section() -> impl Strategy<Value = Section> {
        let title = "[A-Za-z][A-Za-z0-9 ]{0,10}";
        let leaf = (title, "[a-z ]{0,12}")
            .prop_map(|(title, description)| Section::Leaf { title, description });
        let group = (title, prop::collection::vec((title, "[a-z ]{0,12}"), 1..4)).prop_map(
            |(title, pairs)| {
                let mut children: Vec<Subsection> = Vec::new();
                for (t, d) in pairs {
                    if !children.iter().any(|c| c.title == t) {
                        children.push(Subsection {
                            title: t,
                            description: d,
                        });
                    }
                }
                Section::Group { title, children }
            },
        );
        prop_oneof![leaf, group]
    }

    fn arb_structure() -> impl Strategy<Value = BookStructure> {
        prop::collection::vec(arb_section(), 1..8).prop_map(BookStructure::new)
    }

    proptest! {
        #[test]
        fn fenced_and_unfenced_parse_identically(s in arb_structure(), tag in "(json)?") {
            let body = s.to_pretty_json();
            let fenced = format!("```{tag}\n{body}\n```");
            let a = parse_structured_result(&body).unwrap();
            let b = parse_structured_result(&fenced).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a, s);
        }
    }
}
