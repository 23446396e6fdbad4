//! Flattening an approved outline into chapter tasks

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use kbook_llm::BookStructure;

use crate::tasks::ChapterTask;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NON_ID_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9-]").unwrap());

/// Turn a section title into an id fragment: whitespace runs become `-`,
/// anything but ASCII letters, digits, and `-` is dropped.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let dashed = WHITESPACE_RUN.replace_all(title, "-");
    NON_ID_CHAR.replace_all(&dashed, "").into_owned()
}

/// One pending task per top-level section, in outline order.
///
/// Ids are `<sanitized title>-<token>-<index>`; a title that sanitizes to
/// nothing uses `chapter`.
#[must_use]
pub fn decompose_with_token(structure: &BookStructure, token: &str) -> Vec<ChapterTask> {
    structure
        .sections()
        .iter()
        .enumerate()
        .map(|(index, section)| {
            let sanitized = sanitize_title(section.title());
            let stem = if sanitized.is_empty() {
                "chapter"
            } else {
                sanitized.as_str()
            };
            ChapterTask::new(
                format!("{stem}-{token}-{index}"),
                section.title().to_string(),
                section.payload(),
            )
        })
        .collect()
}

/// [`decompose_with_token`] using the current time in milliseconds as token
#[must_use]
pub fn decompose(structure: &BookStructure) -> Vec<ChapterTask> {
    decompose_with_token(structure, &Utc::now().timestamp_millis().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskStatus;
    use kbook_llm::{Section, Subsection, parse_structured_result};
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn sanitize_matches_id_rules() {
        assert_eq!(sanitize_title("Hello  World!"), "Hello-World");
        assert_eq!(sanitize_title(" lead\tand trail "), "-lead-and-trail-");
        assert_eq!(sanitize_title("Ünïcode ☃"), "ncode-");
        assert_eq!(sanitize_title("???"), "");
    }

    #[test]
    fn sanitize_collapses_mixed_whitespace_and_keeps_dashes() {
        assert_eq!(sanitize_title("Tide \t\n Pools - Part 2"), "Tide-Pools---Part-2");
        assert_eq!(sanitize_title("a\u{00A0}b"), "a-b");
        assert_eq!(sanitize_title("crab's_shell.v2"), "crabsshellv2");
    }

    #[test]
    fn tasks_follow_outline_order_with_payloads() {
        let structure = parse_structured_result(
            r#"{"Why Tides?":"Moon and sun","Life":{"Crabs":"c","Snails":"s"},"!!!":"odd"}"#,
        )
        .unwrap();
        let tasks = decompose_with_token(&structure, "42");
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["Why-Tides-42-0", "Life-42-1", "chapter-42-2"]);
        assert_eq!(tasks[0].outline, "Moon and sun");
        assert_eq!(tasks[1].outline, "{\n  \"Crabs\": \"c\",\n  \"Snails\": \"s\"\n}");
        assert_eq!(tasks[1].path, ["Life"]);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending && t.content.is_empty()));
    }

    #[test]
    fn clock_token_keeps_ids_unique() {
        let structure = parse_structured_result(r#"{"A":"x","A ":"y"}"#).unwrap();
        let tasks = decompose(&structure);
        assert_eq!(tasks.len(), 2);
        assert_ne!(tasks[0].id, tasks[1].id);
    }

    fn arb_structure() -> impl Strategy<Value = BookStructure> {
        let section = prop_oneof![
            ("[A-Za-z ]{1,12}", "[a-z]{0,8}")
                .prop_map(|(title, description)| Section::Leaf { title, description }),
            ("[A-Za-z ]{1,12}", "[a-z]{1,6}", "[a-z]{0,8}").prop_map(|(title, sub, d)| {
                Section::Group {
                    title,
                    children: vec![Subsection {
                        title: sub,
                        description: d,
                    }],
                }
            }),
        ];
        prop::collection::vec(section, 0..12).prop_map(BookStructure::new)
    }

    proptest! {
        #[test]
        fn one_pending_task_per_section(structure in arb_structure()) {
            let tasks = decompose_with_token(&structure, "7");
            prop_assert_eq!(tasks.len(), structure.len());
            let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
            prop_assert_eq!(ids.len(), tasks.len());
            for (task, section) in tasks.iter().zip(structure.sections()) {
                prop_assert_eq!(task.title.as_str(), section.title());
                prop_assert_eq!(&task.outline, &section.payload());
                prop_assert_eq!(task.status, TaskStatus::Pending);
                prop_assert!(task.content.is_empty());
            }
        }
    }
}
