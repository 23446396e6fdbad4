//! Prompt construction for the three call kinds
//!
//! Every optional field has a fixed placeholder so the model always sees the
//! same sections in the same order.

use kbook_utils::UserInputs;

pub const NO_ADDITIONAL_INFO: &str = "None";
pub const NO_REFERENCE_TEXTS: &str = "No reference texts provided by the user.";
pub const NO_PREVIOUS_CHAPTERS: &str = "No chapters written yet.";
pub const NOT_A_REGENERATION: &str = "None (this is not a regeneration request or no specific changes were requested for regeneration).";
pub const NOT_A_REWRITE: &str = "None (this is not a rewrite request or no specific instructions were provided for this chapter).";

/// Marker closing every chapter in the continuity context
pub const END_OF_PREVIOUS_CHAPTER: &str = "---END OF PREVIOUS CHAPTER---";

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

fn additional_info(inputs: &UserInputs) -> &str {
    or_placeholder(&inputs.additional_info, NO_ADDITIONAL_INFO)
}

fn regeneration_request(inputs: &UserInputs) -> &str {
    or_placeholder(
        inputs.outline_regeneration_prompt.as_deref().unwrap_or_default(),
        NOT_A_REGENERATION,
    )
}

/// Prompt asking for the book outline as one JSON object
#[must_use]
pub fn structure_prompt(inputs: &UserInputs, reference_text: &str) -> String {
    let chapters = inputs.number_of_chapters;
    format!(
        r#"Respond with JSON only. The whole reply must be one complete, syntactically valid JSON object with balanced braces and correct commas, and nothing before or after it.

The object must have exactly {chapters} top-level keys. Each top-level key is the title of a main section and each main section becomes one chapter of the book. Do not add or drop main sections.

Shape of the object, shown for a two-chapter request:
{{"Title of main section 1":"Description of main section 1",
 "Title of main section 2":{{"Title of sub-section A":"Description of sub-section A","Title of sub-section B":"Description of sub-section B"}}}}

Design a complete outline with exactly {chapters} main sections for the subject below. Leave out front and back matter such as forewords, author's notes, introductions, conclusions, and summaries. A main section may have sub-sections, but sub-sections may not have their own sub-sections. Give every section a clear title and description; together they should cover the subject fully without overlapping.

Write in this language: {language}.

<subject>{subject}</subject>

Reference texts (use them as extra context on the subject and the desired style if present; otherwise ignore this part):
<reference_texts>
{references}
</reference_texts>

Additional instructions:
{additional}

If this is a regeneration request, revise the ENTIRE outline according to the feedback below. Otherwise ignore this part:
<user_feedback_on_previous_outline>
{feedback}
</user_feedback_on_previous_outline>
"#,
        language = inputs.language,
        subject = inputs.subject,
        references = or_placeholder(reference_text, NO_REFERENCE_TEXTS),
        additional = additional_info(inputs),
        feedback = regeneration_request(inputs),
    )
}

/// Prompt asking for a single book title for an outline
#[must_use]
pub fn title_prompt(inputs: &UserInputs, structure_json: &str, reference_text: &str) -> String {
    format!(
        r#"Write one title for a book with the topic and outline below. Reply with the title alone: no explanation, no quotes, no extra symbols. The title must be between 7 and 25 words long and should make a reader want to pick the book up.

Write in this language: {language}.

<subject>{subject}</subject>

<book_structure>
{structure_json}
</book_structure>

Reference texts (extra context if present; otherwise ignore this part):
<reference_texts>
{references}
</reference_texts>

Additional instructions:
{additional}

If this is a regeneration request, use the feedback below together with the revised outline to refine the title. Otherwise ignore this part:
<user_feedback_on_previous_outline>
{feedback}
</user_feedback_on_previous_outline>
"#,
        language = inputs.language,
        subject = inputs.subject,
        references = or_placeholder(reference_text, NO_REFERENCE_TEXTS),
        additional = additional_info(inputs),
        feedback = regeneration_request(inputs),
    )
}

/// Everything a chapter prompt is built from
#[derive(Debug, Clone, Copy)]
pub struct ChapterPrompt<'a> {
    pub inputs: &'a UserInputs,
    pub title: &'a str,
    /// This chapter's slice of the outline
    pub unit_outline: &'a str,
    /// The whole outline, canonically serialized
    pub full_structure: &'a str,
    /// Continuity context built from earlier finished chapters
    pub prior_text: &'a str,
    pub reference_text: &'a str,
    pub rewrite_instructions: Option<&'a str>,
}

/// Prompt asking for one chapter body in Markdown
#[must_use]
pub fn chapter_prompt(args: &ChapterPrompt<'_>) -> String {
    let inputs = args.inputs;
    format!(
        r###"You are an expert author. Write one complete, well-structured chapter from the details below.
Your reply MUST start with the chapter title as a level-2 Markdown heading ("## {title}") followed directly by the chapter body. Do not add any preamble, commentary, or anything other than the heading and the body; the reply is inserted into the book as-is.

Chapter parameters:
Approximate length of the body, excluding the heading: {length} words.
Reading complexity from 1 (simplest) to 10 (most advanced): {level}.

Context:
Language: {language}
Book subject: {subject}
Additional instructions for the whole book: {additional}

Reference texts (use them for context, style, and facts to include if present; otherwise ignore this part):
<reference_texts>
{references}
</reference_texts>

Chapter title (use it for the level-2 heading): {title}
Chapter outline (description and any sub-sections of THIS chapter; base the body on it):
{unit_outline}

Full book outline (to place this chapter within the book):
{full_structure}

Instructions specific to writing or rewriting this chapter (they take priority over the general instructions):
<rewrite_instructions>
{rewrite}
</rewrite_instructions>

Chapters written so far (for continuity; each ends with the "{marker}" marker):
{prior}
{marker}
"###,
        title = args.title,
        length = inputs.content_length,
        level = inputs.reading_level,
        language = inputs.language,
        subject = inputs.subject,
        additional = additional_info(inputs),
        references = or_placeholder(args.reference_text, NO_REFERENCE_TEXTS),
        unit_outline = args.unit_outline,
        full_structure = args.full_structure,
        rewrite = or_placeholder(args.rewrite_instructions.unwrap_or_default(), NOT_A_REWRITE),
        prior = or_placeholder(args.prior_text, NO_PREVIOUS_CHAPTERS),
        marker = END_OF_PREVIOUS_CHAPTER,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_prompt_uses_placeholders_when_fields_are_empty() {
        let inputs = UserInputs::new("Tide pools");
        let prompt = structure_prompt(&inputs, "  ");
        assert!(prompt.contains("exactly 6 top-level keys"));
        assert!(prompt.contains("<subject>Tide pools</subject>"));
        assert!(prompt.contains(NO_REFERENCE_TEXTS));
        assert!(prompt.contains("Additional instructions:\nNone\n"));
        assert!(prompt.contains(NOT_A_REGENERATION));
    }

    #[test]
    fn regeneration_feedback_reaches_structure_and_title_prompts() {
        let inputs =
            UserInputs::new("Tide pools").with_regeneration_prompt("Add a chapter on crabs");
        assert!(structure_prompt(&inputs, "").contains("Add a chapter on crabs"));
        let title = title_prompt(&inputs, "{\n  \"A\": \"x\"\n}", "Reference File: r\nContent:\nz");
        assert!(title.contains("Add a chapter on crabs"));
        assert!(title.contains("<book_structure>\n{\n  \"A\": \"x\"\n}\n</book_structure>"));
        assert!(title.contains("Reference File: r"));
        assert!(!title.contains(NOT_A_REGENERATION));
    }

    #[test]
    fn chapter_prompt_carries_all_parts() {
        let mut inputs = UserInputs::new("Tide pools");
        inputs.language = "es".into();
        inputs.additional_info = "Keep it playful".into();
        let args = ChapterPrompt {
            inputs: &inputs,
            title: "Anemones",
            unit_outline: "Soft bodied predators",
            full_structure: "{}",
            prior_text: "",
            reference_text: "",
            rewrite_instructions: Some("Shorter sentences"),
        };
        let prompt = chapter_prompt(&args);
        assert!(prompt.contains("\"## Anemones\""));
        assert!(prompt.contains("7000 words"));
        assert!(prompt.contains("Language: es"));
        assert!(prompt.contains("Keep it playful"));
        assert!(
            prompt.contains("<rewrite_instructions>\nShorter sentences\n</rewrite_instructions>")
        );
        assert!(prompt.contains(NO_PREVIOUS_CHAPTERS));
        assert!(prompt.trim_end().ends_with(END_OF_PREVIOUS_CHAPTER));
    }

    #[test]
    fn chapter_prompt_without_rewrite_uses_note() {
        let inputs = UserInputs::new("Tide pools");
        let prompt = chapter_prompt(&ChapterPrompt {
            inputs: &inputs,
            title: "T",
            unit_outline: "o",
            full_structure: "{}",
            prior_text: "Chapter: A\nbody\n\n---END OF PREVIOUS CHAPTER---\n\n",
            reference_text: "",
            rewrite_instructions: None,
        });
        assert!(prompt.contains(NOT_A_REWRITE));
        assert!(prompt.contains("Chapter: A\nbody"));
        assert!(!prompt.contains(NO_PREVIOUS_CHAPTERS));
    }

    #[test]
    fn chapter_prompt_keeps_heading_instruction_and_marker_verbatim() {
        let inputs = UserInputs::new("Tide pools");
        let prompt = chapter_prompt(&ChapterPrompt {
            inputs: &inputs,
            title: "Hermit crabs",
            unit_outline: "Borrowed shells",
            full_structure: "{}",
            prior_text: "",
            reference_text: "",
            rewrite_instructions: None,
        });
        assert!(prompt.contains("(\"## Hermit crabs\")"));
        assert!(prompt.contains("Chapter title (use it for the level-2 heading): Hermit crabs"));
        assert!(prompt.contains("---END OF PREVIOUS CHAPTER---"));
        assert_eq!(prompt.matches(END_OF_PREVIOUS_CHAPTER).count(), 2);
    }
}
