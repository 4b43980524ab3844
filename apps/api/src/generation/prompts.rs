// All model prompt templates for the tailoring pipeline.
// Reuses cross-cutting fragments from llm_client::prompts.

/// Candidate generation prompt.
/// Replace: {job_title}, {company_name}, {page_count}, {max_page_index},
///          {json_instruction}, {job_description}
pub const TEXT_ASSETS_PROMPT_TEMPLATE: &str = r#"You are a professional resume tailoring assistant. Your task is to analyze a user's resume (provided as {page_count} page images, in order) and a job description to propose precise, reviewable edits.

Instructions:
1. Analyze: Deeply understand the original resume's content and the key requirements of the job description for "{job_title}" at "{company_name}".
2. Generate the following assets:
   - A professional cover letter.
   - An executive summary explaining the tailoring strategy.
   - A list of ATS keywords incorporated.
   - An itemized list of changes. Each change MUST specify:
     * "section": the resume section it belongs to (e.g. "Experience", "Skills").
     * "summary": a short human-readable description of the change.
     * "originalText": the EXACT, VERBATIM text span from the resume that is replaced. Use an empty string if the change is a pure addition.
     * "newText": the proposed new text.
     * "pageIndex": the zero-based index of the page image that contains the change (0 to {max_page_index}).
3. Keep each change small and self-contained so it can be applied on its own.

{json_instruction}

Example JSON format:
```json
{
  "coverLetter": "Dear Hiring Manager,\n\nI am writing to express my keen interest...",
  "executiveSummary": "The resume was updated to highlight project management skills...",
  "changesMade": [
    {
      "section": "Experience",
      "summary": "Quantified team leadership",
      "originalText": "Led team",
      "newText": "Led a team of 5 engineers",
      "pageIndex": 0
    }
  ],
  "atsKeywords": ["Product Roadmap", "Agile", "Data Analysis"]
}
```

Job Description:
---
{job_description}
---"#;

pub const EXTRACT_TEXT_PROMPT: &str = "Transcribe all the text from the following resume images. \
    Preserve the original line breaks and basic paragraph structure. \
    Output only the plain text content.";

/// Final text synthesis prompt.
/// Replace: {page_count}, {original_text}, {applied_json}, {rejected_json}, {json_instruction}
pub const FINAL_TEXT_PROMPT_TEMPLATE: &str = r#"You are a professional resume editor. Rewrite the resume text below so that it incorporates ONLY the approved changes. Ignore the rejected changes entirely; their original wording must remain.

The result must read as one cohesive document and MUST be split into exactly {page_count} strings, one per page, in page order. If there are no approved changes, return the original text unchanged, split into {page_count} pages.

Original resume text:
---
{original_text}
---

Approved changes (apply all of these):
{applied_json}

Rejected changes (do NOT apply any of these):
{rejected_json}

{json_instruction}

Example JSON format:
```json
{
  "rewrittenResumeText": [
    "John Doe\n... (full text for the first page) ...",
    "... (full text for the second page) ..."
  ]
}
```"#;

/// Single-change image edit, addition shape.
/// Replace: {section}, {new_text}, {fidelity_instruction}
pub const PATCH_ADDITION_PROMPT_TEMPLATE: &str = r#"You are editing an image of a resume page. Make exactly one change.

Task: ADD new text.
1. Locate the "{section}" section on this page.
2. Insert the following text at the most natural position in that section (usually the end), matching the style of neighbouring entries:
---
{new_text}
---
3. Do not remove or reword any existing text.

{fidelity_instruction}"#;

/// Single-change image edit, replacement shape.
/// Replace: {section}, {original_text}, {new_text}, {fidelity_instruction}
pub const PATCH_REPLACEMENT_PROMPT_TEMPLATE: &str = r#"You are editing an image of a resume page. Make exactly one change.

Task: REPLACE existing text.
1. In the "{section}" section, locate the text described below. The transcription may be imperfect, so match it by meaning if the wording differs slightly:
---
{original_text}
---
2. Replace it with:
---
{new_text}
---
3. Reflow only that section as little as needed. Leave the rest of the page untouched.

{fidelity_instruction}"#;

/// Replacement whose original text could not be found in the transcription.
/// Replace: {section}, {original_text}, {new_text}, {fidelity_instruction}
pub const PATCH_FALLBACK_PROMPT_TEMPLATE: &str = r#"You are editing an image of a resume page. Make exactly one change.

Task: REPLACE or ADD text.
1. In the "{section}" section, find the passage closest in meaning to:
---
{original_text}
---
2. If such a passage exists, replace it with the new text below. If nothing in the section matches, insert the new text into the section as a new entry instead, matching the style of neighbouring entries:
---
{new_text}
---
3. Reflow only that section as little as needed. Leave the rest of the page untouched.

{fidelity_instruction}"#;
