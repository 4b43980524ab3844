// Shared prompt fragments.
// Each component that calls the model defines its own prompts alongside it;
// this file holds the cross-cutting pieces.

/// Appended to every prompt whose reply is parsed as JSON.
pub const JSON_BLOCK_INSTRUCTION: &str = "\
    You MUST return a single, valid JSON object enclosed in a ```json markdown block. \
    Your output must ONLY be the JSON object in the markdown block. \
    Do not include any other text or explanation.";

/// Appended to every image-editing prompt.
pub const FIDELITY_INSTRUCTION: &str = "\
    CRITICAL: Preserve the visual design exactly: font family, font size, colour, \
    weight, alignment, margins, spacing and every element you were not asked to change. \
    Return the complete edited page as a single image.";
