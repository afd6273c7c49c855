//! Fixed prompts and description sanitizing

/// Instruction sent with the photo to the describe model
pub const DESCRIBE_PROMPT: &str = "Describe this photo in great detail. Do not mention notable people or landmarks by name. If people appear in the photo, describe their apperances (skin tone, facial features, etc.) in detail.";

/// Strip a description down to something safe to use as a generation prompt
///
/// Keeps ASCII letters, digits, spaces and `. , ! ? ' " -`. Other whitespace
/// becomes a space; everything else (markup, control characters, non-ASCII)
/// is dropped.
#[must_use]
pub fn sanitize_prompt(description: &str) -> String {
    description
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | ' ' | '.' | ',' | '!' | '?' | '\'' | '"' | '-' => {
                Some(c)
            }
            c if c.is_whitespace() => Some(' '),
            _ => None,
        })
        .collect()
}
