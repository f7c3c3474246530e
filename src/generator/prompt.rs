//! Prompt construction.

use chrono::{DateTime, Timelike, Utc};

/// Letters the first-word rule rotates through. `X` and `Z` are left out
/// because few nouns start with them.
pub const FIRST_LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWY";

/// Fixed format contract sent with every request.
pub const FORMAT_CONTRACT: &str = "\
You must obey this FORMAT CONTRACT exactly.

OBJECTIVE
Write one coherent, quietly philosophical sentence of AT MOST 28 tokens.
End naturally when the sentence is complete; do not pad to reach 28 tokens.

HARD RULES
- Output no more than 6 (SIX) lines.
- After the final line, print a separate control line: END
- The END control line does not count toward the 6 line limit.
- Each line MUST be less than 20 characters.
- Do NOT split or hyphenate words.
- Apostrophes within words, commas, and full stops are allowed; no other punctuation, digits, emojis, or symbols.
- The FIRST WORD on line 1 must be a simple concrete noun.
- The lines together must read as a single sentence.
- Only one sentence total. End it with a full stop and write nothing after it.

SELF-CHECK BEFORE YOU PRINT
If any rule is violated, stop, re-generate, then print. Always end on a complete sentence.
";

/// Letter the response must start with during the minute containing `now`.
pub fn first_letter(now: DateTime<Utc>) -> char {
    let letters = FIRST_LETTERS.as_bytes();
    let idx = now.minute() as usize % letters.len();
    char::from(letters[idx])
}

/// Builds the full prompt for the minute containing `now`.
pub fn build_prompt(now: DateTime<Utc>) -> String {
    format!(
        "{FORMAT_CONTRACT}\nEXTRA RULE: The very first word must start with '{}'.",
        first_letter(now)
    )
}
