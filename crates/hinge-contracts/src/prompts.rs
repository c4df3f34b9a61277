use crate::analysis::{COMMENT_SENTINEL, MAX_COMMENT_CHARS};
use crate::preferences::GreenFlags;

/// Rating above which the full-analysis prompt tells the model to ignore
/// every other factor. This is a product policy carried as-is.
pub const ATTRACTIVENESS_OVERRIDE_RATING: u8 = 8;

const JSON_ONLY_RULES: &str = "Respond with ONLY a JSON object. Do not wrap it in markdown, \
do not use code fences, do not add any text before or after the JSON.";

fn response_schema() -> String {
    format!(
        "{{\"rating\": <integer 1-10>, \"decision\": \"ENGAGE\" or \"NEXT_PROFILE\", \
\"comment\": <string of at most {MAX_COMMENT_CHARS} characters, or \"{COMMENT_SENTINEL}\" when decision is NEXT_PROFILE>, \
\"reason\": <short string>}}"
    )
}

pub fn system_prompt() -> String {
    format!(
        "You review dating profile screenshots and reply in strict JSON. {JSON_ONLY_RULES}"
    )
}

/// Single-screenshot triage prompt. The reply is scanned for red-flag
/// keywords, so the model is told to describe only what it sees.
pub fn quick_analysis_prompt() -> String {
    format!(
        "This is the first screenshot of a dating profile. Give a fast first impression.\n\
Rate the profile from 1 to 10 based on overall appeal.\n\
Keep the reason to what is visible; do not mention traits that are absent.\n\
Use decision NEXT_PROFILE and comment \"{COMMENT_SENTINEL}\" for this quick pass.\n\
Return exactly this JSON shape:\n{schema}\n{JSON_ONLY_RULES}",
        schema = response_schema(),
    )
}

pub fn full_analysis_prompt(green_flags: &GreenFlags, screenshot_count: usize) -> String {
    let interests = green_flags.interests.join(", ");
    let exercise = green_flags.exercise_habits.join(", ");
    let education = green_flags.education.join(", ");
    format!(
        "You are given {screenshot_count} screenshots of one dating profile, in scroll order.\n\
Identify the person the profile belongs to and read every prompt answer and detail.\n\
Rate the profile from 1 to 10.\n\
Positive signals: age between {min_age} and {max_age}; education: {education}; \
exercise: {exercise}; interests: {interests}.\n\
If physical attractiveness is above {override_rating}, ignore all other factors and rate on attractiveness alone.\n\
If you decide to ENGAGE, write a short, warm, specific comment referencing something \
visible in the profile (a photo or a prompt answer), at most {MAX_COMMENT_CHARS} characters.\n\
If you decide NEXT_PROFILE, set comment to \"{COMMENT_SENTINEL}\".\n\
Return exactly this JSON shape:\n{schema}\n{JSON_ONLY_RULES}",
        min_age = green_flags.min_age,
        max_age = green_flags.max_age,
        override_rating = ATTRACTIVENESS_OVERRIDE_RATING,
        schema = response_schema(),
    )
}

/// Asks the model to pull the JSON object back out of its own malformed reply.
pub fn repair_prompt(raw_response: &str) -> String {
    format!(
        "The following text was supposed to be a single JSON object but could not be parsed.\n\
Extract the JSON object and return it with the keys rating, decision, comment, reason.\n\
Remove any markdown formatting, code fences (```), labels or commentary.\n\
Return ONLY the raw JSON object, nothing else.\n\n\
Text:\n{raw_response}"
    )
}
