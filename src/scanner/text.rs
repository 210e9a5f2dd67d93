use regex::Regex;
use std::sync::OnceLock;

/// Custom emojis as Discord renders them, then flags, then pictographs with
/// their skin tone and joined sequences.
const EMOJI_PATTERN: &str = r"<a?:\w+:\d+>|\p{Regional_Indicator}{2}|(?:\p{Emoji_Presentation}\x{FE0F}?|\p{Extended_Pictographic}\x{FE0F})\p{Emoji_Modifier}?(?:\x{200D}\p{Extended_Pictographic}\x{FE0F}?\p{Emoji_Modifier}?)*";

/// At least three characters, starting and ending with a letter.
const WORD_PATTERN: &str = r"^\W*([^\W\d_][\w\-']+[^\W\d_])";

fn emoji_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EMOJI_PATTERN).expect("valid emoji regex"))
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(WORD_PATTERN).expect("valid word regex"))
}

fn separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\-']+").expect("valid separator regex"))
}

/// Emojis of `content` in order of appearance, duplicates included.
pub fn emojis(content: &str) -> impl Iterator<Item = &str> {
    emoji_regex().find_iter(content).map(|m| m.as_str())
}

/// Custom guild emoji (`<:name:id>`), as opposed to a Unicode one.
pub fn is_custom_emoji(key: &str) -> bool {
    key.starts_with('<')
}

/// Lowercased words of `content`, duplicates included.
pub fn words(content: &str) -> Vec<String> {
    separator_regex()
        .split(content)
        .filter_map(|token| word_regex().captures(token)?.get(1))
        .map(|word| word.as_str().to_lowercase())
        .collect()
}
