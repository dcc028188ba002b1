//! Text cleanup and tokenization shared by the fingerprint and similarity passes.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap());

static HIGHLIGHT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?b>").unwrap());

// [뉴스1전북], (속보), <단독>, 【여론조사】
static TITLE_BRACKETS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"\[.*?\]", r"\(.*?\)", r"<.*?>", r"【.*?】"]
        .iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect()
});

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").unwrap());

fn decode_entity(name: &str) -> Option<String> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }

    let decoded = match name {
        "quot" => "\"",
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "apos" => "'",
        "nbsp" => " ",
        "middot" => "·",
        "hellip" => "…",
        "lsquo" => "‘",
        "rsquo" => "’",
        "ldquo" => "“",
        "rdquo" => "”",
        _ => return None,
    };
    Some(decoded.to_string())
}

/// Unescapes HTML entities and strips the `<b>` highlight tags the search API injects.
pub fn normalize_html_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let unescaped = ENTITY.replace_all(text, |caps: &Captures| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    HIGHLIGHT_TAG.replace_all(&unescaped, "").trim().to_string()
}

/// Title form used for grouping: HTML cleanup plus removal of bracketed labels.
pub fn normalize_title(text: &str) -> String {
    let mut title = normalize_html_text(text);
    for pattern in TITLE_BRACKETS.iter() {
        title = pattern.replace_all(&title, "").into_owned();
    }
    title.trim().to_string()
}

/// Lowercased word tokens of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let composed: String = text.nfc().collect::<String>().to_lowercase();
    TOKEN
        .find_iter(&composed)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Unigram and adjacent-bigram features of a text.
pub fn ngram_features(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let mut features = Vec::with_capacity(tokens.len() * 2);
    features.extend(tokens.iter().cloned());
    features.extend(tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    features
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_cleanup() {
        assert_eq!(
            normalize_html_text("<b>이재명</b> 대표 &quot;민생&quot; 강조 &amp; 회견"),
            "이재명 대표 \"민생\" 강조 & 회견"
        );
        assert_eq!(normalize_html_text("&#39;단독&#x27;"), "'단독'");
        assert_eq!(normalize_html_text("&unknown; stays"), "&unknown; stays");
    }

    #[test]
    fn test_title_brackets_removed() {
        assert_eq!(
            normalize_title("[속보] 국회 본회의 (종합) 【여론조사】 결과"),
            "국회 본회의   결과"
        );
        assert_eq!(normalize_title("<단독>여야 합의"), "여야 합의");
    }

    #[test]
    fn test_tokenize_drops_single_characters() {
        assert_eq!(tokenize("A Budget vote, 예산 통과 a"), vec!["budget", "vote", "예산", "통과"]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_ngram_features() {
        assert_eq!(
            ngram_features("budget vote passes"),
            vec!["budget", "vote", "passes", "budget vote", "vote passes"]
        );
    }
}
