//! Keyword-rule classifiers
//!
//! Secondary tier for sentiment, emotion and dialogue act. Keywords match
//! whole words only ("hi" does not match "this"); multi-word keywords match
//! consecutive words.

use super::models::{DialogueAct, Emotion, SentimentLabel};

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "wonderful", "happy", "love", "like", "enjoy",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "hate", "dislike", "sad", "angry", "frustrated", "disappointed",
];

/// Emotion keyword lists; on a tie the earlier emotion wins
const EMOTION_WORDS: &[(Emotion, &[&str])] = &[
    (Emotion::Joy, &["happy", "joy", "excited", "thrilled", "delighted", "pleased"]),
    (Emotion::Sadness, &["sad", "sorrow", "grief", "melancholy", "depressed", "unhappy"]),
    (Emotion::Anger, &["angry", "mad", "furious", "irritated", "annoyed", "frustrated"]),
    (Emotion::Fear, &["afraid", "scared", "frightened", "terrified", "anxious", "worried"]),
    (Emotion::Surprise, &["surprised", "shocked", "amazed", "astonished", "stunned"]),
    (Emotion::Disgust, &["disgusted", "revolted", "repulsed", "appalled"]),
    (Emotion::Neutral, &["okay", "fine", "normal", "usual", "regular"]),
];

/// Dialogue act rules, first match wins
const DIALOGUE_RULES: &[(DialogueAct, &[&str])] = &[
    (DialogueAct::Question, &["what", "when", "where", "who", "why", "how"]),
    (
        DialogueAct::Request,
        &["please", "could you", "would you", "can you", "help", "need"],
    ),
    (
        DialogueAct::Greeting,
        &["hello", "hi", "hey", "good morning", "good afternoon", "good evening"],
    ),
    (
        DialogueAct::Farewell,
        &["goodbye", "bye", "see you", "farewell", "take care"],
    ),
    (
        DialogueAct::Agreement,
        &["yes", "yeah", "sure", "okay", "ok", "agree", "correct"],
    ),
    (
        DialogueAct::Disagreement,
        &["no", "nope", "disagree", "wrong", "incorrect", "false"],
    ),
];

/// Lowercased words of `text`
///
/// Apostrophes stay inside words so "don't" is one token.
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let parts: Vec<&str> = phrase.split_whitespace().collect();
    if parts.is_empty() || parts.len() > words.len() {
        return false;
    }
    words
        .windows(parts.len())
        .any(|window| window.iter().zip(&parts).all(|(w, p)| w == p))
}

fn count_matches(words: &[String], keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| contains_phrase(words, k)).count()
}

/// Keyword sentiment with a normalized polarity score
///
/// Each net keyword moves the score 0.1 away from 0.5, bounded to
/// `[0.1, 0.9]`.
pub fn sentiment(text: &str) -> (SentimentLabel, f64) {
    let words = words(text);
    let positive = count_matches(&words, POSITIVE_WORDS) as i64;
    let negative = count_matches(&words, NEGATIVE_WORDS) as i64;
    let net = positive - negative;

    if net > 0 {
        (SentimentLabel::Positive, (0.5 + 0.1 * net as f64).min(0.9))
    } else if net < 0 {
        (SentimentLabel::Negative, (0.5 + 0.1 * net as f64).max(0.1))
    } else {
        (SentimentLabel::Neutral, 0.5)
    }
}

/// Keyword emotion with confidence `min(0.9, 0.3 + 0.2·n)`
///
/// No keyword at all is neutral with confidence 0.5.
pub fn emotion(text: &str) -> (Emotion, f64) {
    let words = words(text);
    let mut best: Option<(Emotion, usize)> = None;
    for (emotion, keywords) in EMOTION_WORDS {
        let count = count_matches(&words, keywords);
        if count > 0 && best.map(|(_, n)| count > n).unwrap_or(true) {
            best = Some((*emotion, count));
        }
    }

    match best {
        Some((emotion, count)) => (emotion, (0.3 + 0.2 * count as f64).min(0.9)),
        None => (Emotion::Neutral, 0.5),
    }
}

pub fn dialogue_act(text: &str) -> DialogueAct {
    if text.contains('?') {
        return DialogueAct::Question;
    }
    let words = words(text);
    DIALOGUE_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| contains_phrase(&words, k)))
        .map(|(act, _)| *act)
        .unwrap_or(DialogueAct::Statement)
}
