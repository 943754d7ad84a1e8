//! Canned answers for `medrem ask`.
//!
//! Rules are tried in order and the first match wins. A pattern matches when
//! its words appear consecutively in the query, so "hi" does not match
//! "history".

const FALLBACK: &str = "I'm not sure about that. You can ask me about adding medicines, \
     setting reminders, marking medicines as taken, or viewing your history.";

struct Rule {
    patterns: &'static [&'static str],
    answer: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        patterns: &["hello", "hi", "hey"],
        answer: "Hello! How can I help you today?",
    },
    Rule {
        patterns: &["thank", "thanks", "thank you"],
        answer: "You're welcome! Let me know if you need anything else.",
    },
    Rule {
        patterns: &["bye", "goodbye"],
        answer: "Goodbye! Take care and don't forget to take your medicines on time!",
    },
    Rule {
        patterns: &["how to add medicine"],
        answer: "Run `medrem add NAME --dosage DOSE --time HH:MM` and repeat --time for \
                 every time of day. A reminder is scheduled for each time.",
    },
    Rule {
        patterns: &["how to set reminder"],
        answer: "Reminders are set from the times you give when adding a medicine. Keep \
                 `medrem serve` running to receive them.",
    },
    Rule {
        patterns: &["how to mark medicine as taken"],
        answer: "Run `medrem take ID`. The ID is shown by `medrem list`.",
    },
    Rule {
        patterns: &["how to edit medicine"],
        answer: "Delete the medicine with `medrem delete ID` and add it again with the new \
                 details.",
    },
    Rule {
        patterns: &["how to delete medicine"],
        answer: "Run `medrem delete ID`. Reminders for your other medicines are kept.",
    },
    Rule {
        patterns: &["what if i miss a dose"],
        answer: "Mark it with `medrem miss ID`. It's recommended to consult your doctor \
                 about missed doses.",
    },
    Rule {
        patterns: &["how to view history"],
        answer: "`medrem list` shows every medicine with when it was last taken.",
    },
    Rule {
        patterns: &["how to change notification sound"],
        answer: "Set `notification.command` and `notification.args` in \
                 ~/.medrem/config.toml to use a different notifier.",
    },
    Rule {
        patterns: &["how to backup data"],
        answer: "Everything lives in ~/.medrem/medrem.db. Copy that file while \
                 `medrem serve` is stopped.",
    },
    Rule {
        patterns: &["how to contact support"],
        answer: "Run `medrem doctor` and include its output when you report a problem.",
    },
];

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_words(haystack: &[String], pattern: &str) -> bool {
    let needle = words(pattern);
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Answer a question with the first matching canned response.
pub fn respond(query: &str) -> &'static str {
    let query = words(query.trim());
    RULES
        .iter()
        .find(|rule| rule.patterns.iter().any(|p| contains_words(&query, p)))
        .map(|rule| rule.answer)
        .unwrap_or(FALLBACK)
}
