use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Mutex;

/// Keyword-driven canned reply generator for the simulated backend.
///
/// Rules are checked in insertion order; the first group with any keyword
/// appearing as a substring of the lower-cased input wins, and one of its
/// candidate replies is picked uniformly at random. Inputs matching no group
/// fall through to a generic reply list. Nothing is learned between calls.
pub struct ResponseSimulator {
    rules: Vec<ReplyRule>,
    fallback: Vec<String>,
    rng: Mutex<StdRng>,
}

struct ReplyRule {
    keywords: Vec<String>,
    replies: Vec<String>,
}

impl ResponseSimulator {
    /// Simulator with the built-in rule set, seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic simulator for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut sim = Self {
            rules: Vec::new(),
            fallback: GENERIC_REPLIES.iter().map(|s| s.to_string()).collect(),
            rng: Mutex::new(rng),
        };
        for (keywords, replies) in DEFAULT_RULES {
            sim.add_rule(keywords, replies);
        }
        sim
    }

    /// Appends a rule. `keywords` is a comma-separated keyword group; any one
    /// of them matching selects from `replies`.
    pub fn add_rule(&mut self, keywords: &str, replies: &[&str]) {
        self.rules.push(ReplyRule {
            keywords: keywords
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            replies: replies.iter().map(|s| s.to_string()).collect(),
        });
    }

    /// Produces a reply for the given user input.
    pub fn reply(&self, input: &str) -> String {
        let normalized = input.trim().to_lowercase();
        let candidates = self
            .rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| normalized.contains(k.as_str())))
            .map(|rule| &rule.replies)
            .unwrap_or(&self.fallback);

        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        candidates
            .choose(&mut *rng)
            .cloned()
            .unwrap_or_else(|| "...".to_string())
    }
}

impl Default for ResponseSimulator {
    fn default() -> Self {
        Self::new()
    }
}

// Built-in rules, flavored after the student-assistant the simulator stands
// in for. Order matters: earlier groups shadow later ones.
const DEFAULT_RULES: &[(&str, &[&str])] = &[
    (
        "hello,hi,hey,greetings",
        &[
            "Hello! What would you like to study today?",
            "Hi there! Ask me anything about your coursework.",
            "Hey! Ready when you are.",
        ],
    ),
    (
        "math,physics,chemistry,history,geography",
        &[
            "Good topic. Let's break it down into smaller concepts first.",
            "I can walk you through that step by step. Where are you stuck?",
            "Let's start with the definitions and build up from there.",
        ],
    ),
    (
        "homework,assignment,exam,test,study",
        &[
            "Tell me which part of the assignment is giving you trouble.",
            "A study plan helps: which chapters does the exam cover?",
            "Let's work through it together rather than jumping to the answer.",
        ],
    ),
    (
        "thanks,thank you",
        &[
            "You're welcome! Good luck with your studies.",
            "Any time. Come back if anything else is unclear.",
        ],
    ),
    (
        "bye,goodbye,see you",
        &[
            "Goodbye! Keep up the good work.",
            "See you next session!",
        ],
    ),
];

const GENERIC_REPLIES: &[&str] = &[
    "Interesting question! Can you tell me a bit more?",
    "Let me think about that. What have you tried so far?",
    "I can help with that. What's the context?",
    "Could you rephrase that? I want to make sure I understand.",
];
