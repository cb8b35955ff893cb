//! Cheap intent checks answered without the AI.

use crate::inquiry::presets::normalize;

const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "hai",
    "helo",
    "good morning",
    "good afternoon",
    "good evening",
    "selamat pagi",
    "selamat petang",
    "你好",
    "您好",
];

const CONTACT_PHRASES: &[&str] = &[
    "talk to agent",
    "contact agent",
    "need help",
    "speak to someone",
    "talk to human",
    "contact support",
    "talk to admin",
    "reach support",
    "hubungi ejen",
    "人工客服",
];

/// Phrases, after normalization, that mean the user wants to go ahead.
const LEAD_INTENT_PHRASES: &[&str] = &[
    "i want to apply",
    "i would like to apply",
    "how do i apply",
    "how to apply",
    "want to refinance",
    "ready to refinance",
    "proceed with refinancing",
    "i am interested",
    "i m interested",
    "sign me up",
    "saya berminat",
    "saya mahu memohon",
    "nak mohon",
    "macam mana nak mohon",
    "我想申请",
    "我要申请",
    "怎么申请",
    "我有兴趣",
];

/// Extra words allowed after a greeting ("hi there", "hello finzo bot").
const GREETING_TAIL_WORDS: usize = 2;

/// A short message that opens with a greeting and asks nothing else.
pub fn is_greeting(text: &str) -> bool {
    let normalized = normalize(text);
    GREETINGS.iter().any(|greeting| {
        if normalized == *greeting {
            return true;
        }
        match normalized.strip_prefix(greeting) {
            Some(rest) if rest.starts_with(' ') => {
                rest.split_whitespace().count() <= GREETING_TAIL_WORDS
            }
            _ => false,
        }
    })
}

/// The user wants a human.
pub fn is_contact_request(text: &str) -> bool {
    let normalized = normalize(text);
    CONTACT_PHRASES.iter().any(|phrase| normalized.contains(phrase))
}

/// The user says they want to apply or proceed with a refinance.
pub fn is_lead_intent(text: &str) -> bool {
    let normalized = normalize(text);
    LEAD_INTENT_PHRASES
        .iter()
        .any(|phrase| normalized.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings() {
        assert!(is_greeting("Hi"));
        assert!(is_greeting("hello!"));
        assert!(is_greeting("Good morning there"));
        assert!(is_greeting("你好"));
        assert!(is_greeting("hey finzo bot"));
    }

    #[test]
    fn not_greetings() {
        assert!(!is_greeting("history of interest rates"));
        assert!(!is_greeting("hi, what documents do I need for refinancing?"));
        assert!(!is_greeting("highway"));
        assert!(!is_greeting(""));
    }

    #[test]
    fn contact_requests() {
        assert!(is_contact_request("Can I talk to agent please"));
        assert!(is_contact_request("I NEED HELP"));
        assert!(!is_contact_request("what is the lock-in period"));
    }

    #[test]
    fn lead_intent() {
        assert!(is_lead_intent("Ok I want to apply, what's next?"));
        assert!(is_lead_intent("I'm interested in this package"));
        assert!(is_lead_intent("Saya berminat"));
        assert!(is_lead_intent("我想申请转贷"));
        assert!(!is_lead_intent("does the lock-in period apply to me"));
        assert!(!is_lead_intent("what is refinancing"));
    }
}
