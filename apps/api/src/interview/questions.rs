//! Static per-role question bank, used as the fallback when generation fails.

/// Sent once the static list for a role is exhausted.
pub const COMPLETION_MESSAGE: &str =
    "Thank you for your time! The interview is finished. Good luck with your applications.";

const SOFTWARE_ENGINEER: &[&str] = &[
    "Describe a challenging software project you worked on.",
    "How do you ensure code quality?",
    "Explain the concept of RESTful APIs.",
    "What is your experience with version control systems?",
    "How do you approach debugging complex issues?",
];

const DATA_SCIENTIST: &[&str] = &[
    "How do you handle missing data in a dataset?",
    "Explain the difference between supervised and unsupervised learning.",
    "Describe a machine learning project you've worked on.",
    "What is regularization in machine learning?",
    "How do you evaluate model performance?",
];

const PRODUCT_MANAGER: &[&str] = &[
    "Tell me about a product you launched from idea to release.",
    "How do you decide what goes into the next release?",
    "Describe a time you had to say no to an important stakeholder.",
    "Which metrics would you track for a product you know well, and why?",
    "How do you work with engineering when a deadline is at risk?",
];

/// Lower-cased, trimmed role name used for lookups.
pub fn normalize_role(role: &str) -> String {
    role.trim().to_lowercase()
}

/// Static questions for `role`; empty for unknown roles.
pub fn questions_for_role(role: &str) -> &'static [&'static str] {
    match normalize_role(role).as_str() {
        "software engineer" => SOFTWARE_ENGINEER,
        "data scientist" => DATA_SCIENTIST,
        "product manager" => PRODUCT_MANAGER,
        _ => &[],
    }
}

/// Question at `index` for `role`, or `None` past the end of the list.
pub fn static_question(role: &str, index: usize) -> Option<&'static str> {
    questions_for_role(role).get(index).copied()
}

/// Roles with a static question bank.
pub fn known_roles() -> [&'static str; 3] {
    ["software engineer", "data scientist", "product manager"]
}
