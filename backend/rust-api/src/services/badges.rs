use std::collections::HashSet;

use crate::models::progress::{BadgeView, CategoryStat};
use crate::models::profile::UserProfile;

/// Everything a badge rule may look at.
pub struct BadgeInputs<'a> {
    pub profile: &'a UserProfile,
    pub categories: &'a [CategoryStat],
    pub glossary_terms: u32,
}

impl BadgeInputs<'_> {
    fn category(&self, name: &str) -> u32 {
        self.categories
            .iter()
            .find(|stat| stat.category == name)
            .map(|stat| stat.correct_count)
            .unwrap_or(0)
    }
}

enum Rule {
    Answered(u32),
    Level(u32),
    Category(&'static str, u32),
    CrisisWins(u32),
    Redemptions(u32),
    GlossaryTerms(u32),
}

struct Badge {
    code: &'static str,
    title: &'static str,
    description: &'static str,
    rule: Rule,
}

const BADGES: &[Badge] = &[
    // Career ranks
    Badge {
        code: "operator",
        title: "Supply Chain Operator",
        description: "Answered 5 questions.",
        rule: Rule::Answered(5),
    },
    Badge {
        code: "operations_lead",
        title: "Operations Lead",
        description: "Level 1 expertise validated.",
        rule: Rule::Answered(120),
    },
    Badge {
        code: "flow_coordinator",
        title: "Flow Coordinator",
        description: "Reached level 2.",
        rule: Rule::Level(2),
    },
    Badge {
        code: "senior_planner",
        title: "Senior Planner",
        description: "Level 2 expertise validated.",
        rule: Rule::Answered(250),
    },
    Badge {
        code: "sc_engineer",
        title: "Supply Chain Engineer",
        description: "Reached level 3.",
        rule: Rule::Level(3),
    },
    Badge {
        code: "data_strategist",
        title: "Data Strategist",
        description: "Level 3 expertise validated.",
        rule: Rule::Answered(380),
    },
    Badge {
        code: "coo",
        title: "Chief Operating Officer",
        description: "Reached level 4.",
        rule: Rule::Level(4),
    },
    Badge {
        code: "visionary",
        title: "Supply Chain Visionary",
        description: "The summit of the supply chain.",
        rule: Rule::Answered(500),
    },
    // Specialisations
    Badge {
        code: "negotiator",
        title: "The Negotiator",
        description: "10 correct answers in Purchasing.",
        rule: Rule::Category("Purchasing", 10),
    },
    Badge {
        code: "stock_keeper",
        title: "Stock Keeper",
        description: "20 correct answers in Inventory.",
        rule: Rule::Category("Inventory", 20),
    },
    Badge {
        code: "globe_trotter",
        title: "Globe-Trotter",
        description: "15 correct answers in Transport.",
        rule: Rule::Category("Transport", 15),
    },
    Badge {
        code: "digital_oracle",
        title: "Digital Oracle",
        description: "15 correct answers in AI & Data.",
        rule: Rule::Category("AI & Data", 15),
    },
    Badge {
        code: "lean_sensei",
        title: "Lean Sensei",
        description: "15 correct answers in Lean Strategy.",
        rule: Rule::Category("Lean Strategy", 15),
    },
    // Gameplay
    Badge {
        code: "chaos_master",
        title: "Master of Chaos",
        description: "Survived a crisis.",
        rule: Rule::CrisisWins(1),
    },
    Badge {
        code: "survivor",
        title: "The Survivor",
        description: "Used a redemption.",
        rule: Rule::Redemptions(1),
    },
    Badge {
        code: "encyclopedia",
        title: "The Encyclopedia",
        description: "50 glossary terms.",
        rule: Rule::GlossaryTerms(50),
    },
];

/// Badges earned for the given state, in catalogue order.
pub fn earned(inputs: &BadgeInputs<'_>) -> Vec<BadgeView> {
    BADGES
        .iter()
        .filter(|badge| match badge.rule {
            Rule::Answered(n) => inputs.profile.questions_answered >= n,
            Rule::Level(n) => inputs.profile.level >= n,
            Rule::Category(name, n) => inputs.category(name) >= n,
            Rule::CrisisWins(n) => inputs.profile.crisis_wins >= n,
            Rule::Redemptions(n) => inputs.profile.redemptions >= n,
            Rule::GlossaryTerms(n) => inputs.glossary_terms >= n,
        })
        .map(|badge| BadgeView {
            code: badge.code,
            title: badge.title,
            description: badge.description,
        })
        .collect()
}

/// Badges present in `after` but not in `before`.
pub fn newly_earned(before: &[BadgeView], after: &[BadgeView]) -> Vec<BadgeView> {
    let previous: HashSet<&str> = before.iter().map(|b| b.code).collect();
    after
        .iter()
        .filter(|b| !previous.contains(b.code))
        .cloned()
        .collect()
}
