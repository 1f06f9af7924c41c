use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub category: String,
    pub correct_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub term: String,
    pub definition: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BadgeView {
    pub code: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

/// Competency radar feed plus earned badges.
#[derive(Debug, Clone, Serialize)]
pub struct LearnerStats {
    pub categories: Vec<CategoryStat>,
    pub glossary_terms: u32,
    pub solved: u32,
    pub badges: Vec<BadgeView>,
}
