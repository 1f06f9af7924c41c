use serde::{Deserialize, Serialize};

use super::profile::UserProfile;

/// Remote tables mirrored from the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorTable {
    Profiles,
    Solved,
    CategoryStats,
    Glossary,
}

impl MirrorTable {
    pub fn name(&self) -> &'static str {
        match self {
            MirrorTable::Profiles => "profiles",
            MirrorTable::Solved => "solved",
            MirrorTable::CategoryStats => "category_stats",
            MirrorTable::Glossary => "glossary",
        }
    }
}

/// Tracked profile columns as stored remotely. Crisis state stays local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub identity: String,
    pub name: String,
    pub email: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub total_score: u32,
    #[serde(default)]
    pub mastery: u32,
    #[serde(default)]
    pub lives: u32,
    #[serde(default)]
    pub questions_answered: u32,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub crisis_wins: u32,
    #[serde(default)]
    pub redemptions: u32,
    #[serde(default)]
    pub joker_fifty: u32,
    #[serde(default)]
    pub joker_hint: u32,
    #[serde(default)]
    pub has_diploma: bool,
}

fn default_level() -> u32 {
    1
}

impl From<&UserProfile> for ProfileRow {
    fn from(profile: &UserProfile) -> Self {
        Self {
            identity: profile.identity.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            level: profile.level,
            xp: profile.xp,
            total_score: profile.total_score,
            mastery: profile.mastery,
            lives: profile.lives,
            questions_answered: profile.questions_answered,
            streak: profile.streak,
            crisis_wins: profile.crisis_wins,
            redemptions: profile.redemptions,
            joker_fifty: profile.joker_fifty,
            joker_hint: profile.joker_hint,
            has_diploma: profile.has_diploma,
        }
    }
}

impl ProfileRow {
    /// Overwrite every tracked field of `local` (or a fresh profile) with the
    /// remote values.
    pub fn into_profile(self, local: Option<UserProfile>) -> UserProfile {
        let mut profile =
            local.unwrap_or_else(|| UserProfile::new(&self.identity, &self.name, &self.email));
        profile.identity = self.identity;
        profile.name = self.name;
        profile.email = self.email;
        profile.level = self.level.max(1);
        profile.xp = self.xp;
        profile.total_score = self.total_score;
        profile.mastery = self.mastery.min(100);
        profile.lives = self.lives.min(crate::rules::MAX_LIVES);
        profile.questions_answered = self.questions_answered;
        profile.streak = self.streak;
        profile.crisis_wins = self.crisis_wins;
        profile.redemptions = self.redemptions;
        profile.joker_fifty = self.joker_fifty;
        profile.joker_hint = self.joker_hint;
        profile.has_diploma = profile.has_diploma || self.has_diploma;
        profile
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolvedRow {
    pub identity: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStatRow {
    pub identity: String,
    pub category: String,
    pub correct_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryRow {
    pub identity: String,
    pub term: String,
    pub definition: String,
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_row_overwrites_local_fields() {
        let mut local = UserProfile::new("id-1", "Old", "old@example.com");
        local.xp = 40;
        local.crisis_wins = 0;

        let mut row = ProfileRow::from(&local);
        row.name = "New".to_string();
        row.xp = 300;
        row.crisis_wins = 2;
        row.lives = 9;

        let merged = row.into_profile(Some(local));
        assert_eq!(merged.name, "New");
        assert_eq!(merged.xp, 300);
        assert_eq!(merged.crisis_wins, 2);
        assert_eq!(merged.lives, crate::rules::MAX_LIVES);
    }
}
