use crate::errors::{AppError, AppResult};
use crate::notify::{Notification, NotificationHub};
use crate::storage::{
    EntryRepository, KeyValueStore, CURRENT_PROMPT_KEY, FAVORITE_PROMPTS_KEY, USED_PROMPTS_KEY,
};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptCategory {
    Gratitude,
    Reflection,
    Mindfulness,
    Stress,
    Growth,
}

impl PromptCategory {
    pub const ALL: [PromptCategory; 5] = [
        PromptCategory::Gratitude,
        PromptCategory::Reflection,
        PromptCategory::Mindfulness,
        PromptCategory::Stress,
        PromptCategory::Growth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gratitude => "gratitude",
            Self::Reflection => "reflection",
            Self::Mindfulness => "mindfulness",
            Self::Stress => "stress",
            Self::Growth => "growth",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Gratitude => "Gratitude",
            Self::Reflection => "Self-Reflection",
            Self::Mindfulness => "Mindfulness",
            Self::Stress => "Stress Relief",
            Self::Growth => "Personal Growth",
        }
    }

    pub fn parse(raw: &str) -> AppResult<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| AppError::Validation(format!("unknown prompt category '{}'", raw)))
    }

    pub fn prompts(self) -> &'static [&'static str] {
        match self {
            Self::Gratitude => &GRATITUDE,
            Self::Reflection => &REFLECTION,
            Self::Mindfulness => &MINDFULNESS,
            Self::Stress => &STRESS,
            Self::Growth => &GROWTH,
        }
    }
}

const GRATITUDE: [&str; 10] = [
    "List three things you're grateful for today and why.",
    "What's something small that brightened your day recently?",
    "Who has helped you in the past week and how did they make a difference?",
    "What aspect of nature are you most thankful for today?",
    "What's a simple pleasure in your daily routine that you appreciate?",
    "What's a challenge you're facing that's actually helping you grow?",
    "What's something you take for granted that many people don't have?",
    "Who is someone that inspires you and what qualities do you admire in them?",
    "What's a skill or ability you have that you're grateful for?",
    "What's something you're looking forward to, and why does it bring you joy?",
];

const REFLECTION: [&str; 10] = [
    "What emotion has been most present for you today and why?",
    "What's one thing you'd like to improve about yourself and what steps can you take?",
    "Describe a moment when you felt truly at peace. What elements created that feeling?",
    "What's a belief you held strongly that has changed over time?",
    "What would your younger self think of the person you've become?",
    "What's a habit you've developed that has improved your life?",
    "What's something difficult you're avoiding dealing with?",
    "When did you last feel truly proud of yourself and why?",
    "What's a recurring pattern in your life you'd like to change?",
    "If you could give yourself advice 5 years ago, what would it be?",
];

const MINDFULNESS: [&str; 10] = [
    "Describe your surroundings right now using all five senses.",
    "What's one thing you noticed today that you usually don't pay attention to?",
    "How does your body feel right now? Notice any areas of tension or comfort.",
    "Describe your breath and how it changes as you focus on it.",
    "What's one activity you could do more mindfully tomorrow?",
    "Describe a moment today when you were fully present, not thinking about past or future.",
    "What sounds can you hear right now? Try to notice even the quietest ones.",
    "How does the air feel on your skin right now?",
    "What colors and shapes are in your field of vision? Notice the details.",
    "What's one routine task you could turn into a mindfulness practice?",
];

const STRESS: [&str; 10] = [
    "What's causing you the most stress right now and what's one small step to address it?",
    "List three things within your control and three things beyond your control right now.",
    "What activities help you feel calm? How could you incorporate one tomorrow?",
    "What would you say to a friend experiencing the stress you're feeling now?",
    "What's a worry that's been on your mind? Write it out completely.",
    "What's one boundary you need to establish or maintain for your well-being?",
    "Describe a safe, peaceful place (real or imagined) in detail.",
    "What's something you've been overthinking that you could simplify?",
    "What negative thought patterns do you notice when you're stressed?",
    "What's a self-care practice you've neglected lately that you could restart?",
];

const GROWTH: [&str; 10] = [
    "What's one small win you've had recently that deserves celebration?",
    "What's a fear you'd like to overcome? What's one tiny step toward facing it?",
    "What's a value that's important to you? How did you honor it today?",
    "What would you attempt if you knew you couldn't fail?",
    "What's a goal you're working toward? What progress have you made?",
    "What's something new you'd like to learn and why?",
    "How have you grown or changed in the past year?",
    "What's a mistake you've made that taught you something valuable?",
    "What's a strength you have that you'd like to develop further?",
    "What brings you a sense of purpose or meaning?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FavoriteToggle {
    Added,
    Removed,
}

/// Prompt pools plus the persisted used and favorite sets.
pub struct PromptDeck {
    used_repo: EntryRepository<Vec<String>>,
    favorites_repo: EntryRepository<Vec<String>>,
    selected_repo: EntryRepository<Option<String>>,
    used: Vec<String>,
    favorites: Vec<String>,
    notifications: NotificationHub,
}

impl PromptDeck {
    pub fn open(store: Arc<dyn KeyValueStore>, notifications: NotificationHub) -> AppResult<Self> {
        let used_repo = EntryRepository::new(store.clone(), USED_PROMPTS_KEY);
        let favorites_repo = EntryRepository::new(store.clone(), FAVORITE_PROMPTS_KEY);
        let selected_repo = EntryRepository::new(store, CURRENT_PROMPT_KEY);
        let used = used_repo.load()?;
        let favorites = favorites_repo.load()?;
        Ok(Self {
            used_repo,
            favorites_repo,
            selected_repo,
            used,
            favorites,
            notifications,
        })
    }

    pub fn used(&self) -> &[String] {
        &self.used
    }

    pub fn favorites(&self) -> &[String] {
        &self.favorites
    }

    /// Draws an unused prompt from the category. An exhausted category is
    /// recycled by forgetting only its own prompts.
    pub fn draw<R: Rng + ?Sized>(&mut self, category: PromptCategory, rng: &mut R) -> AppResult<String> {
        let pool = category.prompts();
        let mut used = self.used.clone();
        let mut available: Vec<&str> = pool
            .iter()
            .copied()
            .filter(|prompt| !used.iter().any(|seen| seen == prompt))
            .collect();

        if available.is_empty() {
            tracing::info!(category = category.as_str(), "prompt category exhausted; recycling");
            used.retain(|seen| !pool.contains(&seen.as_str()));
            available = pool.to_vec();
        }

        let prompt = available
            .choose(rng)
            .map(|prompt| prompt.to_string())
            .ok_or_else(|| AppError::Internal(format!("empty prompt pool for {}", category.as_str())))?;

        used.push(prompt.clone());
        self.used_repo.save(&used)?;
        self.used = used;
        Ok(prompt)
    }

    pub fn toggle_favorite(&mut self, prompt: &str) -> AppResult<FavoriteToggle> {
        let mut favorites = self.favorites.clone();
        let outcome = if let Some(index) = favorites.iter().position(|existing| existing == prompt) {
            favorites.remove(index);
            FavoriteToggle::Removed
        } else {
            favorites.push(prompt.to_string());
            FavoriteToggle::Added
        };
        self.favorites_repo.save(&favorites)?;
        self.favorites = favorites;

        self.notifications.emit(match outcome {
            FavoriteToggle::Added => Notification::info(
                "Added to favorites",
                "The prompt has been added to your favorites.",
            ),
            FavoriteToggle::Removed => Notification::info(
                "Removed from favorites",
                "The prompt has been removed from your favorites.",
            ),
        });
        Ok(outcome)
    }

    /// Loads a saved favorite as the current prompt.
    pub fn use_favorite(&self, prompt: &str) -> AppResult<String> {
        if !self.favorites.iter().any(|favorite| favorite == prompt) {
            return Err(AppError::NotFound(format!("favorite prompt '{}'", prompt)));
        }
        self.notifications.emit(Notification::info(
            "Prompt selected",
            "The favorite prompt has been loaded.",
        ));
        Ok(prompt.to_string())
    }

    /// Hands a prompt to the journal editor.
    pub fn select_for_journaling(&self, prompt: &str) -> AppResult<()> {
        if prompt.trim().is_empty() {
            return Err(AppError::Validation("prompt must not be empty".to_string()));
        }
        self.selected_repo.save(&Some(prompt.to_string()))?;
        self.notifications.emit(Notification::info(
            "Prompt selected",
            "Switch to the Daily Journal tab to start writing based on this prompt.",
        ));
        Ok(())
    }

    /// Reads and clears the prompt picked for journaling.
    pub fn take_selected_prompt(&self) -> AppResult<Option<String>> {
        let selected = self.selected_repo.load()?;
        if selected.is_some() {
            self.selected_repo.delete()?;
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::{FavoriteToggle, PromptCategory, PromptDeck};
    use crate::notify::{drain, NotificationHub};
    use crate::storage::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn deck() -> (PromptDeck, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (PromptDeck::open(store.clone(), NotificationHub::new()).expect("open"), store)
    }

    #[test]
    fn every_category_has_ten_distinct_prompts() {
        for category in PromptCategory::ALL {
            let unique: HashSet<&str> = category.prompts().iter().copied().collect();
            assert_eq!(unique.len(), 10, "{}", category.display_name());
        }
        assert_eq!(PromptCategory::parse("Stress").expect("parse"), PromptCategory::Stress);
        assert!(PromptCategory::parse("sleep").is_err());
    }

    #[test]
    fn draws_do_not_repeat_until_category_is_exhausted() {
        let (mut deck, _) = deck();
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = HashSet::new();
        for _ in 0..10 {
            let prompt = deck.draw(PromptCategory::Gratitude, &mut rng).expect("draw");
            assert!(seen.insert(prompt));
        }
        assert_eq!(deck.used().len(), 10);

        let recycled = deck.draw(PromptCategory::Gratitude, &mut rng).expect("draw");
        assert!(PromptCategory::Gratitude.prompts().contains(&recycled.as_str()));
        assert_eq!(deck.used(), &[recycled]);
    }

    #[test]
    fn recycling_keeps_other_categories_used() {
        let (mut deck, store) = deck();
        let mut rng = StdRng::seed_from_u64(11);
        let calm = deck.draw(PromptCategory::Mindfulness, &mut rng).expect("draw");
        for _ in 0..11 {
            deck.draw(PromptCategory::Growth, &mut rng).expect("draw");
        }
        assert!(deck.used().contains(&calm));
        assert_eq!(deck.used().len(), 2);

        let reopened = PromptDeck::open(store, NotificationHub::new()).expect("reopen");
        assert_eq!(reopened.used(), deck.used());
    }

    #[test]
    fn toggling_favorites_adds_then_removes() {
        let hub = NotificationHub::new();
        let mut receiver = hub.subscribe();
        let store = Arc::new(MemoryStore::new());
        let mut deck = PromptDeck::open(store.clone(), hub).expect("open");
        let prompt = PromptCategory::Stress.prompts()[0];

        assert_eq!(deck.toggle_favorite(prompt).expect("add"), FavoriteToggle::Added);
        assert_eq!(
            PromptDeck::open(store.clone(), NotificationHub::new()).expect("reopen").favorites(),
            &[prompt.to_string()]
        );
        assert_eq!(deck.toggle_favorite(prompt).expect("remove"), FavoriteToggle::Removed);
        assert!(deck.favorites().is_empty());
        assert!(deck.use_favorite(prompt).is_err());

        let titles: Vec<String> = drain(&mut receiver).into_iter().map(|note| note.title).collect();
        assert_eq!(titles, vec!["Added to favorites", "Removed from favorites"]);
    }

    #[test]
    fn selected_prompt_is_consumed_once() {
        let (deck, _) = deck();
        deck.select_for_journaling("Describe your breath.").expect("select");
        assert_eq!(
            deck.take_selected_prompt().expect("take").as_deref(),
            Some("Describe your breath.")
        );
        assert!(deck.take_selected_prompt().expect("take again").is_none());
        assert!(deck.select_for_journaling("   ").is_err());
    }
}
