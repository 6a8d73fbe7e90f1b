//! Prompt construction.
//!
//! Pure functions from game configuration (plus optional prior context and
//! the player's choice) to a system/user prompt pair.

use crate::provider::ChatMessage;
use serde::{Deserialize, Serialize};

/// Narrative language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Chinese,
}

/// Static description of the story being told.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub title: String,
    pub setting: String,
    pub protagonist: String,
    pub tone: String,
    pub language: Language,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            title: "The Night Shift".to_string(),
            setting: "An empty hospital wing after midnight".to_string(),
            protagonist: "A night-shift nurse".to_string(),
            tone: "slow psychological dread".to_string(),
            language: Language::English,
        }
    }
}

impl GameConfig {
    pub fn new(title: impl Into<String>, setting: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            setting: setting.into(),
            ..Default::default()
        }
    }

    pub fn with_protagonist(mut self, protagonist: impl Into<String>) -> Self {
        self.protagonist = protagonist.into();
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = tone.into();
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}

/// A system/user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn into_messages(self) -> Vec<ChatMessage> {
        vec![ChatMessage::system(self.system), ChatMessage::user(self.user)]
    }
}

/// Builds prompts for each kind of turn.
pub trait PromptBuilder: Send + Sync {
    /// Prompt for the first turn of a story.
    fn opening(&self, game: &GameConfig) -> Prompt;

    /// Prompt for a later turn. `context` holds recent segments, oldest first.
    fn continuation(&self, game: &GameConfig, context: &str, choice: &str) -> Prompt;
}

/// The built-in prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPrompts;

impl DefaultPrompts {
    fn system_prompt(game: &GameConfig) -> String {
        let mut prompt = String::new();
        match game.language {
            Language::English => {
                prompt.push_str(include_str!("prompts/system_en.txt"));
                prompt.push_str("\n## Story\n");
                prompt.push_str(&format!("**Title:** {}\n", game.title));
                prompt.push_str(&format!("**Setting:** {}\n", game.setting));
                prompt.push_str(&format!("**Protagonist:** {}\n", game.protagonist));
                prompt.push_str(&format!("**Tone:** {}\n", game.tone));
            }
            Language::Chinese => {
                prompt.push_str(include_str!("prompts/system_zh.txt"));
                prompt.push_str("\n## 故事\n");
                prompt.push_str(&format!("**标题：** {}\n", game.title));
                prompt.push_str(&format!("**背景：** {}\n", game.setting));
                prompt.push_str(&format!("**主角：** {}\n", game.protagonist));
                prompt.push_str(&format!("**基调：** {}\n", game.tone));
            }
        }
        prompt
    }
}

impl PromptBuilder for DefaultPrompts {
    fn opening(&self, game: &GameConfig) -> Prompt {
        let user = match game.language {
            Language::English => "Begin the story.".to_string(),
            Language::Chinese => "开始讲述故事。".to_string(),
        };
        Prompt {
            system: Self::system_prompt(game),
            user,
        }
    }

    fn continuation(&self, game: &GameConfig, context: &str, choice: &str) -> Prompt {
        let user = match game.language {
            Language::English => format!(
                "## Story so far\n{context}\n\n## The player chose\n{choice}\n\nContinue the story."
            ),
            Language::Chinese => {
                format!("## 前情\n{context}\n\n## 玩家选择\n{choice}\n\n继续讲述故事。")
            }
        };
        Prompt {
            system: Self::system_prompt(game),
            user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Role;

    #[test]
    fn test_opening_includes_game_details() {
        let game = GameConfig::new("Ward 9", "A flooded basement").with_protagonist("An orderly");
        let prompt = DefaultPrompts.opening(&game);
        assert!(prompt.system.contains("Ward 9"));
        assert!(prompt.system.contains("A flooded basement"));
        assert!(prompt.system.contains("An orderly"));
        assert!(prompt.system.contains("Choices:"));
    }

    #[test]
    fn test_continuation_carries_context_and_choice() {
        let prompt = DefaultPrompts.continuation(&GameConfig::default(), "The lights died.", "Run");
        assert!(prompt.user.contains("The lights died."));
        assert!(prompt.user.contains("Run"));
    }

    #[test]
    fn test_chinese_prompts() {
        let game = GameConfig::default().with_language(Language::Chinese);
        let prompt = DefaultPrompts.continuation(&game, "灯灭了。", "逃跑");
        assert!(prompt.system.contains("选项"));
        assert!(prompt.user.contains("玩家选择"));
    }

    #[test]
    fn test_into_messages_orders_system_first() {
        let messages = DefaultPrompts.opening(&GameConfig::default()).into_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
    }
}
