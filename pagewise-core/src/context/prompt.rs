//! Prompt assembly for a user turn

use serde::{Deserialize, Serialize};

use crate::errors::{ContextError, Result};
use crate::llm::PromptMessage;
use crate::types::Mode;

use super::window::AssembledContext;

/// Per-turn prompt options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOptions {
    pub mode: Mode,
    /// Required in translate mode
    pub target_language: Option<String>,
    /// Free-form request accompanying the selection
    pub instruction: Option<String>,
    /// Title of the page the selection came from
    pub page_title: Option<String>,
}

impl PromptOptions {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_target_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn with_page_title(mut self, title: impl Into<String>) -> Self {
        self.page_title = Some(title.into());
        self
    }
}

/// Builds chat-completion messages from a selection and its context
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    base_instruction: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            base_instruction: "You are a reading assistant embedded in the user's browser."
                .to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.base_instruction = instruction.into();
        self
    }

    fn system_prompt(&self, options: &PromptOptions) -> Result<String> {
        let mut system = format!("{}\n{}", self.base_instruction, options.mode.instruction());

        if options.mode == Mode::Translate {
            let language = options
                .target_language
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .ok_or_else(|| {
                    ContextError::Validation("translate mode needs a target language".to_string())
                })?;
            system.push_str(&format!("\nTarget language: {language}."));
        }

        Ok(system)
    }

    /// Reject a turn that [`PromptBuilder::build`] would refuse
    pub fn validate(&self, selection: &str, options: &PromptOptions) -> Result<()> {
        if selection.trim().is_empty() {
            return Err(ContextError::Validation("selection is empty".to_string()));
        }
        self.system_prompt(options).map(|_| ())
    }

    /// Build the message list: system instruction, prior context, then the turn
    pub fn build(
        &self,
        selection: &str,
        context: Option<&AssembledContext>,
        options: &PromptOptions,
    ) -> Result<Vec<PromptMessage>> {
        self.validate(selection, options)?;
        let selection = selection.trim();

        let mut messages = vec![PromptMessage::system(self.system_prompt(options)?)];

        if let Some(context) = context
            && !context.is_empty()
        {
            messages.push(PromptMessage::system(format!(
                "Context from earlier on {}:\n\n{}",
                context.domain, context.text
            )));
        }

        let mut user = String::new();
        if let Some(title) = &options.page_title {
            user.push_str(&format!("Page: {title}\n"));
        }
        if let Some(instruction) = &options.instruction {
            user.push_str(&format!("Request: {}\n", instruction.trim()));
        }
        user.push_str(&format!("Selected text:\n\"\"\"\n{selection}\n\"\"\""));
        messages.push(PromptMessage::user(user));

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn context(text: &str) -> AssembledContext {
        AssembledContext {
            domain: "example.com".to_string(),
            summary: None,
            messages: Vec::new(),
            entities: Vec::new(),
            text: text.to_string(),
            token_count: 0,
            budget: 100,
            summarized: false,
            dropped_messages: 0,
            omitted_messages: 0,
            degraded: None,
        }
    }

    #[test]
    fn test_mode_instruction_and_selection() {
        let messages = PromptBuilder::new()
            .build("  ownership  ", None, &PromptOptions::new(Mode::Explain))
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains(Mode::Explain.instruction()));
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.ends_with("\"\"\"\nownership\n\"\"\""));
    }

    #[test]
    fn test_context_block_is_injected() {
        let ctx = context("[Recent conversation]\nUser: hi");
        let messages = PromptBuilder::new()
            .build("text", Some(&ctx), &PromptOptions::default())
            .unwrap();

        assert_eq!(messages.len(), 3);
        assert!(messages[1].content.starts_with("Context from earlier on example.com"));
        assert!(messages[1].content.contains("User: hi"));
    }

    #[test]
    fn test_empty_context_is_skipped() {
        let messages = PromptBuilder::new()
            .build("text", Some(&context("")), &PromptOptions::default())
            .unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_translate_requires_language() {
        let builder = PromptBuilder::new();
        let err = builder
            .build("Bonjour", None, &PromptOptions::new(Mode::Translate))
            .unwrap_err();
        assert!(matches!(err, ContextError::Validation(_)));

        let messages = builder
            .build(
                "Bonjour",
                None,
                &PromptOptions::new(Mode::Translate).with_target_language("German"),
            )
            .unwrap();
        assert!(messages[0].content.ends_with("Target language: German."));
    }

    #[test]
    fn test_empty_selection_rejected() {
        let err = PromptBuilder::new()
            .build("   ", None, &PromptOptions::default())
            .unwrap_err();
        assert!(matches!(err, ContextError::Validation(_)));
    }
}
