//! The AI provider seam
//!
//! Prompt design and the provider's wire format live behind
//! [`FormGenerator`]; this crate only orchestrates calls to it.

use crate::error::GenerationError;
use async_trait::async_trait;
use formgen_definition::FormDefinition;
use formgen_session::FormPreferences;

/// First-time generation input
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub description: String,
    pub title: String,
    pub preferences: FormPreferences,
    pub user_id: String,
}

/// Regeneration input handed to the provider
#[derive(Debug, Clone, PartialEq)]
pub struct RegenerationPrompt {
    pub description: String,
    pub feedback: String,
    pub current_definition: FormDefinition,
    pub title: String,
    pub user_id: String,
}

/// AI form generator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FormGenerator: Send + Sync {
    /// Whether the provider is configured and usable
    fn is_available(&self) -> bool;

    /// Produce a definition from a description
    async fn generate(&self, request: GenerationRequest) -> Result<FormDefinition, GenerationError>;

    /// Produce a revised definition from feedback on the current one
    async fn regenerate(
        &self,
        prompt: RegenerationPrompt,
    ) -> Result<FormDefinition, GenerationError>;
}

/// Generator that always answers with the same definition
///
/// Used for offline runs where no provider is configured.
#[derive(Debug, Clone)]
pub struct StaticFormGenerator {
    definition: FormDefinition,
    available: bool,
}

impl StaticFormGenerator {
    /// Answer every request with `definition`
    #[must_use]
    pub fn new(definition: FormDefinition) -> Self {
        Self {
            definition,
            available: true,
        }
    }

    /// A generator that reports itself unavailable
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            definition: FormDefinition::default(),
            available: false,
        }
    }
}

#[async_trait]
impl FormGenerator for StaticFormGenerator {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn generate(&self, request: GenerationRequest) -> Result<FormDefinition, GenerationError> {
        if !self.available {
            return Err(GenerationError::Unavailable("static generator disabled".into()));
        }
        let mut definition = self.definition.clone();
        if definition.name.is_none() {
            definition.name = Some(request.title);
        }
        Ok(definition)
    }

    async fn regenerate(
        &self,
        prompt: RegenerationPrompt,
    ) -> Result<FormDefinition, GenerationError> {
        if !self.available {
            return Err(GenerationError::Unavailable("static generator disabled".into()));
        }
        let mut definition = self.definition.clone();
        if definition.name.is_none() {
            definition.name = Some(prompt.title);
        }
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            description: "Register a dog".into(),
            title: "Dog register".into(),
            preferences: FormPreferences::default(),
            user_id: "user-1".into(),
        }
    }

    #[tokio::test]
    async fn static_generator_names_unnamed_definitions() {
        let generator = StaticFormGenerator::new(FormDefinition::default());
        let def = generator.generate(request()).await.unwrap();
        assert_eq!(def.name.as_deref(), Some("Dog register"));
    }

    #[tokio::test]
    async fn unavailable_generator_refuses() {
        let generator = StaticFormGenerator::unavailable();
        assert!(!generator.is_available());
        assert!(matches!(
            generator.generate(request()).await,
            Err(GenerationError::Unavailable(_))
        ));
    }
}
