//! The forms repository seam
//!
//! The repository is the system of record for forms. It has no
//! transactions: a form is created as an empty shell to obtain an id and
//! populated by a separate call.

use crate::error::RepositoryError;
use async_trait::async_trait;
use dashmap::DashMap;
use formgen_definition::FormDefinition;
use formgen_session::CreationMetadata;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Ownership details a new form is created with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormMetadataInput {
    pub title: String,
    pub organisation: String,
    pub team_name: String,
    pub team_email: String,
}

impl FormMetadataInput {
    /// Take ownership fields from a complete creation record
    ///
    /// Returns `None` if any ownership field is absent.
    #[must_use]
    pub fn from_creation(metadata: &CreationMetadata) -> Option<Self> {
        Some(Self {
            title: metadata.title.clone(),
            organisation: metadata.organisation.clone()?,
            team_name: metadata.team_name.clone()?,
            team_email: metadata.team_email.clone()?,
        })
    }
}

/// Identity of a newly created form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedForm {
    pub id: String,
    pub slug: String,
}

/// Forms system of record
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FormsRepository: Send + Sync {
    /// Create an empty form shell
    async fn create(
        &self,
        metadata: FormMetadataInput,
        auth_token: &str,
    ) -> Result<CreatedForm, RepositoryError>;

    /// Replace a form's draft definition
    async fn update_draft_form_definition(
        &self,
        form_id: &str,
        definition: &FormDefinition,
        auth_token: &str,
    ) -> Result<(), RepositoryError>;

    /// Delete a form
    async fn delete_form(&self, form_id: &str, auth_token: &str) -> Result<(), RepositoryError>;
}

/// A form held by [`InMemoryFormsRepository`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredForm {
    pub id: String,
    pub slug: String,
    pub metadata: FormMetadataInput,
    pub draft: Option<FormDefinition>,
}

/// Repository backed by process memory, for local runs
#[derive(Debug, Default)]
pub struct InMemoryFormsRepository {
    forms: DashMap<String, StoredForm>,
}

impl InMemoryFormsRepository {
    /// Create empty repository
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a form by id
    #[must_use]
    pub fn get(&self, form_id: &str) -> Option<StoredForm> {
        self.forms.get(form_id).map(|f| f.clone())
    }

    /// Number of forms, shells included
    #[must_use]
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    /// Whether no forms exist
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    fn unique_slug(&self, title: &str) -> String {
        let base = slug_of(title);
        let taken = |candidate: &str| self.forms.iter().any(|f| f.slug == candidate);
        if !taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

fn check_token(auth_token: &str) -> Result<(), RepositoryError> {
    if auth_token.trim().is_empty() {
        Err(RepositoryError::Unauthorized)
    } else {
        Ok(())
    }
}

/// Lowercase, hyphen-separated form of a title
#[must_use]
pub fn slug_of(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "form".to_string()
    } else {
        slug
    }
}

#[async_trait]
impl FormsRepository for InMemoryFormsRepository {
    async fn create(
        &self,
        metadata: FormMetadataInput,
        auth_token: &str,
    ) -> Result<CreatedForm, RepositoryError> {
        check_token(auth_token)?;
        let id = Ulid::new().to_string();
        let slug = self.unique_slug(&metadata.title);
        self.forms.insert(
            id.clone(),
            StoredForm {
                id: id.clone(),
                slug: slug.clone(),
                metadata,
                draft: None,
            },
        );
        Ok(CreatedForm { id, slug })
    }

    async fn update_draft_form_definition(
        &self,
        form_id: &str,
        definition: &FormDefinition,
        auth_token: &str,
    ) -> Result<(), RepositoryError> {
        check_token(auth_token)?;
        let mut form = self
            .forms
            .get_mut(form_id)
            .ok_or_else(|| RepositoryError::NotFound(form_id.to_string()))?;
        form.draft = Some(definition.clone());
        Ok(())
    }

    async fn delete_form(&self, form_id: &str, auth_token: &str) -> Result<(), RepositoryError> {
        check_token(auth_token)?;
        self.forms
            .remove(form_id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(form_id.to_string()))
    }
}
