//! The form metadata store collaborator (out of scope per spec §1,
//! modeled at a trait boundary): a read-only lookup by form identifier,
//! backed by PocketBase in production.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LookupError;

/// The `handler` sub-record of a form: who mail is from, who it goes to,
/// and which template renders it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Handler {
    pub from_name: String,
    pub from_email: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub template: String,
    pub gateway: Option<String>,
}

/// A form record, as retrieved from the form metadata store by `form_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormRecord {
    pub form_id: String,
    pub allow_duplicates: bool,
    pub handler: Option<Handler>,
}

/// Read-only form metadata lookup.
#[async_trait]
pub trait FormStore: Send + Sync {
    async fn lookup(&self, form_id: &str) -> Result<FormRecord, LookupError>;
}

/// PocketBase-backed form store. Authenticates as a superuser at
/// construction time; lookups are plain authenticated GET requests.
pub struct PocketBaseFormStore {
    base_url: String,
    client: reqwest::Client,
    auth_token: String,
}

impl PocketBaseFormStore {
    /// Authenticate against PocketBase and hold the resulting token.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn authenticate(
        base_url: &str,
        email: &str,
        password: &str,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();

        #[derive(Serialize)]
        struct AuthRequest<'a> {
            identity: &'a str,
            password: &'a str,
        }

        #[derive(Deserialize)]
        struct AuthResponse {
            token: String,
        }

        let response = client
            .post(format!("{base_url}/api/collections/_superusers/auth-with-password"))
            .json(&AuthRequest {
                identity: email,
                password,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<AuthResponse>()
            .await?;

        Ok(Self {
            base_url: base_url.to_string(),
            client,
            auth_token: response.token,
        })
    }
}

#[async_trait]
impl FormStore for PocketBaseFormStore {
    #[tracing::instrument(skip(self))]
    async fn lookup(&self, form_id: &str) -> Result<FormRecord, LookupError> {
        let response = self
            .client
            .get(format!("{}/api/collections/forms/records/{form_id}", self.base_url))
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LookupError::FormNotFound);
        }

        response
            .error_for_status()
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?
            .json::<FormRecord>()
            .await
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))
    }
}

#[cfg(test)]
pub mod fake {
    use std::{collections::HashMap, sync::RwLock};

    use super::{async_trait, FormRecord, FormStore, LookupError};

    /// In-memory form store test double, seeded with fixed records.
    #[derive(Default)]
    pub struct FakeFormStore {
        records: RwLock<HashMap<String, FormRecord>>,
    }

    impl FakeFormStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, record: FormRecord) {
            self.records
                .write()
                .expect("lock poisoned")
                .insert(record.form_id.clone(), record);
        }
    }

    #[async_trait]
    impl FormStore for FakeFormStore {
        async fn lookup(&self, form_id: &str) -> Result<FormRecord, LookupError> {
            self.records
                .read()
                .expect("lock poisoned")
                .get(form_id)
                .cloned()
                .ok_or(LookupError::FormNotFound)
        }
    }
}
