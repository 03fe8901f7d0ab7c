//! User administration endpoints.

use crate::api_client::RestClient;
use crate::key::{path_segment, ResourceKey};
use reqwest::Method;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use vidashield_cache::{Clock, FetchRead, FetchResult, RequestOptions};

/// Collection path; every mutation invalidates cached reads under it.
pub const USERS_PATH: &str = "/api/users";

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 10;

/// Role as stored by the backend. Both the Portuguese and English spellings
/// are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "gerente", alias = "manager")]
    Manager,
    #[serde(rename = "usuario", alias = "user")]
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "gerente",
            Self::User => "usuario",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserStatus {
    #[serde(rename = "pendente", alias = "pending")]
    Pending,
    #[serde(rename = "ativo", alias = "active")]
    Active,
    #[serde(rename = "recusado", alias = "rejected")]
    Rejected,
    #[serde(rename = "inactive", alias = "inativo")]
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pendente",
            Self::Active => "ativo",
            Self::Rejected => "recusado",
            Self::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub status: UserStatus,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(
        default,
        rename = "lastLogin",
        alias = "last_login",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// One page of the user listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersPage {
    pub users: Vec<User>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUsers {
    pub users: Vec<User>,
    #[serde(default, alias = "total")]
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserEnvelope {
    user: User,
}

/// Payload for creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
}

/// Partial update; unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
}

#[derive(Debug, Serialize)]
struct StatusChange {
    status: UserStatus,
}

/// Listing filters. Every set field becomes part of the cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilters {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<UserRole>,
}

impl UserFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn status(mut self, status: UserStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    fn effective_page(&self) -> u32 {
        self.page.unwrap_or(DEFAULT_PAGE).max(1)
    }

    fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).max(1)
    }

    /// `page` and `limit` are always sent, with their defaults if unset.
    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(USERS_PATH)
            .param("page", self.effective_page())
            .param("limit", self.effective_limit())
            .param_opt("search", self.search.as_deref())
            .param_opt("status", self.status.map(|s| s.as_str()))
            .param_opt("role", self.role.map(|r| r.as_str()))
    }

    /// Apply the filters to users already held locally.
    ///
    /// Search is a case-insensitive substring match on name or email.
    pub fn apply(&self, users: &[User]) -> UsersPage {
        let needle = self
            .search
            .as_deref()
            .map(str::to_lowercase)
            .filter(|s| !s.is_empty());

        let matching: Vec<&User> = users
            .iter()
            .filter(|user| {
                needle.as_ref().map_or(true, |needle| {
                    user.name.to_lowercase().contains(needle)
                        || user.email.to_lowercase().contains(needle)
                })
            })
            .filter(|user| self.status.map_or(true, |status| user.status == status))
            .filter(|user| self.role.map_or(true, |role| user.role == role))
            .collect();

        let page = self.effective_page();
        let limit = self.effective_limit();
        let total = matching.len() as u64;
        let start = (page as usize - 1).saturating_mul(limit as usize);

        UsersPage {
            users: matching
                .into_iter()
                .skip(start)
                .take(limit as usize)
                .cloned()
                .collect(),
            total,
            page,
            limit,
            total_pages: Some(total.div_ceil(u64::from(limit)) as u32),
        }
    }
}

/// `/api/users/{id}{action}` with the id encoded as one segment.
fn user_path(user_id: &str, action: &str) -> FetchResult<String> {
    Ok(format!("{USERS_PATH}/{}{action}", path_segment(user_id)?))
}

/// User administration service.
pub struct UsersApi<'a, C> {
    client: &'a RestClient<C>,
}

impl<'a, C: Clock> UsersApi<'a, C> {
    pub fn new(client: &'a RestClient<C>) -> Self {
        Self { client }
    }

    pub async fn list(
        &self,
        filters: &UserFilters,
        options: RequestOptions<UsersPage>,
    ) -> FetchResult<FetchRead<UsersPage>> {
        self.client
            .get_json(&filters.resource_key(), options)
            .await
    }

    pub async fn pending(
        &self,
        options: RequestOptions<PendingUsers>,
    ) -> FetchResult<FetchRead<PendingUsers>> {
        let key = ResourceKey::new(format!("{USERS_PATH}/pending"));
        self.client.get_json(&key, options).await
    }

    pub async fn create(&self, user: &NewUser) -> FetchResult<User> {
        self.mutate_user(Method::POST, USERS_PATH.to_string(), Some(user))
            .await
    }

    pub async fn update(&self, user_id: &str, update: &UserUpdate) -> FetchResult<User> {
        self.mutate_user(Method::PUT, user_path(user_id, "")?, Some(update))
            .await
    }

    pub async fn approve(&self, user_id: &str) -> FetchResult<User> {
        self.mutate_user::<()>(Method::PATCH, user_path(user_id, "/approve")?, None)
            .await
    }

    pub async fn reject(&self, user_id: &str) -> FetchResult<()> {
        let path = user_path(user_id, "/reject")?;
        self.client
            .send_json::<IgnoredAny, ()>(Method::DELETE, &path, None, USERS_PATH)
            .await
            .map(|_| ())
    }

    pub async fn reset_password(&self, user_id: &str) -> FetchResult<()> {
        let path = user_path(user_id, "/reset-password")?;
        self.client
            .send_json::<IgnoredAny, ()>(Method::POST, &path, None, USERS_PATH)
            .await
            .map(|_| ())
    }

    /// Grant the admin role.
    pub async fn promote(&self, user_id: &str) -> FetchResult<User> {
        self.mutate_user::<()>(Method::PUT, user_path(user_id, "/promote")?, None)
            .await
    }

    pub async fn update_status(&self, user_id: &str, status: UserStatus) -> FetchResult<User> {
        self.mutate_user(
            Method::PUT,
            user_path(user_id, "/status")?,
            Some(&StatusChange { status }),
        )
        .await
    }

    async fn mutate_user<B: Serialize>(
        &self,
        method: Method,
        path: String,
        body: Option<&B>,
    ) -> FetchResult<User> {
        let envelope: UserEnvelope = self
            .client
            .send_json(method, &path, body, USERS_PATH)
            .await?;
        Ok(envelope.user)
    }
}
