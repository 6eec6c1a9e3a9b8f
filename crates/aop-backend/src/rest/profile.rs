//! [`ProfileStore`] over the `profiles` and `admin_profiles` tables.

use aop_core::error::{AopError, AopResult};
use aop_core::models::profile::{AdminProfile, CreateAdminProfile, CreateProfile, Profile};
use aop_core::repository::ProfileStore;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::RestBackend;

const PROFILES: &str = "/rest/v1/profiles";
const ADMIN_PROFILES: &str = "/rest/v1/admin_profiles";

impl RestBackend {
    /// At most one row matching `column = value`.
    async fn maybe_single<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        value: String,
    ) -> AopResult<Option<T>> {
        let req = self.request(Method::GET, table).query(&[
            ("select", "*".to_string()),
            (column, format!("eq.{value}")),
            ("limit", "1".to_string()),
        ]);
        let rows = Self::send_json::<Vec<T>>(req).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_one<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        entity: &str,
        body: &B,
    ) -> AopResult<T> {
        let req = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&[body]);
        let rows = Self::send_json::<Vec<T>>(req).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AopError::Internal(format!("insert into {entity} returned no row")))
    }
}

impl ProfileStore for RestBackend {
    async fn profile_by_user(&self, user_id: Uuid) -> AopResult<Option<Profile>> {
        self.maybe_single(PROFILES, "user_id", user_id.to_string())
            .await
    }

    async fn profile_by_email(&self, email: &str) -> AopResult<Option<Profile>> {
        self.maybe_single(PROFILES, "email", email.to_string()).await
    }

    async fn create_profile(&self, input: CreateProfile) -> AopResult<Profile> {
        self.insert_one(PROFILES, "profiles", &input).await
    }

    async fn admin_profile_by_user(&self, user_id: Uuid) -> AopResult<Option<AdminProfile>> {
        self.maybe_single(ADMIN_PROFILES, "user_id", user_id.to_string())
            .await
    }

    async fn admin_profile_by_email(&self, email: &str) -> AopResult<Option<AdminProfile>> {
        self.maybe_single(ADMIN_PROFILES, "email", email.to_string())
            .await
    }

    async fn create_admin_profile(&self, input: CreateAdminProfile) -> AopResult<AdminProfile> {
        self.insert_one(ADMIN_PROFILES, "admin_profiles", &input)
            .await
    }
}
