//! [`SessionStore`] over the `sessions` table.

use aop_core::error::AopResult;
use aop_core::models::session::{CreateSession, Session, interval_literal};
use aop_core::repository::SessionStore;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Serialize;
use uuid::Uuid;

use super::RestBackend;

const TABLE: &str = "/rest/v1/sessions";
const CREATE_RPC: &str = "/rest/v1/rpc/safe_create_session";
/// Ask PostgREST for a single JSON object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Serialize)]
struct CreateSessionArgs {
    p_user_id: Uuid,
    p_device_info: String,
    p_expires_in: String,
}

#[derive(Serialize)]
struct TouchBody {
    last_activity: DateTime<Utc>,
}

#[derive(Serialize)]
struct DeactivateBody {
    is_active: bool,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Filter for the newest active, unexpired row of a user.
fn latest_current_query(user_id: Uuid, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
    vec![
        ("select", "*".into()),
        ("user_id", format!("eq.{user_id}")),
        ("is_active", "eq.true".into()),
        ("expires_at", format!("gt.{}", timestamp(now))),
        ("order", "created_at.desc".into()),
        ("limit", "1".into()),
    ]
}

impl SessionStore for RestBackend {
    async fn create(&self, input: CreateSession) -> AopResult<Uuid> {
        let req = self
            .request(Method::POST, CREATE_RPC)
            .json(&CreateSessionArgs {
                p_user_id: input.user_id,
                p_device_info: input.device_info,
                p_expires_in: interval_literal(input.expires_in),
            });
        Ok(Self::send_json::<Uuid>(req).await?)
    }

    async fn get_by_id(&self, id: Uuid) -> AopResult<Session> {
        let req = self
            .request(Method::GET, TABLE)
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);
        Self::send_json::<Session>(req).await.map_err(Into::into)
    }

    async fn latest_current(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AopResult<Option<Session>> {
        let req = self
            .request(Method::GET, TABLE)
            .query(&latest_current_query(user_id, now));
        let rows = Self::send_json::<Vec<Session>>(req).await?;
        Ok(rows.into_iter().next())
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> AopResult<()> {
        let req = self
            .request(Method::PATCH, TABLE)
            .header("Prefer", "return=minimal")
            .query(&[("id", format!("eq.{id}"))])
            .json(&TouchBody { last_activity: at });
        Self::send_empty(req).await.map_err(Into::into)
    }

    async fn deactivate_user_sessions(&self, user_id: Uuid) -> AopResult<()> {
        let req = self
            .request(Method::PATCH, TABLE)
            .header("Prefer", "return=minimal")
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("is_active", "eq.true".to_string()),
            ])
            .json(&DeactivateBody { is_active: false });
        Self::send_empty(req).await.map_err(Into::into)
    }

    async fn list_for_user(&self, user_id: Uuid) -> AopResult<Vec<Session>> {
        let req = self.request(Method::GET, TABLE).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "created_at.desc".to_string()),
        ]);
        Self::send_json::<Vec<Session>>(req)
            .await
            .map_err(Into::into)
    }
}
