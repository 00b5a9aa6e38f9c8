use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};

use axum::http::{StatusCode, request::Parts};
use axum::extract::FromRequestParts;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_sessions::{
    ExpiredDeletion, Session, SessionStore,
    cookie::time::OffsetDateTime,
    session::{Id, Record},
    session_store,
};

use crate::web::USER_KEY;

/// User identity as carried in the session cookie record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
}

/// Session state as seen by page handlers. The session lookup completes
/// before a handler runs, so there is no in-between state to represent.
#[derive(Clone, Debug, Default)]
pub enum Auth {
    #[default]
    Anonymous,
    Authenticated(SessionUser),
}

impl Auth {
    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            Auth::Anonymous => None,
            Auth::Authenticated(user) => Some(user),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|u| u.is_admin)
    }
}

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        match session.get::<SessionUser>(USER_KEY).await {
            Ok(Some(user)) => Ok(Auth::Authenticated(user)),
            Ok(None) => Ok(Auth::Anonymous),
            Err(e) => {
                tracing::error!("Error reading user from session: {e}");
                Ok(Auth::Anonymous)
            }
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct InMemSessionStore(Arc<Mutex<HashMap<Id, Record>>>);

#[async_trait()]
impl SessionStore for InMemSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let mut store_guard = self.0.lock().await;
        while store_guard.contains_key(&record.id) {
            record.id = Id::default();
        }
        store_guard.insert(record.id, record.clone());
        Ok(())
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.0.lock().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        Ok(self
            .0
            .lock()
            .await
            .get(session_id)
            .filter(|Record { expiry_date, .. }| expiry_date > &OffsetDateTime::now_utc())
            .cloned())
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.0.lock().await.remove(session_id);
        Ok(())
    }
}

#[async_trait()]
impl ExpiredDeletion for InMemSessionStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        tracing::debug!("deleting expired sessions");
        self.0
            .lock()
            .await
            .retain(|_key, &mut Record { expiry_date, .. }| {
                expiry_date >= OffsetDateTime::now_utc()
            });
        Ok(())
    }
}
