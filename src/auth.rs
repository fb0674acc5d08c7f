//! Admin login gate.
//!
//! A single configured password unlocks the dashboard. A successful login
//! hands out a bearer token that expires after the configured TTL.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AdminConfig;
use crate::routes::{AppError, AppState};

pub struct AdminGate {
    password: Option<String>,
    ttl: Duration,
    sessions: RwLock<HashMap<String, DateTime<Utc>>>,
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl AdminGate {
    pub fn new(config: Option<&AdminConfig>) -> Self {
        Self {
            password: config.map(|c| c.password.clone()),
            ttl: Duration::minutes(config.map(|c| c.session_ttl_minutes).unwrap_or(0)),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.password.is_some()
    }

    /// Returns a fresh session token when `password` matches.
    pub async fn login(&self, password: &str) -> Option<String> {
        let expected = self.password.as_deref()?;
        if !constant_time_eq(expected.as_bytes(), password.as_bytes()) {
            warn!("Rejected admin login attempt");
            return None;
        }

        let token = Uuid::new_v4().to_string();
        let expires = Utc::now() + self.ttl;

        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        sessions.retain(|_, exp| *exp > now);
        sessions.insert(token.clone(), expires);
        info!("Admin session opened ({} active)", sessions.len());

        Some(token)
    }

    pub async fn verify(&self, token: &str) -> bool {
        let expires = match self.sessions.read().await.get(token) {
            Some(expires) => *expires,
            None => return false,
        };

        if expires > Utc::now() {
            return true;
        }

        self.sessions.write().await.remove(token);
        false
    }

    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}

/// Extractor for routes behind the login gate.
pub struct AdminSession {
    pub token: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AppError::Unauthorized)?;

        if !state.admin.verify(token).await {
            return Err(AppError::Unauthorized);
        }

        Ok(AdminSession {
            token: token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(ttl_minutes: i64) -> AdminGate {
        AdminGate::new(Some(&AdminConfig {
            password: "letmein".to_string(),
            session_ttl_minutes: ttl_minutes,
        }))
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[tokio::test]
    async fn test_login_with_correct_password() {
        let gate = gate(60);
        let token = gate.login("letmein").await.unwrap();
        assert!(gate.verify(&token).await);
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let gate = gate(60);
        assert!(gate.login("letmeout").await.is_none());
        assert!(gate.login("").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_gate_rejects_everything() {
        let gate = AdminGate::new(None);
        assert!(!gate.is_enabled());
        assert!(gate.login("").await.is_none());
        assert!(gate.login("letmein").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let gate = gate(60);
        assert!(!gate.verify("not-a-token").await);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let gate = gate(0);
        let token = gate.login("letmein").await.unwrap();
        assert!(!gate.verify(&token).await);
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let gate = gate(60);
        let token = gate.login("letmein").await.unwrap();
        assert!(gate.logout(&token).await);
        assert!(!gate.verify(&token).await);
        assert!(!gate.logout(&token).await);
    }

    #[tokio::test]
    async fn test_tokens_are_distinct() {
        let gate = gate(60);
        let a = gate.login("letmein").await.unwrap();
        let b = gate.login("letmein").await.unwrap();
        assert_ne!(a, b);
        assert!(gate.verify(&a).await);
        assert!(gate.verify(&b).await);
    }
}
