//! Administrator authentication.
//!
//! The lifecycle layer only asks one question of an [`AccessGate`]: does this bearer
//! token belong to a current administrator, and if so, who. Two gates are provided:
//! [`StaticTokenGate`] for long-lived tokens configured as SHA-256 digests, and
//! [`AdminSessions`] for tokens issued by a username/password login.

use crate::clock::Clock;
use crate::config::{AccessConfig, AdminTokenConfig};
use chrono::{DateTime, Duration, Utc};
use may::sync::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// The authenticated caller, recorded in audit logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Missing, unknown, revoked or expired credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unauthorized;

impl fmt::Display for Unauthorized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Caller is not an authenticated administrator")
    }
}

impl std::error::Error for Unauthorized {}

pub trait AccessGate: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<Principal, Unauthorized>;
}

/// Lowercase hex SHA-256 of `token`, the form tokens are configured in.
pub fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Accepts tokens whose digest is listed in `access.admin_tokens`.
pub struct StaticTokenGate {
    principals: HashMap<String, String>,
}

impl StaticTokenGate {
    pub fn new(tokens: &[AdminTokenConfig]) -> Self {
        let principals = tokens
            .iter()
            .map(|t| (t.sha256.trim().to_ascii_lowercase(), t.principal.clone()))
            .collect();
        Self { principals }
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

impl AccessGate for StaticTokenGate {
    fn authenticate(&self, token: &str) -> Result<Principal, Unauthorized> {
        if token.is_empty() {
            return Err(Unauthorized);
        }
        self.principals
            .get(&token_digest(token))
            .map(|name| Principal::new(name.as_str()))
            .ok_or(Unauthorized)
    }
}

struct Session {
    principal: Principal,
    expires_at: DateTime<Utc>,
}

/// Bearer sessions issued by [`AdminSessions::login`].
///
/// Sessions live in process memory; a restart logs every administrator out.
pub struct AdminSessions {
    username: String,
    password: Option<String>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, Session>>,
}

/// A freshly issued bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub principal: Principal,
    pub expires_at: DateTime<Utc>,
}

impl AdminSessions {
    pub fn new(config: &AccessConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            username: config.admin_username.clone(),
            password: config.admin_password.clone(),
            ttl: Duration::minutes(config.session_ttl_minutes.max(1)),
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Checks the configured admin credentials and issues a token.
    ///
    /// Always fails when no admin password is configured.
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken, Unauthorized> {
        let Some(expected) = self.password.as_deref() else {
            log::warn!("Admin login attempted but no admin password is configured");
            return Err(Unauthorized);
        };
        if username != self.username || token_digest(password) != token_digest(expected) {
            log::warn!("Rejected admin login for user '{}'", username);
            return Err(Unauthorized);
        }

        let now = self.clock.now();
        let issued = IssuedToken {
            token: Uuid::new_v4().to_string(),
            principal: Principal::new(username),
            expires_at: now + self.ttl,
        };

        let mut sessions = self.sessions.lock().map_err(|_| Unauthorized)?;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(
            issued.token.clone(),
            Session {
                principal: issued.principal.clone(),
                expires_at: issued.expires_at,
            },
        );
        log::info!("Admin '{}' logged in", username);
        Ok(issued)
    }

    /// Revokes `token`. Returns whether a session was removed.
    pub fn logout(&self, token: &str) -> bool {
        self.sessions
            .lock()
            .map(|mut sessions| sessions.remove(token).is_some())
            .unwrap_or(false)
    }

    pub fn active_sessions(&self) -> usize {
        let now = self.clock.now();
        self.sessions
            .lock()
            .map(|sessions| sessions.values().filter(|s| s.expires_at > now).count())
            .unwrap_or(0)
    }
}

impl AccessGate for AdminSessions {
    fn authenticate(&self, token: &str) -> Result<Principal, Unauthorized> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().map_err(|_| Unauthorized)?;
        match sessions.get(token) {
            Some(session) if session.expires_at > now => Ok(session.principal.clone()),
            Some(_) => {
                sessions.remove(token);
                Err(Unauthorized)
            }
            None => Err(Unauthorized),
        }
    }
}

/// Tries each gate in order and accepts the first match.
pub struct GateChain {
    gates: Vec<Arc<dyn AccessGate>>,
}

impl GateChain {
    pub fn new(gates: Vec<Arc<dyn AccessGate>>) -> Self {
        Self { gates }
    }
}

impl AccessGate for GateChain {
    fn authenticate(&self, token: &str) -> Result<Principal, Unauthorized> {
        self.gates
            .iter()
            .find_map(|gate| gate.authenticate(token).ok())
            .ok_or(Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn access_config() -> AccessConfig {
        AccessConfig {
            admin_password: Some("hunter22".to_string()),
            session_ttl_minutes: 30,
            ..AccessConfig::default()
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn test_token_digest_is_hex_sha256() {
        assert_eq!(
            token_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_static_gate() {
        let gate = StaticTokenGate::new(&[AdminTokenConfig {
            principal: "ops".to_string(),
            sha256: token_digest("s3cret").to_uppercase(),
        }]);
        assert_eq!(gate.authenticate("s3cret").unwrap().name, "ops");
        assert_eq!(gate.authenticate("wrong"), Err(Unauthorized));
        assert_eq!(gate.authenticate(""), Err(Unauthorized));
    }

    #[test]
    fn test_login_and_expiry() {
        let clock = clock();
        let sessions = AdminSessions::new(&access_config(), clock.clone());

        assert_eq!(sessions.login("admin", "nope"), Err(Unauthorized));
        assert_eq!(sessions.login("root", "hunter22"), Err(Unauthorized));

        let issued = sessions.login("admin", "hunter22").unwrap();
        assert!(Uuid::parse_str(&issued.token).is_ok());
        assert_eq!(sessions.authenticate(&issued.token).unwrap().name, "admin");

        clock.advance(Duration::minutes(31));
        assert_eq!(sessions.authenticate(&issued.token), Err(Unauthorized));
        assert_eq!(sessions.active_sessions(), 0);
    }

    #[test]
    fn test_logout_revokes() {
        let sessions = AdminSessions::new(&access_config(), clock());
        let issued = sessions.login("admin", "hunter22").unwrap();
        assert!(sessions.logout(&issued.token));
        assert!(!sessions.logout(&issued.token));
        assert_eq!(sessions.authenticate(&issued.token), Err(Unauthorized));
    }

    #[test]
    fn test_login_disabled_without_password() {
        let sessions = AdminSessions::new(&AccessConfig::default(), clock());
        assert_eq!(sessions.login("admin", ""), Err(Unauthorized));
    }

    #[test]
    fn test_gate_chain() {
        let sessions = Arc::new(AdminSessions::new(&access_config(), clock()));
        let static_gate = Arc::new(StaticTokenGate::new(&[AdminTokenConfig {
            principal: "ops".to_string(),
            sha256: token_digest("s3cret"),
        }]));
        let chain = GateChain::new(vec![
            static_gate as Arc<dyn AccessGate>,
            sessions.clone() as Arc<dyn AccessGate>,
        ]);

        let issued = sessions.login("admin", "hunter22").unwrap();
        assert_eq!(chain.authenticate(&issued.token).unwrap().name, "admin");
        assert_eq!(chain.authenticate("s3cret").unwrap().name, "ops");
        assert_eq!(chain.authenticate("nothing"), Err(Unauthorized));
    }
}
