//! Netatmo OAuth2 access tokens.
//!
//! Netatmo no longer accepts the password grant. A refresh token is created
//! on dev.netatmo.com and exchanged here for short-lived access tokens;
//! every exchange may rotate the refresh token.

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Deserializer};

use crate::error::AuthError;
use crate::fetch::{Body, Transport};

pub const TOKEN_URL: &str = "https://api.netatmo.com/oauth2/token";

#[derive(Debug, Clone)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub refresh_token: String,
    pub scope: Vec<String>,
    /// Only meaningful while `access_token` is set.
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    // Netatmo sends both spellings.
    expires_in: Option<i64>,
    expire_in: Option<i64>,
    #[serde(default, deserialize_with = "one_or_many")]
    scope: Vec<String>,
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(scope) => scope.split_whitespace().map(String::from).collect(),
        OneOrMany::Many(scopes) => scopes,
    })
}

pub struct TokenManager {
    client_id: String,
    client_secret: String,
    state: TokenState,
}

impl TokenManager {
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            client_id,
            client_secret,
            state: TokenState {
                access_token: None,
                refresh_token,
                scope: Vec::new(),
                expires_at: DateTime::<Utc>::MIN_UTC,
            },
        }
    }

    pub fn state(&self) -> &TokenState {
        &self.state
    }

    /// A token valid at `now`, exchanging the refresh token when there is
    /// none or it has expired.
    pub fn access_token(
        &mut self,
        transport: &dyn Transport,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        match &self.state.access_token {
            None => info!("*** Get new token from Netatmo"),
            Some(token) if self.state.expires_at > now => {
                info!("*** Token from Netatmo reused");
                return Ok(token.clone());
            }
            Some(_) => info!("*** Refresh token from Netatmo"),
        }

        match self.exchange(transport, now) {
            Ok(token) => Ok(token),
            Err(err) => {
                error!("authentication request rejected: {err}");
                if let AuthError::Payload { payload, .. } = &err {
                    debug!("{payload}");
                }
                self.state.access_token = None;
                Err(err)
            }
        }
    }

    /// Forget the access token so the next call authenticates again.
    pub fn invalidate(&mut self) {
        if self.state.access_token.take().is_some() {
            debug!("access token invalidated");
        }
    }

    fn exchange(&mut self, transport: &dyn Transport, now: DateTime<Utc>) -> Result<String, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.state.refresh_token.as_str()),
        ];

        let value = match transport.post_form(TOKEN_URL, &params, None)? {
            Body::Json(value) => value,
            raw => return Err(rejected("response is not JSON", raw.describe())),
        };

        let response = TokenResponse::deserialize(&value)
            .map_err(|err| rejected(err.to_string(), value.to_string()))?;

        let expires_in = response
            .expires_in
            .or(response.expire_in)
            .ok_or_else(|| rejected("missing expires_in", value.to_string()))?;
        let expires_at = TimeDelta::try_seconds(expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| rejected("expires_in out of range", value.to_string()))?;

        self.state = TokenState {
            access_token: Some(response.access_token.clone()),
            refresh_token: response.refresh_token,
            scope: response.scope,
            expires_at,
        };
        debug!(
            "*** New token from Netatmo, valid until {}, scope [{}]",
            self.state.expires_at,
            self.state.scope.join(" ")
        );

        Ok(response.access_token)
    }
}

fn rejected(reason: impl Into<String>, payload: String) -> AuthError {
    AuthError::Payload {
        reason: reason.into(),
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::scripted::ScriptedTransport;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()
    }

    fn manager() -> TokenManager {
        TokenManager::new("cid".into(), "csecret".into(), "refresh-0".into())
    }

    fn grant(transport: &ScriptedTransport, access: &str, refresh: &str) {
        transport.reply_json(
            TOKEN_URL,
            &format!(
                r#"{{"access_token":"{access}","refresh_token":"{refresh}","scope":["read_station","read_thermostat"],"expires_in":10800,"expire_in":10800}}"#
            ),
        );
    }

    #[test]
    fn first_call_exchanges_refresh_token() {
        let transport = ScriptedTransport::new();
        grant(&transport, "access-1", "refresh-1");
        let mut tokens = manager();

        let token = tokens.access_token(&transport, now()).unwrap();

        assert_eq!(token, "access-1");
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].params,
            [
                ("grant_type".to_string(), "refresh_token".to_string()),
                ("client_id".to_string(), "cid".to_string()),
                ("client_secret".to_string(), "csecret".to_string()),
                ("refresh_token".to_string(), "refresh-0".to_string()),
            ]
        );

        let state = tokens.state();
        assert_eq!(state.refresh_token, "refresh-1");
        assert_eq!(state.scope, ["read_station", "read_thermostat"]);
        assert_eq!(state.expires_at, now() + TimeDelta::seconds(10800));
    }

    #[test]
    fn unexpired_token_is_reused_without_network() {
        let transport = ScriptedTransport::new();
        grant(&transport, "access-1", "refresh-1");
        let mut tokens = manager();
        tokens.access_token(&transport, now()).unwrap();

        let later = now() + TimeDelta::seconds(10799);
        assert_eq!(tokens.access_token(&transport, later).unwrap(), "access-1");
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn expired_token_is_refreshed_once() {
        let transport = ScriptedTransport::new();
        grant(&transport, "access-1", "refresh-1");
        grant(&transport, "access-2", "refresh-2");
        let mut tokens = manager();
        tokens.access_token(&transport, now()).unwrap();

        let expiry = now() + TimeDelta::seconds(10800);
        assert_eq!(tokens.access_token(&transport, expiry).unwrap(), "access-2");

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1]
            .params
            .contains(&("refresh_token".to_string(), "refresh-1".to_string())));
        assert_eq!(tokens.state().refresh_token, "refresh-2");
        assert_eq!(tokens.state().expires_at, expiry + TimeDelta::seconds(10800));
    }

    #[test]
    fn failed_refresh_clears_access_token() {
        let transport = ScriptedTransport::new();
        grant(&transport, "access-1", "refresh-1");
        transport.reply_status(TOKEN_URL, 400);
        let mut tokens = manager();
        tokens.access_token(&transport, now()).unwrap();

        let expiry = now() + TimeDelta::hours(4);
        let err = tokens.access_token(&transport, expiry).unwrap_err();

        assert!(matches!(err, AuthError::Exchange(_)));
        assert!(tokens.state().access_token.is_none());
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn failed_first_exchange_leaves_state_empty() {
        let transport = ScriptedTransport::new();
        transport.reply_status(TOKEN_URL, 503);
        let mut tokens = manager();

        assert!(tokens.access_token(&transport, now()).is_err());
        assert!(tokens.state().access_token.is_none());
        assert_eq!(tokens.state().refresh_token, "refresh-0");
    }

    #[test]
    fn malformed_token_payload_is_rejected() {
        let transport = ScriptedTransport::new();
        transport.reply_json(TOKEN_URL, r#"{"error":"invalid_client"}"#);
        let mut tokens = manager();

        let err = tokens.access_token(&transport, now()).unwrap_err();

        match err {
            AuthError::Payload { payload, .. } => assert!(payload.contains("invalid_client")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(tokens.state().access_token.is_none());
    }

    #[test]
    fn legacy_expiry_spelling_and_string_scope() {
        let transport = ScriptedTransport::new();
        transport.reply_json(
            TOKEN_URL,
            r#"{"access_token":"a","refresh_token":"r","scope":"read_station read_thermostat","expire_in":60}"#,
        );
        let mut tokens = manager();

        tokens.access_token(&transport, now()).unwrap();

        assert_eq!(tokens.state().expires_at, now() + TimeDelta::seconds(60));
        assert_eq!(tokens.state().scope, ["read_station", "read_thermostat"]);
    }

    #[test]
    fn unrepresentable_expiry_is_rejected() {
        let transport = ScriptedTransport::new();
        transport.reply_json(
            TOKEN_URL,
            r#"{"access_token":"a","refresh_token":"r","expires_in":9000000000000000}"#,
        );
        let mut tokens = manager();

        let err = tokens.access_token(&transport, now()).unwrap_err();

        match err {
            AuthError::Payload { reason, .. } => assert_eq!(reason, "expires_in out of range"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(tokens.state().access_token.is_none());
        assert_eq!(tokens.state().refresh_token, "refresh-0");
    }

    #[test]
    fn invalidate_forces_reauthentication() {
        let transport = ScriptedTransport::new();
        grant(&transport, "access-1", "refresh-1");
        grant(&transport, "access-2", "refresh-2");
        let mut tokens = manager();
        tokens.access_token(&transport, now()).unwrap();

        tokens.invalidate();

        assert_eq!(tokens.access_token(&transport, now()).unwrap(), "access-2");
        assert_eq!(transport.calls().len(), 2);
    }
}
