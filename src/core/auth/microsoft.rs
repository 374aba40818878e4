// ─── Microsoft OAuth Chain ───
// Turns a one-time authorization code into a validated session:
// code → Microsoft tokens → Xbox Live → XSTS → Minecraft services → profile.
// Also owns the refresh protocol that keeps the stored session fresh.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::auth::{AccountKind, AuthSession, TokenStore};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::{check_status, with_retry, RetryPolicy};

const CLIENT_ID: &str = "00000000-0000-0000-0000-0000402b5328";
const OAUTH_SCOPE: &str = "XboxLive.signin offline_access";
const XBL_CONTRACT_VERSION: &str = "1";

/// Refresh when the access token expires within this window.
const REFRESH_WINDOW_MS: i64 = 5 * 60 * 1000;
/// Absolute cap on the interactive consent flow.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Endpoint set for the federated identity exchange. Live defaults; tests
/// point everything at a mock server.
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub xbox_user_auth_url: String,
    pub xsts_authorize_url: String,
    pub minecraft_login_url: String,
    pub minecraft_profile_url: String,
    pub redirect_uri: String,
    pub client_id: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://login.live.com/oauth20_authorize.srf".into(),
            token_url: "https://login.live.com/oauth20_token.srf".into(),
            xbox_user_auth_url: "https://user.auth.xboxlive.com/user/authenticate".into(),
            xsts_authorize_url: "https://xsts.auth.xboxlive.com/xsts/authorize".into(),
            minecraft_login_url: "https://api.minecraftservices.com/authentication/login_with_xbox"
                .into(),
            minecraft_profile_url: "https://api.minecraftservices.com/minecraft/profile".into(),
            redirect_uri: "https://login.live.com/oauth20_desktop.srf".into(),
            client_id: CLIENT_ID.into(),
        }
    }
}

/// What the interactive consent window reports back.
#[derive(Debug, Clone)]
pub enum BrowserEvent {
    /// The window navigated or was redirected to this URL.
    Navigated(String),
    /// The window was closed by the user.
    Closed,
}

/// Host-provided browser surface for the consent flow. The authenticator
/// drives it; implementations only open the URL and forward navigation.
#[async_trait]
pub trait ConsentBrowser: Send + Sync {
    async fn open(&self, url: &str) -> LauncherResult<mpsc::Receiver<BrowserEvent>>;
}

// ── Wire payloads ───────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MicrosoftTokens {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct XboxAuthResponse {
    #[serde(rename = "Token")]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XstsResponse {
    #[serde(rename = "Token")]
    token: Option<String>,
    #[serde(rename = "DisplayClaims", default)]
    display_claims: Option<DisplayClaims>,
}

#[derive(Debug, Deserialize)]
struct DisplayClaims {
    #[serde(default)]
    xui: Vec<XuiClaim>,
}

#[derive(Debug, Deserialize)]
struct XuiClaim {
    uhs: String,
}

/// XSTS token plus the user hash needed for the Minecraft identity token.
#[derive(Debug, Clone)]
struct XstsTokens {
    token: String,
    user_hash: String,
}

#[derive(Debug, Deserialize)]
struct MinecraftTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MinecraftProfile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

// ── Authenticator ───────────────────────────────────────

/// Executes the 5-stage exchange, persists the resulting session, and keeps
/// it fresh. One instance per launcher; both the interactive flow and the
/// refresh path are serialized by in-flight guards.
pub struct MicrosoftAuthenticator {
    client: reqwest::Client,
    endpoints: AuthEndpoints,
    store: TokenStore,
    auth_in_flight: AtomicBool,
    refresh_lock: Mutex<()>,
    consent_timeout: Duration,
}

impl MicrosoftAuthenticator {
    pub fn new(client: reqwest::Client, endpoints: AuthEndpoints, store: TokenStore) -> Self {
        Self {
            client,
            endpoints,
            store,
            auth_in_flight: AtomicBool::new(false),
            refresh_lock: Mutex::new(()),
            consent_timeout: CONSENT_TIMEOUT,
        }
    }

    pub fn with_consent_timeout(mut self, timeout: Duration) -> Self {
        self.consent_timeout = timeout;
        self
    }

    /// Retry policy for the code/refresh grant (stage 1).
    fn grant_policy() -> RetryPolicy {
        RetryPolicy::exponential(3, Duration::from_millis(1000)).with_connection_retries()
    }

    /// Retry policy for the downstream stages (Xbox, XSTS, Minecraft, profile).
    fn stage_policy() -> RetryPolicy {
        RetryPolicy::exponential(3, Duration::from_millis(500)).with_connection_retries()
    }

    // ── Interactive flow ────────────────────────────────

    /// Build the browser consent URL.
    pub fn authorize_url(&self) -> LauncherResult<String> {
        let url = Url::parse_with_params(
            &self.endpoints.authorize_url,
            &[
                ("client_id", self.endpoints.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.endpoints.redirect_uri.as_str()),
                ("scope", OAUTH_SCOPE),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| LauncherError::Other(format!("invalid authorize URL: {e}")))?;
        Ok(url.into())
    }

    /// Drive the interactive consent window and run the full chain on the
    /// extracted code. Resolves exactly once: code, explicit `error=` param,
    /// window closed, or consent timeout. A second call while one is in
    /// flight is rejected.
    pub async fn authenticate(&self, browser: &dyn ConsentBrowser) -> LauncherResult<AuthSession> {
        if self.auth_in_flight.swap(true, Ordering::SeqCst) {
            return Err(LauncherError::AuthInProgress);
        }

        let result = self.authenticate_inner(browser).await;
        self.auth_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn authenticate_inner(&self, browser: &dyn ConsentBrowser) -> LauncherResult<AuthSession> {
        let url = self.authorize_url()?;
        info!("Starting Microsoft authentication");
        let mut events = browser.open(&url).await?;

        let code = tokio::time::timeout(self.consent_timeout, async {
            while let Some(event) = events.recv().await {
                match event {
                    BrowserEvent::Navigated(url) => {
                        if let Some(outcome) = extract_redirect_outcome(&url) {
                            return outcome;
                        }
                    }
                    BrowserEvent::Closed => return Err(LauncherError::AuthWindowClosed),
                }
            }
            // Event channel dropped without a redirect: the window is gone.
            Err(LauncherError::AuthWindowClosed)
        })
        .await
        .map_err(|_| LauncherError::AuthTimeout)??;

        debug!("Authorization code received");
        self.complete_auth_flow(&code).await
    }

    /// Run the full chain from an authorization code and persist the session.
    pub async fn complete_auth_flow(&self, code: &str) -> LauncherResult<AuthSession> {
        let tokens = self
            .exchange_code(code)
            .await
            .map_err(|e| stage_failure("Cannot obtain Microsoft token", e))?;

        let session = self.derive_session(tokens).await?;
        self.store.save(&session)?;
        info!("Authentication successful for {}", session.username);
        Ok(session)
    }

    // ── Refresh protocol ────────────────────────────────

    /// Return a valid Minecraft access token, refreshing the stored session
    /// first when it expires within 5 minutes. Refreshes are serialized; a
    /// failed refresh clears the stored session so the user re-logs in.
    pub async fn ensure_valid_token(&self) -> LauncherResult<String> {
        let _refresh_guard = self.refresh_lock.lock().await;

        let session = self.store.load().ok_or(LauncherError::NotLoggedIn)?;
        if session.kind != AccountKind::Microsoft {
            return Err(LauncherError::InvalidSession(
                "offline sessions carry no Minecraft access token".into(),
            ));
        }

        if !session.expires_within_ms(REFRESH_WINDOW_MS) {
            return session
                .access_token
                .clone()
                .ok_or_else(|| LauncherError::InvalidSession("session without access token".into()));
        }

        info!("Access token expiring soon, refreshing");
        match self.refresh_session(session).await {
            Ok(token) => Ok(token),
            Err(error) => {
                // A half-refreshed session is worse than none; force re-login.
                warn!("Token refresh failed, clearing session: {}", error);
                self.store.clear();
                Err(error)
            }
        }
    }

    /// Refresh-token grant followed by a full re-run of stages 2-5. The
    /// downstream Xbox/XSTS/Minecraft tokens cannot be refreshed on their own
    /// and must be re-derived.
    async fn refresh_session(&self, previous: AuthSession) -> LauncherResult<String> {
        let refresh_token = previous
            .refresh_token
            .clone()
            .ok_or_else(|| LauncherError::Auth("no refresh token available".into()))?;

        let mut tokens = self
            .refresh_grant(&refresh_token)
            .await
            .map_err(|e| stage_failure("Cannot refresh Microsoft token", e))?;

        // The provider may omit a rotated refresh token; keep the old one.
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token);
        }

        let mut session = self.derive_session(tokens).await?;
        // The client token is stable across refreshes.
        session.client_token = previous.client_token;
        let access_token = session
            .access_token
            .clone()
            .expect("derived Microsoft session carries an access token");
        self.store.save(&session)?;
        info!("Token refreshed for {}", session.username);
        Ok(access_token)
    }

    /// Stages 2-5: Microsoft tokens → Xbox → XSTS → Minecraft token → profile.
    async fn derive_session(&self, tokens: MicrosoftTokens) -> LauncherResult<AuthSession> {
        let xbox_token = self
            .xbox_authenticate(&tokens.access_token)
            .await
            .map_err(|e| stage_failure("Xbox Live authentication error", e))?;

        let xsts = self
            .xsts_authorize(&xbox_token)
            .await
            .map_err(|e| stage_failure("XSTS authorization error", e))?;

        let minecraft = self
            .minecraft_login(&xsts)
            .await
            .map_err(|e| stage_failure("Minecraft services login error", e))?;

        let (name, id) = self.fetch_profile(&minecraft.access_token).await?;

        Ok(AuthSession {
            kind: AccountKind::Microsoft,
            username: name,
            uuid: Some(id),
            access_token: Some(minecraft.access_token),
            refresh_token: tokens.refresh_token,
            client_token: Uuid::new_v4().to_string(),
            expires_at: Some(Utc::now().timestamp_millis() + tokens.expires_in * 1000),
        })
    }

    // ── Stage 1: code / refresh grant ───────────────────

    async fn exchange_code(&self, code: &str) -> LauncherResult<MicrosoftTokens> {
        self.token_grant(&[
            ("client_id", self.endpoints.client_id.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.endpoints.redirect_uri.as_str()),
            ("scope", OAUTH_SCOPE),
        ])
        .await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> LauncherResult<MicrosoftTokens> {
        self.token_grant(&[
            ("client_id", self.endpoints.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("redirect_uri", self.endpoints.redirect_uri.as_str()),
            ("scope", OAUTH_SCOPE),
        ])
        .await
    }

    async fn token_grant(&self, form: &[(&str, &str)]) -> LauncherResult<MicrosoftTokens> {
        with_retry("microsoft token grant", Self::grant_policy(), || async move {
            let response = self
                .client
                .post(&self.endpoints.token_url)
                .form(form)
                .send()
                .await?;
            let response = check_status(response)?;
            Ok(response.json::<MicrosoftTokens>().await?)
        })
        .await
    }

    // ── Stage 2: Xbox Live ──────────────────────────────

    async fn xbox_authenticate(&self, ms_access_token: &str) -> LauncherResult<String> {
        let body = serde_json::json!({
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": format!("d={ms_access_token}"),
            },
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT",
        });

        with_retry("xbox live authenticate", Self::stage_policy(), || {
            let body = &body;
            async move {
                let response = self
                    .client
                    .post(&self.endpoints.xbox_user_auth_url)
                    .header("x-xbl-contract-version", XBL_CONTRACT_VERSION)
                    .json(body)
                    .send()
                    .await?;
                let parsed: XboxAuthResponse = check_status(response)?.json().await?;
                parsed
                    .token
                    .ok_or_else(|| LauncherError::Auth("Xbox Live response without token".into()))
            }
        })
        .await
    }

    // ── Stage 3: XSTS ───────────────────────────────────

    async fn xsts_authorize(&self, xbox_token: &str) -> LauncherResult<XstsTokens> {
        let body = serde_json::json!({
            "Properties": {
                "SandboxId": "RETAIL",
                "UserTokens": [xbox_token],
            },
            "RelyingParty": "rp://api.minecraftservices.com/",
            "TokenType": "JWT",
        });

        with_retry("xsts authorize", Self::stage_policy(), || {
            let body = &body;
            async move {
                let response = self
                    .client
                    .post(&self.endpoints.xsts_authorize_url)
                    .header("x-xbl-contract-version", XBL_CONTRACT_VERSION)
                    .json(body)
                    .send()
                    .await?;
                let parsed: XstsResponse = check_status(response)?.json().await?;

                // Both the token and the display-claims user hash are required.
                let token = parsed
                    .token
                    .ok_or_else(|| LauncherError::Auth("XSTS response without token".into()))?;
                let user_hash = parsed
                    .display_claims
                    .and_then(|claims| claims.xui.into_iter().next())
                    .map(|claim| claim.uhs)
                    .ok_or_else(|| {
                        LauncherError::Auth("XSTS response without user hash".into())
                    })?;

                Ok(XstsTokens { token, user_hash })
            }
        })
        .await
    }

    // ── Stage 4: Minecraft services ─────────────────────

    async fn minecraft_login(&self, xsts: &XstsTokens) -> LauncherResult<MinecraftTokenResponse> {
        let body = serde_json::json!({
            "identityToken": format!("XBL3.0 x={};{}", xsts.user_hash, xsts.token),
        });

        with_retry("minecraft login", Self::stage_policy(), || {
            let body = &body;
            async move {
                let response = self
                    .client
                    .post(&self.endpoints.minecraft_login_url)
                    .json(body)
                    .send()
                    .await?;
                Ok(check_status(response)?
                    .json::<MinecraftTokenResponse>()
                    .await?)
            }
        })
        .await
    }

    // ── Stage 5: profile ────────────────────────────────

    /// Fetch the Minecraft profile. A 404 or a body missing `name`/`id`
    /// means the account has no Java Edition entitlement; that is terminal
    /// and never retried as transient.
    async fn fetch_profile(&self, mc_access_token: &str) -> LauncherResult<(String, String)> {
        with_retry("minecraft profile", Self::stage_policy(), || async move {
            let response = self
                .client
                .get(&self.endpoints.minecraft_profile_url)
                .bearer_auth(mc_access_token)
                .send()
                .await?;

            if response.status().as_u16() == 404 {
                return Err(LauncherError::NoGameLicense);
            }

            let profile: MinecraftProfile = check_status(response)?.json().await?;
            match (profile.name, profile.id) {
                (Some(name), Some(id)) if !name.is_empty() && !id.is_empty() => Ok((name, id)),
                _ => Err(LauncherError::NoGameLicense),
            }
        })
        .await
    }
}

/// Map a chain-stage error to a user-facing message, passing terminal
/// entitlement errors through unchanged.
fn stage_failure(stage: &str, error: LauncherError) -> LauncherError {
    match error {
        terminal @ LauncherError::NoGameLicense => terminal,
        other => LauncherError::Auth(format!("{stage}: {other}")),
    }
}

/// Inspect a navigation URL for the OAuth redirect. Returns `None` while the
/// user is still walking through the consent pages.
fn extract_redirect_outcome(url: &str) -> Option<LauncherResult<String>> {
    let parsed = Url::parse(url).ok()?;

    let mut code = None;
    let mut error = None;
    let mut error_description = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(reason) = error {
        return Some(Err(LauncherError::Auth(
            error_description.unwrap_or(reason),
        )));
    }
    code.map(Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mock_endpoints(server: &MockServer) -> AuthEndpoints {
        let base = server.uri();
        AuthEndpoints {
            authorize_url: format!("{base}/oauth20_authorize.srf"),
            token_url: format!("{base}/oauth20_token.srf"),
            xbox_user_auth_url: format!("{base}/user/authenticate"),
            xsts_authorize_url: format!("{base}/xsts/authorize"),
            minecraft_login_url: format!("{base}/authentication/login_with_xbox"),
            minecraft_profile_url: format!("{base}/minecraft/profile"),
            redirect_uri: "https://login.live.com/oauth20_desktop.srf".into(),
            client_id: CLIENT_ID.into(),
        }
    }

    fn authenticator(server: &MockServer, dir: &std::path::Path) -> MicrosoftAuthenticator {
        let client = crate::core::http::build_http_client().unwrap();
        MicrosoftAuthenticator::new(client, mock_endpoints(server), TokenStore::new(dir))
    }

    async fn mount_downstream_stages(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/user/authenticate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Token": "xbox-token",
            })))
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Token": "xsts-token",
                "DisplayClaims": { "xui": [{ "uhs": "user-hash" }] },
            })))
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/authentication/login_with_xbox"))
            .and(body_string_contains("XBL3.0 x=user-hash;xsts-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "mc-access-token",
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/minecraft/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "11111111222233334444555555555555",
                "name": "TestPlayer",
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn full_chain_builds_and_persists_session() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .and(body_string_contains("code=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ms-access-token",
                "refresh_token": "ms-refresh-token",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_downstream_stages(&server).await;

        let auth = authenticator(&server, dir.path());
        let session = auth.complete_auth_flow("abc123").await.unwrap();

        assert_eq!(session.kind, AccountKind::Microsoft);
        assert_eq!(session.username, "TestPlayer");
        assert_eq!(session.access_token.as_deref(), Some("mc-access-token"));
        assert_eq!(session.refresh_token.as_deref(), Some("ms-refresh-token"));
        assert_eq!(
            session.uuid.as_deref(),
            Some("11111111222233334444555555555555")
        );
        assert!(!session.client_token.is_empty());
        assert!(session.expires_at.unwrap() > Utc::now().timestamp_millis());

        // Persisted exactly once, with the same content.
        let stored = TokenStore::new(dir.path()).load().unwrap();
        assert_eq!(stored.username, "TestPlayer");
        assert_eq!(stored.access_token.as_deref(), Some("mc-access-token"));
    }

    #[tokio::test]
    async fn missing_entitlement_is_terminal_and_not_retried() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ms-access-token",
                "refresh_token": "ms-refresh-token",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/authenticate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "Token": "xbox-token" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Token": "xsts-token",
                "DisplayClaims": { "xui": [{ "uhs": "user-hash" }] },
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/authentication/login_with_xbox"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "mc-token" })),
            )
            .mount(&server)
            .await;
        // Profile without a name/id pair: no Java Edition license.
        Mock::given(method("GET"))
            .and(path("/minecraft/profile"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let auth = authenticator(&server, dir.path());
        let result = auth.complete_auth_flow("abc123").await;

        assert!(matches!(result, Err(LauncherError::NoGameLicense)));
        assert!(TokenStore::new(dir.path()).load().is_none());
    }

    #[tokio::test]
    async fn xsts_without_user_hash_fails_the_chain() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ms-access-token",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/authenticate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "Token": "xbox-token" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Token": "xsts-token",
                "DisplayClaims": { "xui": [] },
            })))
            .mount(&server)
            .await;

        let auth = authenticator(&server, dir.path());
        let result = auth.complete_auth_flow("abc123").await;

        match result {
            Err(LauncherError::Auth(message)) => {
                assert!(message.contains("XSTS"), "unexpected message: {message}")
            }
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_any_request() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());

        let session = AuthSession {
            kind: AccountKind::Microsoft,
            username: "TestPlayer".into(),
            uuid: Some("uuid".into()),
            access_token: Some("still-valid".into()),
            refresh_token: Some("refresh".into()),
            client_token: Uuid::new_v4().to_string(),
            expires_at: Some(Utc::now().timestamp_millis() + 10 * 60 * 1000),
        };
        store.save(&session).unwrap();

        let auth = authenticator(&server, dir.path());
        let token = auth.ensure_valid_token().await.unwrap();

        assert_eq!(token, "still-valid");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expiring_token_triggers_full_refresh_chain() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());

        let client_token = Uuid::new_v4().to_string();
        let session = AuthSession {
            kind: AccountKind::Microsoft,
            username: "TestPlayer".into(),
            uuid: Some("uuid".into()),
            access_token: Some("stale".into()),
            refresh_token: Some("old-refresh".into()),
            client_token: client_token.clone(),
            expires_at: Some(Utc::now().timestamp_millis() + 4 * 60 * 1000),
        };
        store.save(&session).unwrap();

        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-ms-token",
                "refresh_token": "new-refresh",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_downstream_stages(&server).await;

        let auth = authenticator(&server, dir.path());
        let token = auth.ensure_valid_token().await.unwrap();
        assert_eq!(token, "mc-access-token");

        let stored = store.load().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("mc-access-token"));
        assert_eq!(stored.refresh_token.as_deref(), Some("new-refresh"));
        // The client token is stable across refreshes.
        assert_eq!(stored.client_token, client_token);
        assert!(stored.expires_at.unwrap() > Utc::now().timestamp_millis() + 30 * 60 * 1000);
    }

    #[tokio::test]
    async fn failed_refresh_clears_the_stored_session() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());

        let session = AuthSession {
            kind: AccountKind::Microsoft,
            username: "TestPlayer".into(),
            uuid: Some("uuid".into()),
            access_token: Some("stale".into()),
            refresh_token: Some("revoked".into()),
            client_token: Uuid::new_v4().to_string(),
            expires_at: Some(Utc::now().timestamp_millis() - 1000),
        };
        store.save(&session).unwrap();

        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
            })))
            .mount(&server)
            .await;

        let auth = authenticator(&server, dir.path());
        assert!(auth.ensure_valid_token().await.is_err());
        assert!(store.load().is_none());
    }

    // ── Interactive flow ────────────────────────────────

    /// Scripted consent browser: replays a fixed sequence of events.
    struct ScriptedBrowser {
        events: Vec<BrowserEvent>,
        keep_open: bool,
    }

    #[async_trait]
    impl ConsentBrowser for ScriptedBrowser {
        async fn open(&self, _url: &str) -> LauncherResult<mpsc::Receiver<BrowserEvent>> {
            let (tx, rx) = mpsc::channel(8);
            let events = self.events.clone();
            let keep_open = self.keep_open;
            tokio::spawn(async move {
                for event in events {
                    let _ = tx.send(event).await;
                }
                if keep_open {
                    // Hold the sender so the channel stays open.
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    drop(tx);
                }
            });
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn consent_window_closure_resolves_with_closed_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(&server, dir.path());

        let browser = ScriptedBrowser {
            events: vec![
                BrowserEvent::Navigated("https://login.live.com/consent-step".into()),
                BrowserEvent::Closed,
            ],
            keep_open: false,
        };

        let result = auth.authenticate(&browser).await;
        assert!(matches!(result, Err(LauncherError::AuthWindowClosed)));
    }

    #[tokio::test]
    async fn explicit_error_param_resolves_with_auth_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(&server, dir.path());

        let browser = ScriptedBrowser {
            events: vec![BrowserEvent::Navigated(
                "https://login.live.com/oauth20_desktop.srf?error=access_denied&error_description=The+user+declined"
                    .into(),
            )],
            keep_open: false,
        };

        match auth.authenticate(&browser).await {
            Err(LauncherError::Auth(message)) => assert_eq!(message, "The user declined"),
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn consent_flow_times_out() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let auth =
            authenticator(&server, dir.path()).with_consent_timeout(Duration::from_millis(50));

        let browser = ScriptedBrowser {
            events: vec![],
            keep_open: true,
        };

        let result = auth.authenticate(&browser).await;
        assert!(matches!(result, Err(LauncherError::AuthTimeout)));
    }

    #[tokio::test]
    async fn concurrent_authentication_is_rejected() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let auth = std::sync::Arc::new(
            authenticator(&server, dir.path()).with_consent_timeout(Duration::from_millis(300)),
        );

        let first = {
            let auth = auth.clone();
            tokio::spawn(async move {
                let browser = ScriptedBrowser {
                    events: vec![],
                    keep_open: true,
                };
                auth.authenticate(&browser).await
            })
        };

        // Give the first call time to claim the in-flight guard.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let browser = ScriptedBrowser {
            events: vec![],
            keep_open: false,
        };
        let second = auth.authenticate(&browser).await;
        assert!(matches!(second, Err(LauncherError::AuthInProgress)));

        let first = first.await.unwrap();
        assert!(matches!(first, Err(LauncherError::AuthTimeout)));
    }

    #[test]
    fn redirect_outcome_extraction() {
        assert!(extract_redirect_outcome("https://login.live.com/step1").is_none());
        assert!(extract_redirect_outcome("not a url").is_none());

        match extract_redirect_outcome(
            "https://login.live.com/oauth20_desktop.srf?code=abc123&state=x",
        ) {
            Some(Ok(code)) => assert_eq!(code, "abc123"),
            other => panic!("expected code, got {other:?}"),
        }

        assert!(matches!(
            extract_redirect_outcome("https://login.live.com/oauth20_desktop.srf?error=denied"),
            Some(Err(LauncherError::Auth(_)))
        ));
    }

    #[test]
    fn authorize_url_carries_scope_and_client_id() {
        let dir = tempfile::tempdir().unwrap();
        let client = crate::core::http::build_http_client().unwrap();
        let auth = MicrosoftAuthenticator::new(
            client,
            AuthEndpoints::default(),
            TokenStore::new(dir.path()),
        );

        let url = auth.authorize_url().unwrap();
        assert!(url.starts_with("https://login.live.com/oauth20_authorize.srf?"));
        assert!(url.contains("scope=XboxLive.signin+offline_access"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("prompt=select_account"));
    }
}
