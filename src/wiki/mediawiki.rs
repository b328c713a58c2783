//! MediaWiki `api.php` backend.
//!
//! Speaks the JSON API with `formatversion=2`. Reads are GET requests,
//! login and edits are form POSTs sharing one cookie-backed session.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::traits::*;

type Params = Vec<(&'static str, String)>;

/// Backend for a live MediaWiki installation.
pub struct MediaWikiBackend {
    client: Client,
    api_url: String,
    csrf_token: Mutex<Option<String>>,
}

impl MediaWikiBackend {
    /// Create a backend for the given `api.php` endpoint.
    pub fn new(
        api_url: impl Into<String>,
        user_agent: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, WikiError> {
        let mut builder = Client::builder().user_agent(user_agent).cookie_store(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| WikiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            csrf_token: Mutex::new(None),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Log in with a bot password. The session cookie is kept by the client.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), WikiError> {
        let tokens: QueryResponse<TokensQuery> = decode(
            self.call(
                Method::GET,
                vec![
                    ("action", "query".into()),
                    ("meta", "tokens".into()),
                    ("type", "login".into()),
                ],
            )
            .await?,
        )?;
        let login_token = tokens
            .query
            .tokens
            .logintoken
            .ok_or_else(|| WikiError::InvalidResponse("No login token in response".to_string()))?;

        let response: LoginResponse = decode(
            self.call(
                Method::POST,
                vec![
                    ("action", "login".into()),
                    ("lgname", username.to_string()),
                    ("lgpassword", password.to_string()),
                    ("lgtoken", login_token),
                ],
            )
            .await?,
        )?;

        if response.login.result != "Success" {
            let reason = response.login.reason.unwrap_or(response.login.result);
            return Err(WikiError::Auth(reason));
        }

        // A new session invalidates any token fetched before it.
        *self.csrf_token.lock().await = None;
        info!(user = %username, "Logged in to {}", self.api_url);
        Ok(())
    }

    async fn csrf_token(&self) -> Result<String, WikiError> {
        let mut cached = self.csrf_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let tokens: QueryResponse<TokensQuery> = decode(
            self.call(
                Method::GET,
                vec![
                    ("action", "query".into()),
                    ("meta", "tokens".into()),
                    ("type", "csrf".into()),
                ],
            )
            .await?,
        )?;
        let token = tokens
            .query
            .tokens
            .csrftoken
            .ok_or_else(|| WikiError::InvalidResponse("No csrf token in response".to_string()))?;

        *cached = Some(token.clone());
        Ok(token)
    }

    /// Issue one API request and unwrap the error envelope.
    async fn call(&self, method: Method, mut params: Params) -> Result<Value, WikiError> {
        params.push(("format", "json".into()));
        params.push(("formatversion", "2".into()));

        let request = if method == Method::POST {
            self.client.post(&self.api_url).form(&params)
        } else {
            self.client.get(&self.api_url).query(&params)
        };

        let response = request
            .send()
            .await
            .map_err(|e| WikiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WikiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| WikiError::InvalidResponse(e.to_string()))?;

        if let Some(error) = value.get("error") {
            let code = error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(WikiError::Api { code, info });
        }

        Ok(value)
    }

    async fn query_first_page(&self, params: Params) -> Result<PageEntry, WikiError> {
        let response: QueryResponse<PagesQuery> = decode(self.call(Method::GET, params).await?)?;
        response
            .query
            .pages
            .into_iter()
            .next()
            .ok_or_else(|| WikiError::InvalidResponse("No pages in response".to_string()))
    }
}

#[async_trait]
impl WikiBackend for MediaWikiBackend {
    async fn fetch_page(&self, title: &str) -> Result<Page, WikiError> {
        let entry = self
            .query_first_page(vec![
                ("action", "query".into()),
                ("prop", "revisions".into()),
                ("rvprop", "ids|content".into()),
                ("rvslots", "main".into()),
                ("titles", title.to_string()),
            ])
            .await?;

        if entry.missing || entry.invalid {
            return Ok(Page::missing(entry.title));
        }

        let revision = entry
            .revisions
            .into_iter()
            .next()
            .ok_or_else(|| WikiError::InvalidResponse(format!("No revision for {}", title)))?;

        debug!(title = %entry.title, revision = revision.revid, "Fetched page");
        Ok(Page {
            title: entry.title,
            text: revision.slots.main.content,
            revision: Some(revision.revid),
            exists: true,
        })
    }

    async fn save_page(&self, edit: &PageEdit) -> Result<Option<u64>, WikiError> {
        let mut token_refreshed = false;

        loop {
            let token = self.csrf_token().await?;
            let mut params: Params = vec![
                ("action", "edit".into()),
                ("title", edit.title.clone()),
                ("text", edit.text.clone()),
                ("summary", edit.summary.clone()),
                ("nocreate", "1".into()),
                ("bot", "1".into()),
            ];
            if edit.minor {
                params.push(("minor", "1".into()));
            } else {
                params.push(("notminor", "1".into()));
            }
            if let Some(revision) = edit.base_revision {
                params.push(("baserevid", revision.to_string()));
            }
            // The token goes last so truncated posts are rejected.
            params.push(("token", token));

            match self.call(Method::POST, params).await {
                Err(WikiError::Api { code, .. }) if code == "badtoken" && !token_refreshed => {
                    warn!(title = %edit.title, "CSRF token rejected, refreshing");
                    *self.csrf_token.lock().await = None;
                    token_refreshed = true;
                }
                Err(WikiError::Api { code, .. }) if code == "editconflict" => {
                    return Err(WikiError::Conflict(edit.title.clone()));
                }
                Err(e) => return Err(e),
                Ok(value) => {
                    let response: EditResponse = decode(value)?;
                    if response.edit.result != "Success" {
                        return Err(WikiError::Api {
                            code: "edit".to_string(),
                            info: response.edit.result,
                        });
                    }
                    if response.edit.nochange {
                        return Ok(None);
                    }
                    return Ok(response.edit.newrevid);
                }
            }
        }
    }

    async fn user_info(&self, name: &str) -> Result<UserInfo, WikiError> {
        if is_anonymous_subject(name) {
            let blocks = self.list_blocks(name).await?;
            let block = blocks.into_iter().next().map(|b| BlockInfo {
                blocked_by: b.by,
                expiry: b.expiry,
                partial: b.partial,
                own_talk: !b.allowusertalk,
                email: b.noemail,
                no_create: b.nocreate,
                anon_only: b.anononly,
            });
            return Ok(UserInfo {
                name: name.to_string(),
                anonymous: true,
                block,
            });
        }

        let response: QueryResponse<UsersQuery> = decode(
            self.call(
                Method::GET,
                vec![
                    ("action", "query".into()),
                    ("list", "users".into()),
                    ("ususers", name.to_string()),
                    ("usprop", "blockinfo".into()),
                ],
            )
            .await?,
        )?;

        let user = response
            .query
            .users
            .into_iter()
            .next()
            .ok_or_else(|| WikiError::InvalidResponse(format!("No user entry for {}", name)))?;

        let block = match user.blockedby {
            Some(blocked_by) if !user.missing => Some(BlockInfo {
                blocked_by,
                expiry: user.blockexpiry.unwrap_or_default(),
                partial: user.blockpartial,
                own_talk: user.blockowntalk,
                email: user.blockemail,
                no_create: user.blocknocreate,
                anon_only: user.blockanononly,
            }),
            _ => None,
        };

        Ok(UserInfo {
            name: user.name,
            anonymous: false,
            block,
        })
    }

    async fn list_blocks(&self, name: &str) -> Result<Vec<BlockRecord>, WikiError> {
        let selector = if is_anonymous_subject(name) { "bkip" } else { "bkusers" };
        let response: QueryResponse<BlocksQuery> = decode(
            self.call(
                Method::GET,
                vec![
                    ("action", "query".into()),
                    ("list", "blocks".into()),
                    (selector, name.to_string()),
                    ("bkprop", "id|user|by|expiry|flags".into()),
                    ("bklimit", "max".into()),
                ],
            )
            .await?,
        )?;
        Ok(response.query.blocks)
    }

    async fn is_locked(&self, name: &str) -> Result<bool, WikiError> {
        let response: QueryResponse<GlobalUserQuery> = decode(
            self.call(
                Method::GET,
                vec![
                    ("action", "query".into()),
                    ("meta", "globaluserinfo".into()),
                    ("guiuser", name.to_string()),
                ],
            )
            .await?,
        )?;
        let info = response.query.globaluserinfo;
        Ok(!info.missing && info.locked)
    }

    async fn user_categories(&self, name: &str) -> Result<Vec<String>, WikiError> {
        let mut categories = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut params: Params = vec![
                ("action", "query".into()),
                ("prop", "categories".into()),
                ("titles", format!("User:{}", name)),
                ("cllimit", "max".into()),
            ];
            if let Some(token) = continuation.take() {
                params.push(("clcontinue", token));
            }

            let value = self.call(Method::GET, params).await?;
            let next = value
                .get("continue")
                .and_then(|c| c.get("clcontinue"))
                .and_then(Value::as_str)
                .map(str::to_string);

            let response: QueryResponse<PagesQuery> = decode(value)?;
            for page in response.query.pages {
                categories.extend(page.categories.into_iter().map(|c| c.title));
            }

            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(categories)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, WikiError> {
    serde_json::from_value(value).map_err(|e| WikiError::InvalidResponse(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    query: T,
}

#[derive(Debug, Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: Vec<PageEntry>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    revisions: Vec<RevisionEntry>,
    #[serde(default)]
    categories: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize)]
struct RevisionEntry {
    revid: u64,
    slots: Slots,
}

#[derive(Debug, Deserialize)]
struct Slots {
    main: SlotContent,
}

#[derive(Debug, Deserialize)]
struct SlotContent {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct CategoryEntry {
    title: String,
}

#[derive(Debug, Deserialize)]
struct UsersQuery {
    #[serde(default)]
    users: Vec<UserEntry>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    name: String,
    #[serde(default)]
    missing: bool,
    blockedby: Option<String>,
    blockexpiry: Option<String>,
    #[serde(default)]
    blockpartial: bool,
    #[serde(default)]
    blockowntalk: bool,
    #[serde(default)]
    blockemail: bool,
    #[serde(default)]
    blocknocreate: bool,
    #[serde(default)]
    blockanononly: bool,
}

#[derive(Debug, Deserialize)]
struct BlocksQuery {
    #[serde(default)]
    blocks: Vec<BlockRecord>,
}

#[derive(Debug, Deserialize)]
struct GlobalUserQuery {
    globaluserinfo: GlobalUserInfo,
}

#[derive(Debug, Deserialize)]
struct GlobalUserInfo {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    locked: bool,
}

#[derive(Debug, Deserialize)]
struct TokensQuery {
    tokens: Tokens,
}

#[derive(Debug, Deserialize)]
struct Tokens {
    csrftoken: Option<String>,
    logintoken: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    edit: EditResult,
}

#[derive(Debug, Deserialize)]
struct EditResult {
    result: String,
    newrevid: Option<u64>,
    #[serde(default)]
    nochange: bool,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    login: LoginResult,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    result: String,
    reason: Option<String>,
}
