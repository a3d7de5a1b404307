//! Declarative request authentication.
//!
//! Each operation states what it needs with an [`AuthDeclaration`]; [`bind`]
//! resolves those needs from the request in a fixed order and stops at the
//! first failure:
//!
//! 1. caller identity (`X-App-Token`, optionally anonymous)
//! 2. admin identity (`X-Admin-Token` via the admin authority, or the
//!    standard token path)
//! 3. author identity (`X-Author-Token`, decoded without authorizing)
//! 4. path resource id
//! 5. JSON body (decoded by the dispatcher right after binding)
//! 6. client metadata

use axum::http::request::Parts;
use std::collections::HashMap;
use std::sync::Arc;

use super::headers::{header_str, ClientMeta, ADMIN_TOKEN, APP_TOKEN, AUTHOR_TOKEN};
use crate::error::AuthError;
use crate::subject::{Role, SubjectId};
use crate::tokens::Claims;
use crate::traits::AdminGrant;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallerRule {
    AllowAnonymous,
    Required,
}

/// What an operation needs bound before it runs.
#[derive(Debug, Clone, Default)]
pub struct AuthDeclaration {
    /// `Some(group)` when admin identity is required.
    admin: Option<Option<String>>,
    author: bool,
    caller: Option<CallerRule>,
    client_meta: bool,
    raw_request: bool,
    resource_id: bool,
}

impl AuthDeclaration {
    /// No identity at all.
    pub fn public() -> Self {
        Self::default()
    }

    pub fn caller() -> Self {
        Self {
            caller: Some(CallerRule::Required),
            ..Self::default()
        }
    }

    pub fn admin() -> Self {
        Self {
            admin: Some(None),
            ..Self::default()
        }
    }

    /// Accept requests without a valid caller token as the anonymous subject.
    pub fn allow_anonymous(mut self) -> Self {
        self.caller = Some(CallerRule::AllowAnonymous);
        self
    }

    pub fn permission_group(mut self, group: impl Into<String>) -> Self {
        self.admin = Some(Some(group.into()));
        self
    }

    pub fn author(mut self) -> Self {
        self.author = true;
        self
    }

    pub fn resource_id(mut self) -> Self {
        self.resource_id = true;
        self
    }

    pub fn raw_request(mut self) -> Self {
        self.raw_request = true;
        self
    }

    pub fn client_meta(mut self) -> Self {
        self.client_meta = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    /// `None` for the anonymous subject.
    pub role: Option<Role>,
    pub subject: SubjectId,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            role: None,
            subject: SubjectId::ANONYMOUS,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.role.is_none()
    }

    /// The subject, unless anonymous.
    pub fn known(&self) -> Option<SubjectId> {
        (!self.is_anonymous()).then_some(self.subject)
    }
}

/// Everything [`bind`] resolved for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestAuth {
    pub admin: Option<AdminGrant>,
    pub author: Option<Claims>,
    pub caller: Option<Caller>,
    pub client: Option<ClientMeta>,
    /// Path parameters matched by the router.
    pub path: HashMap<String, String>,
    pub raw: Option<Parts>,
    pub resource_id: Option<i64>,
}

fn undeclared(what: &str) -> AuthError {
    AuthError::internal(format!("operation uses undeclared {what}"))
}

impl RequestAuth {
    pub fn caller(&self) -> Result<Caller, AuthError> {
        self.caller.ok_or_else(|| undeclared("caller identity"))
    }

    pub fn admin(&self) -> Result<&AdminGrant, AuthError> {
        self.admin.as_ref().ok_or_else(|| undeclared("admin identity"))
    }

    pub fn resource_id(&self) -> Result<i64, AuthError> {
        self.resource_id.ok_or_else(|| undeclared("resource id"))
    }

    pub fn path_param(&self, name: &str) -> Result<&str, AuthError> {
        self.path
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AuthError::not_found(format!("missing path parameter {name}")))
    }

    pub fn raw(&self) -> Result<&Parts, AuthError> {
        self.raw.as_ref().ok_or_else(|| undeclared("raw request"))
    }
}

/// Resolve `declaration` against the request head and path parameters.
pub async fn bind(
    state: &AppState,
    declaration: &AuthDeclaration,
    parts: &Parts,
    params: &HashMap<String, String>,
) -> Result<RequestAuth, AuthError> {
    let mut auth = RequestAuth {
        path: params.clone(),
        ..RequestAuth::default()
    };

    // Caller and admin identity are exclusive; a declared caller wins.
    if let Some(rule) = declaration.caller {
        auth.caller = Some(bind_caller(state, parts, rule).await?);
    } else if let Some(group) = &declaration.admin {
        auth.admin = Some(bind_admin(state, parts, group.as_deref()).await?);
    }

    if declaration.author {
        auth.author = Some(bind_author(state, parts)?);
    }

    if declaration.resource_id {
        let id = params
            .get("id")
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|id| *id != 0)
            .ok_or_else(|| AuthError::not_found("resource not found"))?;
        auth.resource_id = Some(id);
    }

    if declaration.raw_request {
        auth.raw = Some(parts.clone());
    }

    if declaration.client_meta {
        auth.client = Some(ClientMeta::from_headers(&parts.headers));
    }

    Ok(auth)
}

async fn bind_caller(state: &AppState, parts: &Parts, rule: CallerRule) -> Result<Caller, AuthError> {
    let claims = match header_str(&parts.headers, APP_TOKEN) {
        Some(token) => state.sessions.validate(token).await,
        None => None,
    };

    let Some(claims) = claims else {
        return match rule {
            CallerRule::AllowAnonymous => Ok(Caller::anonymous()),
            CallerRule::Required => Err(AuthError::unauthorized("valid app token required")),
        };
    };

    let users = Arc::clone(state.orchestrator.users());
    let subject = claims.subject;
    tokio::spawn(async move {
        if let Err(e) = users.update_last_active(subject).await {
            tracing::warn!(subject_id = %subject, error = %e, "Failed to record last activity");
        }
    });

    Ok(Caller {
        role: Some(claims.role),
        subject,
    })
}

async fn bind_admin(
    state: &AppState,
    parts: &Parts,
    group: Option<&str>,
) -> Result<AdminGrant, AuthError> {
    let admin_token = header_str(&parts.headers, ADMIN_TOKEN);

    let grant = match (&state.admin_authority, admin_token) {
        (Some(authority), Some(_)) => {
            let grant = authority.authorize(parts, group).await?;
            if grant.permissions.is_empty() {
                return Err(AuthError::unauthorized("no admin permissions"));
            }
            grant
        }
        _ => {
            let token = admin_token
                .or_else(|| header_str(&parts.headers, APP_TOKEN))
                .ok_or_else(|| AuthError::unauthorized("admin token required"))?;
            let claims = state
                .sessions
                .validate(token)
                .await
                .ok_or_else(|| AuthError::unauthorized("invalid admin token"))?;
            AdminGrant {
                permissions: vec![state.config.admin.default_permission.clone()],
                role: claims.role,
                subject: claims.subject,
            }
        }
    };

    if grant.role != Role::WebAdmin {
        tracing::debug!(subject_id = %grant.subject, role = %grant.role, "Admin access refused");
        return Err(AuthError::unauthorized("admin role required"));
    }
    Ok(grant)
}

fn bind_author(state: &AppState, parts: &Parts) -> Result<Claims, AuthError> {
    let token = header_str(&parts.headers, AUTHOR_TOKEN)
        .ok_or_else(|| AuthError::unauthorized("author token required"))?;
    let claims = state
        .sessions
        .codec()
        .parse(token)
        .map_err(|_| AuthError::unauthorized("invalid author token"))?;
    if claims.is_expired() {
        return Err(AuthError::unauthorized("author token expired"));
    }
    Ok(claims)
}
