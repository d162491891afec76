use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::models::{Identity, Role};
use crate::utils::auth::{Claims, create_jwt, validate_jwt};
use crate::utils::clock::Clock;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const CODE_SENT: &str = "Check your email for the login link.";

/// Delivers one-time sign-in codes.
#[async_trait]
pub trait CodeMailer: Send + Sync {
    async fn send_code(&self, email: &str, code: &str) -> Result<()>;
}

/// Writes codes to the log; stands in for a mail relay in development.
pub struct LogMailer;

#[async_trait]
impl CodeMailer for LogMailer {
    async fn send_code(&self, email: &str, code: &str) -> Result<()> {
        info!(target: "mailer", "✉️  Sign-in code for {}: {}", email, code);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: CurrentUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

/// Wrong-code tracking per email address.
#[derive(Clone, Debug)]
pub struct FailedAttempts {
    pub count: u32,
    pub last_attempt: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_code(email: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b":");
    hasher.update(code.trim().as_bytes());
    hex::encode(hasher.finalize())
}

pub struct AuthService {
    db: DatabaseConnection,
    mailer: Arc<dyn CodeMailer>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
    failures: DashMap<String, FailedAttempts>,
}

impl AuthService {
    pub fn new(
        db: DatabaseConnection,
        mailer: Arc<dyn CodeMailer>,
        clock: Arc<dyn Clock>,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            mailer,
            clock,
            config,
            failures: DashMap::new(),
        }
    }

    fn check_lockout(&self, email: &str) -> Result<(), AppError> {
        if let Some(entry) = self.failures.get(email)
            && let Some(locked_until) = entry.locked_until
        {
            let now = self.clock.now();
            if now < locked_until {
                let remaining = (locked_until - now).num_seconds().max(1);
                return Err(AppError::TooManyRequests(format!(
                    "Too many failed attempts. Please wait {} seconds before trying again.",
                    remaining
                )));
            }
        }
        Ok(())
    }

    /// Counts a wrong code. Reaching the limit locks the email and burns its
    /// outstanding codes, so guessing must start over with a fresh code.
    async fn record_failed_attempt(&self, email: &str) -> Result<(), AppError> {
        let now = self.clock.now();
        let window = Duration::minutes(self.config.login_lockout_minutes);
        let locked = {
            let mut entry = self
                .failures
                .entry(email.to_string())
                .or_insert(FailedAttempts {
                    count: 0,
                    last_attempt: now,
                    locked_until: None,
                });

            if now - entry.last_attempt > window {
                entry.count = 0;
                entry.locked_until = None;
            }
            entry.count += 1;
            entry.last_attempt = now;

            if entry.count >= self.config.login_max_failed_attempts {
                entry.locked_until = Some(now + window);
                warn!(
                    "Sign in locked for {} after {} failed attempts",
                    email, entry.count
                );
                true
            } else {
                false
            }
        };

        if locked {
            self.invalidate_codes(email).await?;
        }
        Ok(())
    }

    fn clear_failures(&self, email: &str) {
        self.failures.remove(email);
    }

    async fn invalidate_codes(&self, email: &str) -> Result<(), AppError> {
        LoginCodes::update_many()
            .col_expr(login_codes::Column::ConsumedAt, Expr::value(self.clock.now()))
            .filter(login_codes::Column::Email.eq(email))
            .filter(login_codes::Column::ConsumedAt.is_null())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Issues a fresh code and retires any older ones for the same address.
    pub async fn request_code(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let now = self.clock.now();

        self.invalidate_codes(&email).await?;
        login_codes::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            email: Set(email.clone()),
            code_hash: Set(hash_code(&email, &code)),
            expires_at: Set(now + Duration::minutes(self.config.login_code_ttl_minutes)),
            consumed_at: Set(None),
            created_at: Set(Some(now)),
        }
        .insert(&self.db)
        .await?;

        self.mailer
            .send_code(&email, &code)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to send sign-in code: {}", e)))?;

        Ok(())
    }

    /// Exchanges a live code for a session, creating the profile on first sign in.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<SessionToken, AppError> {
        let email = normalize_email(email);
        self.check_lockout(&email)?;
        let now = self.clock.now();
        let expected = hash_code(&email, code);

        let candidate = LoginCodes::find()
            .filter(login_codes::Column::Email.eq(&email))
            .filter(login_codes::Column::ConsumedAt.is_null())
            .filter(login_codes::Column::ExpiresAt.gt(now))
            .order_by_desc(login_codes::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .find(|c| c.code_hash == expected);
        let Some(candidate) = candidate else {
            self.record_failed_attempt(&email).await?;
            return Err(AppError::Unauthorized("Invalid or expired code".to_string()));
        };
        self.clear_failures(&email);

        let mut consumed: login_codes::ActiveModel = candidate.into();
        consumed.consumed_at = Set(Some(now));
        consumed.update(&self.db).await?;

        let profile = match Profiles::find()
            .filter(profiles::Column::Email.eq(&email))
            .one(&self.db)
            .await?
        {
            Some(profile) => profile,
            None => {
                let role = if self.config.is_admin_email(&email) {
                    Role::Admin
                } else {
                    Role::Student
                };
                info!("👤 New profile for {} ({})", email, role);
                profiles::ActiveModel {
                    id: Set(Uuid::new_v4().to_string()),
                    email: Set(email.clone()),
                    role: Set(role.as_str().to_string()),
                    created_at: Set(Some(now)),
                }
                .insert(&self.db)
                .await?
            }
        };

        let session_id = Uuid::new_v4().to_string();
        let expires_at = now + Duration::hours(self.config.session_ttl_hours);
        sessions::ActiveModel {
            id: Set(session_id.clone()),
            user_id: Set(profile.id.clone()),
            expires_at: Set(expires_at),
            created_at: Set(Some(now)),
        }
        .insert(&self.db)
        .await?;

        let token = create_jwt(
            &profile.id,
            &profile.email,
            &session_id,
            expires_at,
            &self.config.jwt_secret,
        )
        .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(SessionToken {
            token,
            expires_at,
            user: CurrentUser {
                id: profile.id,
                email: profile.email,
                role: profile.role.parse().unwrap_or(Role::Student),
            },
        })
    }

    /// Valid signature and a live session row are both required.
    pub async fn authenticate(&self, token: &str) -> Result<Claims, AppError> {
        let claims = validate_jwt(token, &self.config.jwt_secret)
            .map_err(|_| AppError::Unauthorized("Invalid session".to_string()))?;

        let live = Sessions::find_by_id(claims.jti.as_str())
            .filter(sessions::Column::UserId.eq(claims.sub.as_str()))
            .filter(sessions::Column::ExpiresAt.gt(self.clock.now()))
            .one(&self.db)
            .await?
            .is_some();

        if live {
            Ok(claims)
        } else {
            Err(AppError::Unauthorized("Session expired".to_string()))
        }
    }

    pub async fn current_user(&self, identity: &Identity) -> Result<CurrentUser, AppError> {
        let profile = Profiles::find_by_id(identity.id.as_str())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

        Ok(CurrentUser {
            id: profile.id,
            email: profile.email,
            role: profile.role.parse().unwrap_or(Role::Student),
        })
    }

    pub async fn role_of(&self, user_id: &str) -> Result<Option<Role>, AppError> {
        Ok(Profiles::find_by_id(user_id)
            .one(&self.db)
            .await?
            .and_then(|p| p.role.parse().ok()))
    }

    pub async fn sign_out(&self, claims: &Claims) -> Result<(), AppError> {
        Sessions::delete_by_id(claims.jti.as_str())
            .exec(&self.db)
            .await?;
        Ok(())
    }
}
