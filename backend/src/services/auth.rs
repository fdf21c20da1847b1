//! Authentication service for user registration, login, and token management

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::audit::{AuditEntry, AuditService};
use shared::models::{AuditAction, UserRole};
use shared::validation::{validate_password_pair, validate_username};

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// Input for registering a staff account
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub role: Option<UserRole>,
}

/// Input for updating the current user's profile
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileInput {
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub new_password_confirm: Option<String>,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub username: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Public view of a user
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// User info from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    #[sqlx(try_from = "String")]
    role: UserRole,
    is_active: bool,
}

const PROFILE_COLUMNS: &str =
    "id, username, email, role, is_active, last_login_at, created_at";

/// Decode and validate an access token
pub fn decode_access_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized {
        message: format!("Invalid token: {}", e),
        message_fr: "Jeton invalide".to_string(),
    })
}

/// SHA-256 digest of a refresh token, as stored in the database
pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Register a staff account and sign it in
    pub async fn register(&self, input: RegisterInput) -> AppResult<AuthTokens> {
        input.validate()?;
        validate_username(&input.username).map_err(AppError::invalid_field("username"))?;
        validate_password_pair(&input.password, &input.password_confirm)
            .map_err(AppError::invalid_field("password"))?;

        self.ensure_unique(&input.username, &input.email, None).await?;

        let password_hash = hash(&input.password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;
        let role = input.role.unwrap_or_default();

        // Only the very first account may register itself as administrator
        if role == UserRole::Admin {
            let has_users = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users)")
                .fetch_one(&self.db)
                .await?;
            if has_users {
                return Err(AppError::InsufficientPermissions);
            }
        }

        let mut tx = self.db.begin().await?;

        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (username, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&input.username)
        .bind(&input.email)
        .bind(&password_hash)
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(user_id, AuditAction::Create, "User", user_id, &input.username)
                .with_details(json!({ "role": role.as_str() })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(username = %input.username, role = role.as_str(), "User registered");

        let tokens = self.generate_tokens(user_id, &input.username, role)?;
        self.store_refresh_token(&self.db, user_id, &tokens.refresh_token)
            .await?;
        Ok(tokens)
    }

    /// Authenticate user with username and password
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ip_address: Option<String>,
    ) -> AppResult<AuthTokens> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, password_hash, role, is_active
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        let valid = verify(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            tracing::warn!(username, "Failed login attempt");
            return Err(AppError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AppError::AccountDisabled);
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(
                user.id,
                AuditAction::View,
                "Auth",
                user.id,
                format!("Login: {}", user.username),
            )
            .with_ip(ip_address),
        )
        .await?;

        let tokens = self.generate_tokens(user.id, &user.username, user.role)?;
        self.store_refresh_token(&self.db, user.id, &tokens.refresh_token)
            .await?;

        tracing::info!(username = %user.username, "User logged in");
        Ok(tokens)
    }

    /// Refresh access token using refresh token
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = hash_token(refresh_token);

        let mut tx = self.db.begin().await?;

        let (user_id, username, role) = sqlx::query_as::<_, (Uuid, String, String)>(
            r#"
            UPDATE refresh_tokens rt
            SET revoked_at = NOW()
            FROM users u
            WHERE u.id = rt.user_id
              AND rt.token_hash = $1
              AND rt.expires_at > NOW()
              AND rt.revoked_at IS NULL
              AND u.is_active = true
            RETURNING u.id, u.username, u.role
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Invalid or expired refresh token".to_string(),
            message_fr: "Jeton de rafraîchissement invalide ou expiré".to_string(),
        })?;

        let role: UserRole = role.parse()?;
        let tokens = self.generate_tokens(user_id, &username, role)?;
        self.store_refresh_token(&mut *tx, user_id, &tokens.refresh_token)
            .await?;

        // Revocation and the replacement token land together
        tx.commit().await?;

        Ok(tokens)
    }

    /// Revoke a refresh token and record the logout
    pub async fn logout(
        &self,
        user_id: Uuid,
        username: &str,
        refresh_token: &str,
        ip_address: Option<String>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE token_hash = $1 AND user_id = $2 AND revoked_at IS NULL",
        )
        .bind(hash_token(refresh_token))
        .bind(user_id)
        .execute(&self.db)
        .await?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(
                user_id,
                AuditAction::View,
                "Auth",
                user_id,
                format!("Logout: {}", username),
            )
            .with_ip(ip_address),
        )
        .await?;

        tracing::info!(username, "User logged out");
        Ok(())
    }

    /// Get the profile of a user
    pub async fn get_profile(&self, user_id: Uuid) -> AppResult<UserProfile> {
        sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    /// Update the current user's username, email or password
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        input: UpdateProfileInput,
    ) -> AppResult<UserProfile> {
        input.validate()?;
        if let Some(username) = &input.username {
            validate_username(username).map_err(AppError::invalid_field("username"))?;
        }

        let current = self.get_profile(user_id).await?;
        let username = input.username.clone().unwrap_or(current.username);
        let email = input.email.clone().unwrap_or(current.email);
        self.ensure_unique(&username, &email, Some(user_id)).await?;

        let new_hash = match &input.new_password {
            Some(new_password) => {
                let current_password = input.current_password.as_deref().ok_or_else(|| {
                    AppError::validation(
                        "current_password",
                        "Current password is required to set a new one",
                        "Le mot de passe actuel est requis",
                    )
                })?;
                let stored = sqlx::query_scalar::<_, String>(
                    "SELECT password_hash FROM users WHERE id = $1",
                )
                .bind(user_id)
                .fetch_one(&self.db)
                .await?;
                let valid = verify(current_password, &stored).map_err(|e| {
                    AppError::Internal(format!("Password verification failed: {}", e))
                })?;
                if !valid {
                    return Err(AppError::validation(
                        "current_password",
                        "Current password is incorrect",
                        "Le mot de passe actuel est incorrect",
                    ));
                }
                validate_password_pair(
                    new_password,
                    input.new_password_confirm.as_deref().unwrap_or_default(),
                )
                .map_err(AppError::invalid_field("new_password"))?;
                Some(hash(new_password, DEFAULT_COST).map_err(|e| {
                    AppError::Internal(format!("Password hashing failed: {}", e))
                })?)
            }
            None => None,
        };

        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            UPDATE users
            SET username = $2,
                email = $3,
                password_hash = COALESCE($4, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .bind(&username)
        .bind(&email)
        .bind(new_hash)
        .fetch_one(&self.db)
        .await?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Update, "User", user_id, &profile.username)
                .with_details(json!({ "password_changed": input.new_password.is_some() })),
        )
        .await?;

        Ok(profile)
    }

    /// List all accounts (administration)
    pub async fn list_users(&self) -> AppResult<Vec<UserProfile>> {
        let users = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM users ORDER BY username",
            PROFILE_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    /// Activate, deactivate or change the role of an account (administration)
    pub async fn update_user(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        is_active: Option<bool>,
        role: Option<UserRole>,
    ) -> AppResult<UserProfile> {
        if admin_id == user_id && (is_active == Some(false) || role.is_some_and(|r| r != UserRole::Admin)) {
            return Err(AppError::validation(
                "user_id",
                "Administrators cannot disable or demote themselves",
                "Un administrateur ne peut pas se désactiver ni se rétrograder",
            ));
        }

        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            UPDATE users
            SET is_active = COALESCE($2, is_active),
                role = COALESCE($3, role),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .bind(is_active)
        .bind(role.map(|r| r.as_str()))
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        if is_active == Some(false) {
            sqlx::query(
                "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
            )
            .bind(user_id)
            .execute(&self.db)
            .await?;
        }

        AuditService::record(
            &self.db,
            &AuditEntry::new(admin_id, AuditAction::Update, "User", user_id, &profile.username)
                .with_details(json!({
                    "is_active": is_active,
                    "role": role.map(|r| r.as_str()),
                })),
        )
        .await?;

        Ok(profile)
    }

    async fn ensure_unique(
        &self,
        username: &str,
        email: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<()> {
        let (username_taken, email_taken) = sqlx::query_as::<_, (bool, bool)>(
            r#"
            SELECT
                EXISTS(SELECT 1 FROM users WHERE username = $1 AND ($3::uuid IS NULL OR id <> $3)),
                EXISTS(SELECT 1 FROM users WHERE email = $2 AND ($3::uuid IS NULL OR id <> $3))
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(exclude)
        .fetch_one(&self.db)
        .await?;

        if username_taken {
            return Err(AppError::Conflict {
                resource: "username".to_string(),
                message: "This username is already taken".to_string(),
                message_fr: "Ce nom d'utilisateur existe déjà".to_string(),
            });
        }
        if email_taken {
            return Err(AppError::Conflict {
                resource: "email".to_string(),
                message: "This email is already in use".to_string(),
                message_fr: "Cet email est déjà utilisé".to_string(),
            });
        }
        Ok(())
    }

    /// Generate access and refresh tokens
    fn generate_tokens(&self, user_id: Uuid, username: &str, role: UserRole) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let access_claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role: role.as_str().to_string(),
            permissions: role.permission_keys(),
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        // Refresh token (simple random token)
        let refresh_token = Uuid::new_v4().to_string();

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    /// Store refresh token in database
    async fn store_refresh_token<'e, E>(&self, executor: E, user_id: Uuid, token: &str) -> AppResult<()>
    where
        E: PgExecutor<'e>,
    {
        let (token_hash, expires_at) = refresh_record(token, self.refresh_token_expiry, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(executor)
        .await?;

        Ok(())
    }
}

/// Stored form of a refresh token: its hash and expiry
fn refresh_record(token: &str, expiry_secs: i64, now: DateTime<Utc>) -> (String, DateTime<Utc>) {
    (hash_token(token), now + Duration::seconds(expiry_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_stable_and_fits_column() {
        let a = hash_token("5f0c9d1e-7c1b-4a55-9a5e-3f1d2c4b6a70");
        let b = hash_token("5f0c9d1e-7c1b-4a55-9a5e-3f1d2c4b6a70");
        assert_eq!(a, b);
        assert_eq!(a.len(), 43);
        assert_ne!(a, hash_token("another-token"));
    }

    #[test]
    fn rotated_token_is_stored_by_hash_with_fresh_expiry() {
        let now = Utc::now();
        let (stored, expires_at) = refresh_record("new-refresh-token", 604_800, now);

        assert_eq!(stored, hash_token("new-refresh-token"));
        assert_ne!(stored, hash_token("old-refresh-token"));
        assert_eq!(expires_at - now, Duration::days(7));
    }

    #[test]
    fn access_token_round_trip() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            username: "k.benali".to_string(),
            role: UserRole::Manager.as_str().to_string(),
            permissions: UserRole::Manager.permission_keys(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let decoded = decode_access_token(&token, "secret").unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.role, "manager");
        assert!(decode_access_token(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            username: "k.benali".to_string(),
            role: "admin".to_string(),
            permissions: vec![],
            exp: (Utc::now() - Duration::hours(2)).timestamp(),
            iat: (Utc::now() - Duration::hours(3)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(decode_access_token(&token, "secret").is_err());
    }
}
