//! Admin authentication service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::admin::{Admin, AdminClaims, AdminInfo, SignupRequest},
    repository::Repository,
};

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Create an admin account for an allow-listed e-mail
    pub async fn signup(&self, request: SignupRequest) -> AppResult<AdminInfo> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let email = request.email.trim().to_lowercase();
        if !signup_allowed(&self.config.admin_emails, &email) {
            tracing::warn!("Admin signup refused for {}", email);
            return Err(AppError::Authorization(
                "This e-mail is not allowed to create an admin account".to_string(),
            ));
        }

        let hash = hash_password(&request.password)?;
        let admin = self
            .repository
            .admins
            .create(
                &email,
                &hash,
                request.first_name.trim(),
                request.last_name.trim(),
            )
            .await?
            .ok_or_else(|| AppError::Conflict(format!("An admin with e-mail {} already exists", email)))?;

        tracing::info!("Admin account created for {}", admin.email);
        Ok(AdminInfo::from(&admin))
    }

    /// Verify credentials and issue a JWT
    pub async fn login(&self, email: &str, password: &str) -> AppResult<(String, Admin)> {
        let email = email.trim().to_lowercase();
        let admin = self
            .repository
            .admins
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !verify_password(&admin.password, password)? {
            tracing::warn!("Failed login for {}", email);
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }

        let token = AdminClaims::for_admin(&admin, self.config.jwt_expiration_hours)
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        Ok((token, admin))
    }

    pub async fn get_admin(&self, admin_id: i32) -> AppResult<AdminInfo> {
        let admin = self
            .repository
            .admins
            .get_by_id(admin_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Admin {} not found", admin_id)))?;
        Ok(AdminInfo::from(&admin))
    }

    pub fn expiration_seconds(&self) -> u64 {
        self.config.jwt_expiration_hours * 3600
    }
}

fn signup_allowed(allow_list: &[String], email: &str) -> bool {
    allow_list
        .iter()
        .any(|allowed| allowed.trim().eq_ignore_ascii_case(email))
}

/// Hash a password using Argon2
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
