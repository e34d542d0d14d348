//! Administrator accounts and JWT claims

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Staff account allowed to operate the ledger
#[derive(Debug, Clone, FromRow)]
pub struct Admin {
    pub id: i32,
    pub email: String,
    /// Argon2 hash
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub crea_date: DateTime<Utc>,
}

/// Public view of an admin account
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminInfo {
    pub id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&Admin> for AdminInfo {
    fn from(admin: &Admin) -> Self {
        Self {
            id: admin.id,
            email: admin.email.clone(),
            first_name: admin.first_name.clone(),
            last_name: admin.last_name.clone(),
        }
    }
}

/// Admin signup request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
}

/// JWT Claims for authenticated admins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Admin e-mail, recorded as the acting user in audit entries
    pub sub: String,
    pub admin_id: i32,
    pub name: String,
    pub exp: i64,
    pub iat: i64,
}

impl AdminClaims {
    pub fn for_admin(admin: &Admin, expiration_hours: u64) -> Self {
        let now = Utc::now();
        Self {
            sub: admin.email.clone(),
            admin_id: admin.id,
            name: format!("{} {}", admin.first_name, admin.last_name),
            exp: (now + chrono::Duration::hours(expiration_hours as i64)).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Admin {
        Admin {
            id: 3,
            email: "librarian@school.edu".into(),
            password: String::new(),
            first_name: "Marta".into(),
            last_name: "Gil".into(),
            crea_date: Utc::now(),
        }
    }

    #[test]
    fn test_token_round_trip() {
        let claims = AdminClaims::for_admin(&admin(), 1);
        let token = claims.create_token("secret").unwrap();
        let parsed = AdminClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.sub, "librarian@school.edu");
        assert_eq!(parsed.admin_id, 3);
        assert_eq!(parsed.name, "Marta Gil");
    }

    #[test]
    fn test_token_rejected_with_wrong_secret() {
        let token = AdminClaims::for_admin(&admin(), 1)
            .create_token("secret")
            .unwrap();
        assert!(AdminClaims::from_token(&token, "other").is_err());
    }
}
