use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::{AppError, AppResult};

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AppError::internal(format!("password hashing failed: {err}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Minimum length plus at least one uppercase, one lowercase and one digit.
pub fn validate_password_strength(password: &str, min_length: usize) -> AppResult<()> {
    if password.chars().count() < min_length {
        return Err(AppError::validation(format!(
            "Password must be at least {min_length} characters"
        )));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AppError::validation("Password must contain at least one uppercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AppError::validation("Password must contain at least one lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("Password must contain at least one number"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("Password123").unwrap();
        assert!(verify_password("Password123", &hash));
        assert!(!verify_password("Password124", &hash));
    }

    #[test]
    fn garbage_hashes_never_verify() {
        assert!(!verify_password("Password123", "not-a-phc-string"));
    }

    #[test]
    fn strength_rules() {
        assert!(validate_password_strength("Password123", 8).is_ok());
        assert!(matches!(
            validate_password_strength("Pass1", 8),
            Err(AppError::Validation(_))
        ));
        assert!(validate_password_strength("password123", 8).is_err());
        assert!(validate_password_strength("PASSWORD123", 8).is_err());
        assert!(validate_password_strength("PasswordABC", 8).is_err());
    }
}
