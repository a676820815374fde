//! Password hashing, random identifiers and email checks

use std::sync::OnceLock;

use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;

/// bcrypt cost factor for every stored password
pub const BCRYPT_COST: u32 = 10;

/// Length of opaque state tokens, keys and bearer values
const TOKEN_LEN: usize = 32;

/// Hash a password with bcrypt
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, BCRYPT_COST)
}

/// Verify a password against a bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(password, hash)
}

/// Generate a random identifier for stored records
pub fn generate_secret() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Generate an opaque, unguessable token (state tokens, registration keys, bearer values)
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
                .ok()
        })
        .as_ref()
}

/// Syntactic email check
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && email_pattern().is_some_and(|p| p.is_match(email))
}

/// Whether the address belongs to a throwaway mailbox service
///
/// Only the domain is judged; the local part is replaced so that syntax the
/// blocklist's own validator dislikes cannot read as disposable.
pub fn is_disposable_email(email: &str) -> bool {
    if !is_valid_email(email) {
        return false;
    }
    match email.rsplit_once('@') {
        Some((_, domain)) => !mailchecker::is_valid(&format!("mailbox@{}", domain.to_lowercase())),
        None => false,
    }
}
