use rand::Rng;
use sha2::{Digest, Sha256};

const SALT_BYTES: usize = 8;

/// Salted one-way hash, stored as `salt$hexdigest`. Plaintext never
/// reaches the store.
pub fn hash_password(password: &str) -> String {
    let mut rng = rand::thread_rng();
    let salt: String = (0..SALT_BYTES)
        .map(|_| format!("{:02x}", rng.gen::<u8>()))
        .collect();
    format!("{}${}", salt, digest(&salt, password))
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    digest(salt, password) == expected
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
