use rand::Rng;

use crate::schema;
use crate::store::{Store, StoreError};

/// Human-enterable: no 0/O, 1/I/L lookalikes.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 6;
pub const MAX_ATTEMPTS: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum CodeError {
    #[error("no free personal code after {0} attempts")]
    Exhausted(u32),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn random_code(rng: &mut impl Rng) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Rejection-sample a personal code against the live teacher index.
/// Every attempt re-queries committed state; the attempt bound makes a
/// near-full keyspace fail loudly instead of spinning.
pub fn generate_personal_code(store: &Store) -> Result<String, CodeError> {
    generate_with(|code| store.exists_by_index(&schema::TEACHERS, "personalCode", code))
}

fn generate_with(
    mut taken: impl FnMut(&str) -> Result<bool, StoreError>,
) -> Result<String, CodeError> {
    let mut rng = rand::thread_rng();
    for _ in 0..MAX_ATTEMPTS {
        let code = random_code(&mut rng);
        if !taken(&code)? {
            return Ok(code);
        }
    }
    Err(CodeError::Exhausted(MAX_ATTEMPTS))
}
