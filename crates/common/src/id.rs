//! ID generation utilities.

use rand::Rng;
use ulid::Ulid;
use uuid::Uuid;

/// Alphabet used for anonymous voter ids (base36, matching the ids browsers
/// mint and persist locally).
const ANON_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random suffix in an anonymous voter id.
const ANON_SUFFIX_LEN: usize = 9;

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// ULIDs are:
    /// - Lexicographically sortable
    /// - Monotonically increasing within the same millisecond
    /// - Shorter than UUIDs when represented as strings
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate a cryptographically secure random token.
    #[must_use]
    pub fn generate_token(&self) -> String {
        // Use UUID v4 for tokens (no time component for security)
        Uuid::new_v4().simple().to_string()
    }

    /// Generate an anonymous voter id (`anon_` + 9 base36 chars).
    ///
    /// Clients normally mint and persist this themselves; the server-side
    /// generator exists so tooling and tests produce ids of the same shape.
    #[must_use]
    pub fn generate_anon_id(&self) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ANON_SUFFIX_LEN)
            .map(|_| ANON_ALPHABET[rng.gen_range(0..ANON_ALPHABET.len())] as char)
            .collect();
        format!("anon_{suffix}")
    }
}
