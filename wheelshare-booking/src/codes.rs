use rand::Rng;

use crate::models::ConfirmationCode;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of candidate confirmation codes. Uniqueness is checked by the
/// ledger at commit, not here.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> ConfirmationCode;
}

/// Uniformly random codes over `A-Z0-9`
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub const DEFAULT_LENGTH: usize = 6;

    pub fn new(length: usize) -> Self {
        Self {
            length: length.clamp(ConfirmationCode::MIN_LEN, ConfirmationCode::MAX_LEN),
        }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> ConfirmationCode {
        let mut rng = rand::thread_rng();
        let code: String = (0..self.length)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();

        ConfirmationCode::from_generated(code)
    }
}
