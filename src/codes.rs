//! Random code minting for the verification protocol.
//!
//! Both the confirmation code (minted at scheduling) and the handshake code
//! (minted at verification start) come from the same generator, drawn
//! independently and uniformly from 1000-9999.

use rand::Rng;

use crate::types::VerificationCode;

/// Mints 4-digit verification codes.
///
/// The trait seam exists so tests can pin the minted values; production uses
/// `RandomCodeGenerator`.
pub trait CodeGenerator: Send + Sync {
    fn mint(&self) -> VerificationCode;
}

/// Uniform random codes from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn mint(&self) -> VerificationCode {
        VerificationCode::from_number(rand::thread_rng().gen_range(1000..=9999))
    }
}

/// Deterministic generator for tests: yields the given codes in order and
/// repeats the last one when exhausted.
pub struct FixedCodeGenerator {
    codes: Vec<u16>,
    next: std::sync::atomic::AtomicUsize,
}

impl FixedCodeGenerator {
    pub fn new(codes: Vec<u16>) -> Self {
        assert!(!codes.is_empty(), "FixedCodeGenerator needs at least one code");
        FixedCodeGenerator {
            codes,
            next: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

impl CodeGenerator for FixedCodeGenerator {
    fn mint(&self) -> VerificationCode {
        let i = self
            .next
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            .min(self.codes.len() - 1);
        VerificationCode::from_number(self.codes[i])
    }
}
