//! Random secrets handed to users.

use rand::Rng;
use subtle::ConstantTimeEq;

/// Number of digits in a one-time code.
pub const CODE_DIGITS: usize = 6;

/// Generate a uniformly random 6-digit one-time code.
///
/// Drawn from the thread-local CSPRNG; leading zeros are kept.
pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", n)
}

/// Compare a presented code with the stored one in constant time.
///
/// An empty presented code never matches.
pub fn codes_match(stored: &str, presented: &str) -> bool {
    if presented.is_empty() {
        return false;
    }
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}
