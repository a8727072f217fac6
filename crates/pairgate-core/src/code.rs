//! Six-digit pairing code generation.
//!
//! Locally generated codes carry no protocol authority. They are shown to the
//! user by the local adapter, or as a placeholder when a real adapter has not
//! supplied a code of its own.

use rand::Rng;

/// Lowest code that can be produced.
pub const CODE_MIN: u32 = 100_000;
/// Highest code that can be produced.
pub const CODE_MAX: u32 = 999_999;

/// Generate a uniformly random code in `100000..=999999`.
pub fn generate_code() -> String {
    generate_code_with(&mut rand::thread_rng())
}

/// Generate a code from a caller-supplied RNG.
pub fn generate_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.gen_range(CODE_MIN..=CODE_MAX).to_string()
}

/// Whether `code` has the shape of a pairing code.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 6
        && code.bytes().all(|b| b.is_ascii_digit())
        && code.parse::<u32>().is_ok_and(|n| (CODE_MIN..=CODE_MAX).contains(&n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_codes_are_six_digits_in_range() {
        for _ in 0..1_000 {
            let code = generate_code();
            assert!(is_valid_code(&code), "bad code {code}");
        }
    }

    #[test]
    fn test_codes_are_not_monotonic() {
        let mut rng = StdRng::seed_from_u64(7);
        let codes: Vec<u32> = (0..50)
            .map(|_| generate_code_with(&mut rng).parse().unwrap())
            .collect();
        let ascending = codes.windows(2).all(|w| w[0] <= w[1]);
        let descending = codes.windows(2).all(|w| w[0] >= w[1]);
        assert!(!ascending && !descending);
    }

    #[test]
    fn test_is_valid_code() {
        assert!(is_valid_code("100000"));
        assert!(is_valid_code("999999"));
        assert!(!is_valid_code("099999"));
        assert!(!is_valid_code("12345"));
        assert!(!is_valid_code("12a456"));
    }
}
