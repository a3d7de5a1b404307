use rand::Rng;

/// Generate `bytes` random bytes, hex encoded (`2 * bytes` characters).
pub fn generate_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    hex::encode(buf)
}

/// Generate a decimal string of exactly `len` digits (leading zeros allowed).
pub fn generate_numeric(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Generate a random salt for password hashing.
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; 64];
    rand::thread_rng().fill(&mut salt[..]);
    salt
}

/// 16 random bytes for a CBC initialization vector.
pub(crate) fn generate_iv() -> [u8; 16] {
    rand::thread_rng().gen()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_hex() {
        let token = generate_hex(8);
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_hex(8));
    }

    #[test]
    fn test_generate_numeric() {
        for len in [1, 6, 16] {
            let code = generate_numeric(len);
            assert_eq!(code.len(), len);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_generate_salt() {
        let salt = generate_salt();
        assert_eq!(salt.len(), 64);
        assert_ne!(salt, generate_salt());
    }
}
