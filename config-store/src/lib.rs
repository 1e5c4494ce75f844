//! Camera configuration store
//!
//! Owns the persisted JSON document holding the virtual-camera list and
//! global settings. All mutations are validated here before they reach
//! disk; writes are atomic (temp file + rename) so a crash never leaves
//! a partially written document behind.

mod camera;
mod error;
mod settings;
mod slug;
mod store;

pub use camera::{Camera, IpMode};
pub use error::StoreError;
pub use settings::Settings;
pub use slug::{slugify, unique_slug};
pub use store::{ConfigStore, Document};

/// Characters used for generated ONVIF passwords
const PASSWORD_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random alphanumeric password of the given length.
///
/// Used for cameras created without explicit ONVIF credentials.
pub fn generate_password(length: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..PASSWORD_CHARS.len());
            PASSWORD_CHARS[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_password() {
        let pw1 = generate_password(16);
        let pw2 = generate_password(16);

        assert_eq!(pw1.len(), 16);
        assert_ne!(pw1, pw2);
        assert!(pw1.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
