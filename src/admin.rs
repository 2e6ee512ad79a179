/// The single shared moderation password.
///
/// This is a confirmation gate, not access control: the secret is plaintext configuration and
/// is compared with plain equality. Anyone who needs real protection for the delete and clear
/// actions has to put the board behind proper authentication.
#[derive(Clone)]
pub struct AdminPassword(String);

pub const DEFAULT_ADMIN_PASSWORD: &str = "367098";

impl AdminPassword {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

impl Default for AdminPassword {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_PASSWORD)
    }
}

impl std::fmt::Debug for AdminPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminPassword(..)")
    }
}
