/// Shared-password gate for the wire protocol. When a password is
/// configured, a connection's first request must be `auth` with the
/// matching value before anything else is served.
#[derive(Debug, Clone)]
pub struct PasswordGate {
    password: Option<String>,
}

impl PasswordGate {
    /// An empty password disables the gate.
    pub fn new(password: Option<String>) -> Self {
        let password = password.filter(|p| !p.is_empty());
        Self { password }
    }

    pub fn required(&self) -> bool {
        self.password.is_some()
    }

    pub fn verify(&self, presented: &str) -> bool {
        match &self.password {
            Some(expected) => expected == presented,
            None => true,
        }
    }
}
