use std::fmt;
use zeroize::Zeroizing;

/// A password held only for the duration of one privileged action.
///
/// The secret is zeroed when the credential is dropped. A credential without a
/// secret stands for a process that already runs as root.
pub struct Credential {
    secret: Option<Zeroizing<String>>,
}

impl Credential {
    pub fn from_secret(secret: Zeroizing<String>) -> Self {
        Self {
            secret: Some(secret),
        }
    }

    pub fn root() -> Self {
        Self { secret: None }
    }

    pub fn is_root(&self) -> bool {
        self.secret.is_none()
    }

    /// Line fed to `sudo -S`.
    pub(crate) fn stdin_line(&self) -> Option<Zeroizing<String>> {
        self.secret
            .as_ref()
            .map(|s| Zeroizing::new(format!("{}\n", s.as_str())))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("Credential(root)")
        } else {
            f.write_str("Credential(<redacted>)")
        }
    }
}
