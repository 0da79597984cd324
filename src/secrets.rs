//! Credential resolution for remote sources and destinations.
//!
//! Source configs reference credentials indirectly via
//! `credential_secret_ref` so that connection strings and passwords never
//! appear in the configuration tree itself. `SecretResolver` is the seam;
//! `EnvSecretResolver` is the only implementation needed for this pipeline's
//! deployment model (secrets injected as environment variables).

use secrecy::{ExposeSecret, SecretString};

use crate::error::{FileHorizonError, FileHorizonResult};

/// A resolved username/password pair for protocol authentication.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub password: SecretString,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credential {
    pub fn expose_password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Resolves a `credential_secret_ref` into a `Credential`.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> FileHorizonResult<Credential>;
}

/// Resolves `<REF>` to the pair of environment variables
/// `FILEHORIZON_SECRET_<REF>_USERNAME` / `FILEHORIZON_SECRET_<REF>_PASSWORD`.
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, reference: &str) -> FileHorizonResult<Credential> {
        let upper = reference.to_ascii_uppercase();
        let username_var = format!("FILEHORIZON_SECRET_{upper}_USERNAME");
        let password_var = format!("FILEHORIZON_SECRET_{upper}_PASSWORD");

        let username =
            std::env::var(&username_var).map_err(|_| FileHorizonError::Configuration {
                field: format!("credential_secret_ref({reference})"),
                message: format!("missing environment variable {username_var}"),
            })?;
        let password =
            std::env::var(&password_var).map_err(|_| FileHorizonError::Configuration {
                field: format!("credential_secret_ref({reference})"),
                message: format!("missing environment variable {password_var}"),
            })?;

        Ok(Credential {
            username,
            password: SecretString::from(password),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_password() {
        let credential = Credential {
            username: "svc".to_string(),
            password: SecretString::from("hunter2".to_string()),
        };
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn missing_env_vars_surface_as_configuration_error() {
        let resolver = EnvSecretResolver;
        let result = resolver.resolve("does-not-exist-ref");
        assert!(matches!(
            result,
            Err(FileHorizonError::Configuration { .. })
        ));
    }
}
