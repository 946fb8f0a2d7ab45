//! OS credential store capability backend.
//!
//! On macOS this reads a generic password from Keychain by shelling out to
//! `security find-generic-password`; other platforms report the secret as
//! absent and plugins fall back to their file-based credential source.
//!
//! Absence is never an error: an unknown service, a denied read, or an
//! unsupported platform all come back as `None`, so plugin fallback logic
//! stays uniform.

/// Read-only view of the OS credential store, injected into the capability
/// shim so tests can substitute a stub.
pub trait CredentialStore: Send + Sync {
    /// Look up a generic password by service name. `None` means absent.
    fn read_generic_password(&self, service_name: &str) -> Option<String>;
}

/// The real credential store for this platform.
pub struct SystemKeychain;

impl CredentialStore for SystemKeychain {
    #[cfg(target_os = "macos")]
    fn read_generic_password(&self, service_name: &str) -> Option<String> {
        if service_name.is_empty() {
            return None;
        }

        let output = match std::process::Command::new("security")
            .args(["find-generic-password", "-s", service_name, "-w"])
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("failed to run security command: {e}");
                return None;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // "could not be found" means the credential doesn't exist
            if !stderr.contains("could not be found")
                && !stderr.contains("SecKeychainSearchCopyNext")
            {
                tracing::warn!("keychain read failed: {}", stderr.trim());
            }
            return None;
        }

        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if raw.is_empty() { None } else { Some(raw) }
    }

    #[cfg(not(target_os = "macos"))]
    fn read_generic_password(&self, service_name: &str) -> Option<String> {
        tracing::debug!("no credential store backend on this platform for \"{service_name}\"");
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
