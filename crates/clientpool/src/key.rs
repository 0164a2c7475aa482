use std::fmt;

use sha2::{Digest, Sha256};

/// Identity of the credential material used to authenticate against a set of
/// brokers.
///
/// This names *which* credentials are in play, not their contents: rotating
/// the referenced material keeps the same `CredentialsRef` and therefore the
/// same [`ClientKey`]. Rotation is applied through
/// [`ClientPool::reconfigure`](crate::ClientPool::reconfigure).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CredentialsRef {
    /// Namespace the credential material lives in.
    pub namespace: String,
    /// Name of the credential material.
    pub name: String,
}

impl CredentialsRef {
    /// Creates a reference to the credential material `namespace/name`.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CredentialsRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Stable fingerprint identifying one logical broker connection target.
///
/// Built from the bootstrap addresses and the credentials reference. The
/// address list is sorted and deduplicated first, so differently-ordered
/// lists of the same addresses produce equal keys.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    hash: [u8; 32],
}

impl ClientKey {
    /// Derives the key for the given bootstrap addresses and credentials.
    pub fn new(bootstrap_servers: &[String], credentials: Option<&CredentialsRef>) -> Self {
        let mut servers: Vec<&str> = bootstrap_servers.iter().map(String::as_str).collect();
        servers.sort_unstable();
        servers.dedup();

        let mut hasher = Sha256::new();
        for server in servers {
            hasher.update(server.as_bytes());
            hasher.update([0u8]);
        }
        if let Some(credentials) = credentials {
            hasher.update(credentials.namespace.as_bytes());
            hasher.update([0u8]);
            hasher.update(credentials.name.as_bytes());
        }

        Self {
            hash: hasher.finalize().into(),
        }
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.hash[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientKey({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers(addresses: &[&str]) -> Vec<String> {
        addresses.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_key_ignores_address_order() {
        let credentials = CredentialsRef::new("eventing", "broker-auth");

        let key1 = ClientKey::new(
            &servers(&["localhost:9090", "localhost:9091", "localhost:9092"]),
            Some(&credentials),
        );
        let key2 = ClientKey::new(
            &servers(&["localhost:9092", "localhost:9091", "localhost:9090"]),
            Some(&credentials),
        );
        let key3 = ClientKey::new(
            &servers(&["localhost:9090", "localhost:9091", "localhost:9092"]),
            None,
        );

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_key_depends_on_credentials_identity() {
        let addresses = servers(&["localhost:9092"]);

        let key1 = ClientKey::new(&addresses, Some(&CredentialsRef::new("eventing", "auth-a")));
        let key2 = ClientKey::new(&addresses, Some(&CredentialsRef::new("eventing", "auth-b")));

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_duplicate_addresses_collapse() {
        let key1 = ClientKey::new(&servers(&["localhost:9092", "localhost:9092"]), None);
        let key2 = ClientKey::new(&servers(&["localhost:9092"]), None);

        assert_eq!(key1, key2);
    }
}
