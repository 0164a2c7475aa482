use std::sync::Arc;

use futures::future::BoxFuture;
use keypool::{Closeable, Factory, Handle, PoolCache};
use tokio_util::sync::CancellationToken;

use crate::config::ClientPoolConfig;
use crate::error::ClientPoolError;
use crate::key::{ClientKey, CredentialsRef};

/// Everything the connect function needs to build one client.
#[derive(Clone, Debug)]
pub struct ClientSettings {
    /// Broker bootstrap addresses.
    pub bootstrap_servers: Vec<String>,
    /// Credentials to authenticate with, if any. The connect function is
    /// expected to resolve the referenced material itself, so a rotation is
    /// picked up by the next connection attempt.
    pub credentials: Option<CredentialsRef>,
}

/// Establishes one client connection. Injected so tests can substitute a
/// mock transport.
pub type ConnectFn<C> =
    Arc<dyn Fn(ClientSettings) -> BoxFuture<'static, anyhow::Result<C>> + Send + Sync>;

/// A pool of broker clients, one sub-pool per broker/credentials pair.
///
/// Callers borrow a client for the duration of one operation and drop the
/// returned [`Handle`] to give it back. Clients for a pair are created
/// on demand up to [`ClientPoolConfig::capacity_per_key`] and reclaimed once
/// they sit idle past the pool's idle timeout.
///
/// Cheap to clone; all clones share the same pool.
pub struct ClientPool<C> {
    cache: PoolCache<ClientKey, C>,
    connect: ConnectFn<C>,
    config: ClientPoolConfig,
}

impl<C> Clone for ClientPool<C> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            connect: Arc::clone(&self.connect),
            config: self.config.clone(),
        }
    }
}

impl<C: Closeable> ClientPool<C> {
    /// Creates a pool with the default configuration.
    pub fn new(connect: ConnectFn<C>) -> Self {
        Self::with_config(connect, ClientPoolConfig::default())
    }

    /// Creates a pool with the given configuration.
    pub fn with_config(connect: ConnectFn<C>, config: ClientPoolConfig) -> Self {
        Self {
            cache: PoolCache::with_config(config.pool.clone()),
            connect,
            config,
        }
    }

    /// Borrows a client for the given brokers and credentials, connecting a
    /// new one if the pool has room and nothing idle is available.
    pub async fn get(
        &self,
        ctx: &CancellationToken,
        bootstrap_servers: &[String],
        credentials: Option<&CredentialsRef>,
    ) -> Result<Handle<C>, ClientPoolError> {
        let key = self.key_for(bootstrap_servers, credentials)?;
        let factory = self.factory_for(bootstrap_servers, credentials);

        let (handle, pre_existed) = self
            .cache
            .add_and_acquire(ctx, key, factory, self.config.capacity_per_key)
            .await?;
        if !pre_existed {
            tracing::debug!(
                servers = bootstrap_servers.len(),
                "opened new client pool entry"
            );
        }
        Ok(handle)
    }

    /// Rebuilds the clients for the given brokers and credentials, e.g.
    /// after the referenced credential material was rotated.
    ///
    /// Clients currently borrowed stay valid and are replaced as they come
    /// back. Returns false if no clients are pooled for this pair.
    pub async fn reconfigure(
        &self,
        bootstrap_servers: &[String],
        credentials: Option<&CredentialsRef>,
    ) -> Result<bool, ClientPoolError> {
        let key = self.key_for(bootstrap_servers, credentials)?;
        let factory = self.factory_for(bootstrap_servers, credentials);

        let existed = self
            .cache
            .update_if_exists(&key, factory, self.config.capacity_per_key)
            .await?;
        if existed {
            tracing::debug!(key = %key, "rebuilt pooled clients");
        }
        Ok(existed)
    }

    /// Shuts the pool down, closing every pooled client. Borrowed clients
    /// are closed as they are returned.
    pub async fn close(&self) {
        self.cache.close().await;
    }

    fn key_for(
        &self,
        bootstrap_servers: &[String],
        credentials: Option<&CredentialsRef>,
    ) -> Result<ClientKey, ClientPoolError> {
        if bootstrap_servers.is_empty() {
            return Err(ClientPoolError::NoBootstrapServers);
        }
        Ok(ClientKey::new(bootstrap_servers, credentials))
    }

    fn factory_for(
        &self,
        bootstrap_servers: &[String],
        credentials: Option<&CredentialsRef>,
    ) -> Factory<C> {
        let connect = Arc::clone(&self.connect);
        let settings = ClientSettings {
            bootstrap_servers: bootstrap_servers.to_vec(),
            credentials: credentials.cloned(),
        };
        Arc::new(move || connect(settings.clone()))
    }
}
