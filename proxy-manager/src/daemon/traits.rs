//! The capability the reconciler needs from the proxy daemon.

use async_trait::async_trait;

use crate::daemon::error::DaemonResult;
use crate::daemon::types::{Proxy, Toxic};

/// Operations on a Toxiproxy-compatible daemon.
///
/// Implementations report every failure; the reconciler decides whether to
/// retry, log or abort.
#[async_trait(?Send)]
pub trait ProxyDaemon {
    /// Fetch a proxy by name.
    ///
    /// # Returns
    ///
    /// - `Err(DaemonError::NotFound)` if no proxy has that name
    async fn get_proxy(&self, name: &str) -> DaemonResult<Proxy>;

    /// Register a proxy.
    ///
    /// # Returns
    ///
    /// - `Err(DaemonError::AlreadyExists)` if the name is taken
    async fn create_proxy(&self, name: &str, listen: &str, upstream: &str) -> DaemonResult<Proxy>;

    /// Tear a proxy down.
    async fn delete_proxy(&self, proxy: &Proxy) -> DaemonResult<()>;

    /// Toxics currently active on a proxy.
    async fn list_toxics(&self, proxy: &Proxy) -> DaemonResult<Vec<Toxic>>;

    /// Install a toxic.
    async fn add_toxic(&self, proxy: &Proxy, toxic: &Toxic) -> DaemonResult<Toxic>;

    /// Uninstall a toxic by name.
    ///
    /// # Returns
    ///
    /// - `Err(DaemonError::NotFound)` if the toxic is not installed
    async fn remove_toxic(&self, proxy: &Proxy, toxic_name: &str) -> DaemonResult<()>;

    /// Persist the proxy's current definition on the daemon.
    async fn save(&self, proxy: &Proxy) -> DaemonResult<()>;
}

#[async_trait(?Send)]
impl<D: ProxyDaemon + ?Sized> ProxyDaemon for &D {
    async fn get_proxy(&self, name: &str) -> DaemonResult<Proxy> {
        (**self).get_proxy(name).await
    }

    async fn create_proxy(&self, name: &str, listen: &str, upstream: &str) -> DaemonResult<Proxy> {
        (**self).create_proxy(name, listen, upstream).await
    }

    async fn delete_proxy(&self, proxy: &Proxy) -> DaemonResult<()> {
        (**self).delete_proxy(proxy).await
    }

    async fn list_toxics(&self, proxy: &Proxy) -> DaemonResult<Vec<Toxic>> {
        (**self).list_toxics(proxy).await
    }

    async fn add_toxic(&self, proxy: &Proxy, toxic: &Toxic) -> DaemonResult<Toxic> {
        (**self).add_toxic(proxy, toxic).await
    }

    async fn remove_toxic(&self, proxy: &Proxy, toxic_name: &str) -> DaemonResult<()> {
        (**self).remove_toxic(proxy, toxic_name).await
    }

    async fn save(&self, proxy: &Proxy) -> DaemonResult<()> {
        (**self).save(proxy).await
    }
}
