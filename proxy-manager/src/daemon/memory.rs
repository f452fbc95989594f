//! In-process daemon for tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;

use crate::daemon::error::{DaemonError, DaemonResult};
use crate::daemon::traits::ProxyDaemon;
use crate::daemon::types::{Proxy, Toxic};

/// Daemon operation, used to target injected failures and to read the call log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DaemonOp {
    /// `get_proxy`
    GetProxy,
    /// `create_proxy`
    CreateProxy,
    /// `delete_proxy`
    DeleteProxy,
    /// `list_toxics`
    ListToxics,
    /// `add_toxic`
    AddToxic,
    /// `remove_toxic`
    RemoveToxic,
    /// `save`
    Save,
}

#[derive(Debug)]
struct DaemonCall {
    op: DaemonOp,
    proxy: String,
}

/// In-memory daemon with the conflict and not-found behavior of Toxiproxy.
///
/// Failures can be injected per operation: [`fail_first`] makes the first
/// `n` calls of an operation fail *for every proxy*, [`fail_always`] breaks a
/// single proxy, and [`set_unreachable`] fails everything.
///
/// [`fail_first`]: InMemoryDaemon::fail_first
/// [`fail_always`]: InMemoryDaemon::fail_always
/// [`set_unreachable`]: InMemoryDaemon::set_unreachable
#[derive(Debug, Default)]
pub struct InMemoryDaemon {
    proxies: RefCell<BTreeMap<String, Proxy>>,
    calls: RefCell<Vec<DaemonCall>>,
    fail_first: RefCell<HashMap<DaemonOp, u32>>,
    fail_always: RefCell<HashSet<(DaemonOp, String)>>,
    attempts: RefCell<HashMap<(DaemonOp, String), u32>>,
    unreachable: Cell<bool>,
}

impl InMemoryDaemon {
    /// Create an empty daemon.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a proxy directly, bypassing the call log.
    pub fn insert_proxy(&self, proxy: Proxy) {
        self.proxies.borrow_mut().insert(proxy.name.clone(), proxy);
    }

    /// Names of all registered proxies, sorted.
    pub fn proxy_names(&self) -> Vec<String> {
        self.proxies.borrow().keys().cloned().collect()
    }

    /// Toxics on a proxy, or `None` if the proxy does not exist.
    pub fn toxics_of(&self, name: &str) -> Option<Vec<Toxic>> {
        self.proxies.borrow().get(name).map(|p| p.toxics.clone())
    }

    /// Number of calls of `op`, across all proxies.
    pub fn count_calls(&self, op: DaemonOp) -> usize {
        self.calls.borrow().iter().filter(|c| c.op == op).count()
    }

    /// Names of the proxies `op` was called on, in call order.
    pub fn proxies_called(&self, op: DaemonOp) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.proxy.clone())
            .collect()
    }

    /// Fail the first `n` calls of `op` on each proxy with a 500.
    pub fn fail_first(&self, op: DaemonOp, n: u32) {
        self.fail_first.borrow_mut().insert(op, n);
    }

    /// Fail every call of `op` on `proxy` with a 500.
    pub fn fail_always(&self, op: DaemonOp, proxy: &str) {
        self.fail_always
            .borrow_mut()
            .insert((op, proxy.to_string()));
    }

    /// Fail every call with [`DaemonError::Unreachable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.set(unreachable);
    }

    fn record(&self, op: DaemonOp, proxy: &str) -> DaemonResult<()> {
        self.calls.borrow_mut().push(DaemonCall {
            op,
            proxy: proxy.to_string(),
        });
        if self.unreachable.get() {
            return Err(DaemonError::Unreachable);
        }

        let key = (op, proxy.to_string());
        let attempt = {
            let mut attempts = self.attempts.borrow_mut();
            let entry = attempts.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        let budget = self.fail_first.borrow().get(&op).copied().unwrap_or(0);
        if attempt <= budget || self.fail_always.borrow().contains(&key) {
            return Err(DaemonError::Status {
                status: 500,
                body: format!("injected {op:?} failure on {proxy}"),
            });
        }
        Ok(())
    }

    fn with_proxy<T>(&self, name: &str, f: impl FnOnce(&mut Proxy) -> DaemonResult<T>) -> DaemonResult<T> {
        let mut proxies = self.proxies.borrow_mut();
        let proxy = proxies
            .get_mut(name)
            .ok_or_else(|| DaemonError::NotFound(name.to_string()))?;
        f(proxy)
    }
}

#[async_trait(?Send)]
impl ProxyDaemon for InMemoryDaemon {
    async fn get_proxy(&self, name: &str) -> DaemonResult<Proxy> {
        self.record(DaemonOp::GetProxy, name)?;
        self.with_proxy(name, |proxy| Ok(proxy.clone()))
    }

    async fn create_proxy(&self, name: &str, listen: &str, upstream: &str) -> DaemonResult<Proxy> {
        self.record(DaemonOp::CreateProxy, name)?;
        let mut proxies = self.proxies.borrow_mut();
        if proxies.contains_key(name) {
            return Err(DaemonError::AlreadyExists(name.to_string()));
        }
        let proxy = Proxy::new(name, listen, upstream);
        proxies.insert(name.to_string(), proxy.clone());
        Ok(proxy)
    }

    async fn delete_proxy(&self, proxy: &Proxy) -> DaemonResult<()> {
        self.record(DaemonOp::DeleteProxy, &proxy.name)?;
        self.proxies
            .borrow_mut()
            .remove(&proxy.name)
            .map(|_| ())
            .ok_or_else(|| DaemonError::NotFound(proxy.name.clone()))
    }

    async fn list_toxics(&self, proxy: &Proxy) -> DaemonResult<Vec<Toxic>> {
        self.record(DaemonOp::ListToxics, &proxy.name)?;
        self.with_proxy(&proxy.name, |p| Ok(p.toxics.clone()))
    }

    async fn add_toxic(&self, proxy: &Proxy, toxic: &Toxic) -> DaemonResult<Toxic> {
        self.record(DaemonOp::AddToxic, &proxy.name)?;
        self.with_proxy(&proxy.name, |p| {
            if p.toxics.iter().any(|t| t.name == toxic.name) {
                return Err(DaemonError::AlreadyExists(format!(
                    "{}/{}",
                    p.name, toxic.name
                )));
            }
            p.toxics.push(toxic.clone());
            Ok(toxic.clone())
        })
    }

    async fn remove_toxic(&self, proxy: &Proxy, toxic_name: &str) -> DaemonResult<()> {
        self.record(DaemonOp::RemoveToxic, &proxy.name)?;
        self.with_proxy(&proxy.name, |p| {
            let before = p.toxics.len();
            p.toxics.retain(|t| t.name != toxic_name);
            if p.toxics.len() == before {
                Err(DaemonError::NotFound(format!("{}/{toxic_name}", p.name)))
            } else {
                Ok(())
            }
        })
    }

    async fn save(&self, proxy: &Proxy) -> DaemonResult<()> {
        self.record(DaemonOp::Save, &proxy.name)?;
        self.with_proxy(&proxy.name, |p| {
            p.listen = proxy.listen.clone();
            p.upstream = proxy.upstream.clone();
            p.enabled = proxy.enabled;
            Ok(())
        })
    }
}
