// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Active applications of a tenant
//!
//! Each application is one entry in an [`ApplicationStore`], named by the serialized
//! [`ApplicationId`] and holding the id of the session with the application's content.
//! Adds and removals are handled as events on the registry's own [`WorkerPool`], which
//! tells the [`ReloadHandler`] which applications are gone.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::{ProvisionError, ProvisionResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId {
    pub tenant: String,
    pub application: String,
    pub instance: String,
}

impl ApplicationId {
    pub fn new(
        tenant: impl Into<String>,
        application: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            application: application.into(),
            instance: instance.into(),
        }
    }

    /// `tenant:application:instance`
    pub fn serialized_form(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.tenant, self.application, self.instance)
    }
}

impl FromStr for ApplicationId {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [tenant, application, instance]
                if !tenant.is_empty() && !application.is_empty() && !instance.is_empty() =>
            {
                Ok(Self::new(*tenant, *application, *instance))
            }
            _ => Err(ProvisionError::InvalidApplicationId(s.to_string())),
        }
    }
}

/// Flat key-value storage of application entries
pub trait ApplicationStore: Send + Sync {
    fn list(&self) -> ProvisionResult<Vec<String>>;

    fn read(&self, name: &str) -> ProvisionResult<Option<String>>;

    /// Creates or overwrites an entry; returns true if it was created
    fn write(&self, name: &str, data: &str) -> ProvisionResult<bool>;

    /// Returns true if an entry was removed
    fn delete(&self, name: &str) -> ProvisionResult<bool>;
}

#[derive(Debug, Default)]
pub struct MemoryApplicationStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApplicationStore for MemoryApplicationStore {
    fn list(&self) -> ProvisionResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn read(&self, name: &str) -> ProvisionResult<Option<String>> {
        Ok(self.entries.read().get(name).cloned())
    }

    fn write(&self, name: &str, data: &str) -> ProvisionResult<bool> {
        Ok(self
            .entries
            .write()
            .insert(name.to_string(), data.to_string())
            .is_none())
    }

    fn delete(&self, name: &str) -> ProvisionResult<bool> {
        Ok(self.entries.write().remove(name).is_some())
    }
}

/// One file per application under a directory
#[derive(Debug, Clone)]
pub struct DirectoryApplicationStore {
    root: PathBuf,
}

impl DirectoryApplicationStore {
    pub fn open(root: impl AsRef<Path>) -> ProvisionResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ApplicationStore for DirectoryApplicationStore {
    fn list(&self) -> ProvisionResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> ProvisionResult<Option<String>> {
        match fs::read_to_string(self.root.join(name)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, name: &str, data: &str) -> ProvisionResult<bool> {
        let path = self.root.join(name);
        let created = !path.exists();
        fs::write(path, data)?;
        Ok(created)
    }

    fn delete(&self, name: &str) -> ProvisionResult<bool> {
        match fs::remove_file(self.root.join(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Receives application removals
pub trait ReloadHandler: Send + Sync {
    fn remove_application(&self, id: &ApplicationId);

    fn remove_applications_except(&self, active: &HashSet<ApplicationId>);
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of named worker threads fed from one queue
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(name: &str, threads: usize) -> ProvisionResult<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads.max(1));
        for index in 0..threads.max(1) {
            let receiver = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })?;
            workers.push(worker);
        }
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queues `job`; false once the pool is shut down
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match &self.sender {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Runs the queued jobs to completion and joins the workers
    pub fn shutdown(&mut self) {
        self.sender = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("Worker thread panicked during shutdown");
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.is_none()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, Clone)]
enum ApplicationEvent {
    Added(ApplicationId),
    Updated(ApplicationId),
    Removed(ApplicationId),
}

pub struct TenantApplications {
    tenant: String,
    store: Arc<dyn ApplicationStore>,
    reload_handler: Arc<dyn ReloadHandler>,
    workers: Mutex<Option<WorkerPool>>,
}

impl TenantApplications {
    pub fn new(
        tenant: impl Into<String>,
        store: Arc<dyn ApplicationStore>,
        reload_handler: Arc<dyn ReloadHandler>,
    ) -> ProvisionResult<Self> {
        let tenant = tenant.into();
        let workers = WorkerPool::new(&format!("applications-{}", tenant), 1)?;
        Ok(Self {
            tenant,
            store,
            reload_handler,
            workers: Mutex::new(Some(workers)),
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Applications with a readable session id; other entries are skipped
    pub fn list_applications(&self) -> ProvisionResult<Vec<ApplicationId>> {
        list_active(&self.tenant, self.store.as_ref())
    }

    pub fn get_session_id(&self, id: &ApplicationId) -> ProvisionResult<u64> {
        session_id(self.store.as_ref(), id)
    }

    /// Registers `id` as active with `session_id`, overwriting any previous session
    pub fn put_application(&self, id: &ApplicationId, session_id: u64) -> ProvisionResult<()> {
        self.ensure_open()?;
        let created = self
            .store
            .write(&id.serialized_form(), &session_id.to_string())?;
        let event = if created {
            ApplicationEvent::Added(id.clone())
        } else {
            ApplicationEvent::Updated(id.clone())
        };
        self.dispatch(event);
        Ok(())
    }

    /// Returns true if the application existed
    pub fn delete_application(&self, id: &ApplicationId) -> ProvisionResult<bool> {
        self.ensure_open()?;
        let deleted = self.store.delete(&id.serialized_form())?;
        if deleted {
            self.dispatch(ApplicationEvent::Removed(id.clone()));
        }
        Ok(deleted)
    }

    /// Tells the reload handler to drop everything not currently listed
    pub fn remove_unused_applications(&self) -> ProvisionResult<()> {
        remove_unused(&self.tenant, self.store.as_ref(), self.reload_handler.as_ref())
    }

    /// Finishes pending events and stops the worker. Later changes fail.
    pub fn close(&self) {
        if let Some(mut workers) = self.workers.lock().take() {
            workers.shutdown();
            log::debug!("Closed application registry of tenant {}", self.tenant);
        }
    }

    fn ensure_open(&self) -> ProvisionResult<()> {
        if self.workers.lock().is_some() {
            Ok(())
        } else {
            Err(ProvisionError::Closed(self.tenant.clone()))
        }
    }

    fn dispatch(&self, event: ApplicationEvent) {
        let tenant = self.tenant.clone();
        let store = Arc::clone(&self.store);
        let handler = Arc::clone(&self.reload_handler);
        let queued = match self.workers.lock().as_ref() {
            Some(workers) => workers.execute(move || {
                handle_event(&tenant, store.as_ref(), handler.as_ref(), event)
            }),
            None => false,
        };
        if !queued {
            log::warn!("Dropped application event for tenant {}", self.tenant);
        }
    }
}

impl Drop for TenantApplications {
    fn drop(&mut self) {
        self.close();
    }
}

fn handle_event(
    tenant: &str,
    store: &dyn ApplicationStore,
    handler: &dyn ReloadHandler,
    event: ApplicationEvent,
) {
    match event {
        ApplicationEvent::Added(id) => log::debug!("Tenant {}: application added: {}", tenant, id),
        ApplicationEvent::Updated(id) => log::trace!("Tenant {}: application redeployed: {}", tenant, id),
        ApplicationEvent::Removed(id) => {
            handler.remove_application(&id);
            log::info!("Tenant {}: application removed: {}", tenant, id);
        }
    }
    // events may have been missed, so reconcile against the full listing
    if let Err(e) = remove_unused(tenant, store, handler) {
        log::warn!("Tenant {}: unable to remove unused applications: {}", tenant, e);
    }
}

fn session_id(store: &dyn ApplicationStore, id: &ApplicationId) -> ProvisionResult<u64> {
    let name = id.serialized_form();
    let data = store
        .read(&name)?
        .ok_or_else(|| ProvisionError::ApplicationNotFound(name.clone()))?;
    data.trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ProvisionError::InvalidSessionId {
            id: name,
            reason: e.to_string(),
        })
}

fn list_active(tenant: &str, store: &dyn ApplicationStore) -> ProvisionResult<Vec<ApplicationId>> {
    let mut active = Vec::new();
    for name in store.list()? {
        let parsed = name
            .parse::<ApplicationId>()
            .and_then(|id| session_id(store, &id).map(|_| id));
        match parsed {
            Ok(id) => active.push(id),
            Err(e) => log::info!(
                "Tenant {}: unable to parse application with id '{}', ignoring: {}",
                tenant,
                name,
                e
            ),
        }
    }
    Ok(active)
}

fn remove_unused(
    tenant: &str,
    store: &dyn ApplicationStore,
    handler: &dyn ReloadHandler,
) -> ProvisionResult<()> {
    let active: HashSet<ApplicationId> = list_active(tenant, store)?.into_iter().collect();
    handler.remove_applications_except(&active);
    Ok(())
}
