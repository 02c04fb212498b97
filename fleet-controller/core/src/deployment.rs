use crate::{
    broadcast::{Broadcaster, Message},
    file::{self, ApiAction, File, FileOverview},
    ApplyError, VolumeMount,
};
use bytes::Bytes;
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::sync::{Mutex, MutexGuard};

/// Static files in the proxy container that agents must never modify.
pub const IGNORE_FILES: &[&str] = &[
    "/etc/nginx/nginx.conf",
    "/etc/nginx/mime.types",
    "/etc/nginx/grpc-error-locations.conf",
    "/etc/nginx/grpc-error-pages.conf",
    "/usr/share/nginx/html/50x.html",
    "/usr/share/nginx/html/dashboard.html",
    "/usr/share/nginx/html/index.html",
    "/usr/share/nginx/html/nginx-modules-reference.pdf",
];

/// The desired configuration of one proxy workload, shared by all of its pods.
///
/// File state and status are guarded independently: a configuration
/// transaction holds the file lock until every subscribed agent has responded,
/// while status may be read or written at any time.
#[derive(Debug)]
pub struct Deployment {
    gateway_name: String,
    broadcaster: Broadcaster,
    files: Mutex<FileState>,

    /// The committed files, readable while a transaction holds the file lock
    /// so that agents can download files during a config apply.
    published: RwLock<Arc<Vec<File>>>,

    status: RwLock<Status>,
}

/// Exclusive access to a deployment's file state, obtained with
/// [`Deployment::lock_files`].
pub struct Files<'d> {
    state: MutexGuard<'d, FileState>,
    published: &'d RwLock<Arc<Vec<File>>>,
}

/// The result of looking up a file by name and hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileLookup {
    Found(Bytes),

    /// A file with the name exists, but with a different hash.
    WrongHash(String),

    Missing,
}

#[derive(Debug, Default)]
struct FileState {
    image_version: String,
    config_version: String,
    overviews: Vec<FileOverview>,
    api_actions: Vec<ApiAction>,

    /// Files referenced by the proxy's configuration, as reported by the agent.
    latest_file_names: Vec<String>,
}

#[derive(Debug, Default)]
struct Status {
    /// The most recent result of a request for each pod.
    pods: BTreeMap<String, Option<ApplyError>>,

    // Config and API action results are retained separately so that a later
    // successful request in the same update does not hide an earlier failure.
    latest_config_error: Option<ApplyError>,
    latest_upstream_error: Option<ApplyError>,
}

// === impl Deployment ===

impl Deployment {
    pub fn new(gateway_name: impl ToString) -> Self {
        Self {
            gateway_name: gateway_name.to_string(),
            broadcaster: Broadcaster::default(),
            files: Mutex::default(),
            published: RwLock::default(),
            status: RwLock::default(),
        }
    }

    pub fn gateway_name(&self) -> &str {
        &self.gateway_name
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Begins a configuration transaction, waiting for any transaction in
    /// progress to complete.
    pub async fn lock_files(&self) -> Files<'_> {
        Files {
            state: self.files.lock().await,
            published: &self.published,
        }
    }

    /// Looks up a committed file's contents.
    pub fn get_file(&self, name: &str, hash: &str) -> FileLookup {
        let files = self.published.read().clone();
        let mut found = FileLookup::Missing;
        for file in files.iter().filter(|f| f.meta.name == name) {
            if file.meta.hash == hash {
                return FileLookup::Found(file.contents.clone());
            }
            found = FileLookup::WrongHash(file.meta.hash.clone());
        }
        found
    }

    pub fn set_pod_status(&self, pod: impl ToString, error: Option<ApplyError>) {
        self.status.write().pods.insert(pod.to_string(), error);
    }

    pub fn remove_pod_status(&self, pod: &str) {
        self.status.write().pods.remove(pod);
    }

    /// Combines the most recent error of every pod.
    pub fn configuration_status(&self) -> Option<ApplyError> {
        ApplyError::join(self.status.read().pods.values().cloned())
    }

    pub fn set_latest_config_error(&self, error: Option<ApplyError>) {
        self.status.write().latest_config_error = error;
    }

    pub fn latest_config_error(&self) -> Option<ApplyError> {
        self.status.read().latest_config_error.clone()
    }

    pub fn set_latest_upstream_error(&self, error: Option<ApplyError>) {
        self.status.write().latest_upstream_error = error;
    }

    pub fn latest_upstream_error(&self) -> Option<ApplyError> {
        self.status.read().latest_upstream_error.clone()
    }
}

// === impl Files ===

impl Files<'_> {
    /// Returns the file overviews and configuration version to send to agents.
    pub fn overviews(&self) -> (&[FileOverview], &str) {
        (&self.state.overviews, &self.state.config_version)
    }

    pub fn api_actions(&self) -> &[ApiAction] {
        &self.state.api_actions
    }

    pub fn image_version(&self) -> &str {
        &self.state.image_version
    }

    pub fn set_image_version(&mut self, image: impl ToString) {
        self.state.image_version = image.to_string();
    }

    /// Replaces the API actions that new subscribers apply after their
    /// initial configuration.
    pub fn set_api_actions(&mut self, actions: Vec<ApiAction>) {
        self.state.api_actions = actions;
    }

    pub fn set_latest_file_names(&mut self, names: Vec<String>) {
        self.state.latest_file_names = names;
    }

    /// Replaces the deployment's files and returns the message to broadcast, or
    /// `None` if the configuration is unchanged.
    ///
    /// Reported files that live under one of `volume_mounts` were mounted by
    /// the user and are marked unmanaged, along with the static ignore list.
    pub fn set_files(&mut self, files: Vec<File>, volume_mounts: &[VolumeMount]) -> Option<Message> {
        let mut overviews = files
            .iter()
            .map(|f| FileOverview::managed(f.meta.clone()))
            .collect::<Vec<_>>();
        *self.published.write() = Arc::new(files);

        let mounted = volume_mounts
            .iter()
            .flat_map(|vm| {
                self.state
                    .latest_file_names
                    .iter()
                    .filter(move |f| f.starts_with(&vm.mount_path))
            })
            .map(String::as_str)
            .collect::<BTreeSet<_>>();
        overviews.extend(IGNORE_FILES.iter().map(FileOverview::unmanaged));
        overviews.extend(mounted.into_iter().map(FileOverview::unmanaged));

        let version = file::config_version(&overviews);
        if version == self.state.config_version {
            return None;
        }

        tracing::debug!(%version, files = overviews.len(), "Configuration changed");
        self.state.config_version = version.clone();
        self.state.overviews = overviews.clone();
        Some(Message::ConfigApply { overviews, version })
    }
}
