use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Permissions given to every file sent to agents.
pub const FILE_MODE: &str = "0644";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub hash: String,
    pub permissions: String,
    pub size: i64,
}

/// A configuration file along with its contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct File {
    pub meta: FileMeta,
    pub contents: Bytes,
}

/// Describes a file without its contents. Unmanaged files are never written
/// by the agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileOverview {
    pub meta: FileMeta,
    pub unmanaged: bool,
}

/// An API call issued to the proxy outside of the configuration file apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiAction {
    UpdateHttpUpstreamServers {
        upstream: String,
        servers: Vec<UpstreamServer>,
    },
    UpdateStreamServers {
        upstream: String,
        servers: Vec<UpstreamServer>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamServer {
    pub address: String,
}

// === impl FileMeta ===

impl FileMeta {
    pub fn for_contents(name: impl ToString, contents: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            hash: hash(contents),
            permissions: FILE_MODE.to_string(),
            size: contents.len() as i64,
        }
    }
}

// === impl File ===

impl File {
    pub fn new(name: impl ToString, contents: impl Into<Bytes>) -> Self {
        let contents = contents.into();
        Self {
            meta: FileMeta::for_contents(name, &contents),
            contents,
        }
    }
}

// === impl FileOverview ===

impl FileOverview {
    pub fn managed(meta: FileMeta) -> Self {
        Self {
            meta,
            unmanaged: false,
        }
    }

    pub fn unmanaged(name: impl ToString) -> Self {
        Self {
            meta: FileMeta {
                name: name.to_string(),
                permissions: FILE_MODE.to_string(),
                ..Default::default()
            },
            unmanaged: true,
        }
    }
}

/// Computes the version of a configuration from its overview.
///
/// The version covers each file's name, content hash and management flag, in
/// order.
pub fn config_version(overviews: &[FileOverview]) -> String {
    let mut hasher = Sha256::new();
    for FileOverview { meta, unmanaged } in overviews {
        hasher.update(meta.name.as_bytes());
        hasher.update([0]);
        hasher.update(meta.hash.as_bytes());
        hasher.update([0, *unmanaged as u8, b'\n']);
    }
    hex::encode(hasher.finalize())
}

fn hash(contents: &[u8]) -> String {
    hex::encode(Sha256::digest(contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_tracks_content() {
        let a = vec![FileOverview::managed(FileMeta::for_contents("/etc/nginx/a.conf", b"a"))];
        let b = vec![FileOverview::managed(FileMeta::for_contents("/etc/nginx/a.conf", b"b"))];
        assert_eq!(config_version(&a), config_version(&a.clone()));
        assert_ne!(config_version(&a), config_version(&b));

        let mut c = a.clone();
        c.push(FileOverview::unmanaged("/etc/nginx/mime.types"));
        assert_ne!(config_version(&a), config_version(&c));
    }

    #[test]
    fn file_meta() {
        let file = File::new("/etc/nginx/conf.d/http.conf", "server {}");
        assert_eq!(file.meta.size, 9);
        assert_eq!(file.meta.permissions, FILE_MODE);
        assert_eq!(file.meta.hash.len(), 64);
    }
}
