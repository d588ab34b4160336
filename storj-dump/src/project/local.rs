//! Satellite and storage backend on a local directory.
//!
//! Layout of the directory:
//!
//! ```text
//! <root>/satellite.json                            address and registered projects
//! <root>/projects/<id>/buckets/<bucket>/<key>      committed objects
//! <root>/projects/<id>/staging/                    uploads in progress
//! ```

use super::{authorize, check_bucket_name, check_object_key, project_salt};
use crate::access::{ApiKey, Operation};
use crate::error::Network;
use crate::{crypto, Bucket, Error, Result};

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use log::debug;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

const MANIFEST_FILE: &str = "satellite.json";

/// A satellite whose projects, buckets and objects live in a local directory.
#[derive(Debug, Clone)]
pub struct LocalSatellite {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    address: String,
    projects: Vec<ProjectEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectEntry {
    /// Hex encoded API key head.
    id: String,
    /// Hex encoded root secret.
    secret: String,
}

impl LocalSatellite {
    /// Initializes `root` as the directory of a satellite served at `address`.
    ///
    /// It returns a [`Config` error](Error::Config) if the directory is already initialized.
    pub fn init(root: impl AsRef<Path>, address: &str) -> Result<Self> {
        let root = root.as_ref();
        if address.is_empty() {
            return Err(Error::new_invalid_arguments("address", "cannot be empty"));
        }

        if root.join(MANIFEST_FILE).exists() {
            return Err(Error::Config(format!(
                "{} is already a satellite directory",
                root.display()
            )));
        }

        fs::create_dir_all(root).map_err(|e| io_error("creating satellite directory", e))?;
        let satellite = Self {
            root: root.to_path_buf(),
        };
        satellite.save_manifest(&Manifest {
            address: String::from(address),
            projects: Vec::new(),
        })?;

        debug!("Initialized satellite {} in {}", address, root.display());
        Ok(satellite)
    }

    /// Opens the satellite directory `root` previously initialized by [`Self::init`].
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let satellite = Self {
            root: root.as_ref().to_path_buf(),
        };
        satellite.load_manifest()?;
        Ok(satellite)
    }

    /// Returns the address that the satellite serves.
    pub fn address(&self) -> Result<String> {
        Ok(self.load_manifest()?.address)
    }

    /// Creates a new project and returns its root API key.
    pub fn register_project(&self) -> Result<ApiKey> {
        let head = crypto::random_bytes::<16>()?;
        let secret = crypto::random_bytes::<{ crypto::KEY_LEN }>()?;

        let mut manifest = self.load_manifest()?;
        manifest.projects.push(ProjectEntry {
            id: hex::encode(head),
            secret: hex::encode(secret),
        });
        self.save_manifest(&manifest)?;

        fs::create_dir_all(self.project_dir(&head).join("buckets"))
            .map_err(|e| io_error("creating project directory", e))?;

        Ok(ApiKey::new_root(&head, &secret))
    }

    fn project_dir(&self, head: &[u8]) -> PathBuf {
        self.root.join("projects").join(hex::encode(head))
    }

    fn load_manifest(&self) -> Result<Manifest> {
        let path = self.root.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!(
                "{} isn't a satellite directory: {}",
                self.root.display(),
                e
            ))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))
    }

    fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        let content = serde_json::to_string_pretty(manifest)
            .map_err(|e| Error::new_internal("encoding satellite manifest", e.into()))?;

        let mut file = NamedTempFile::new_in(&self.root)
            .map_err(|e| io_error("creating satellite manifest", e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| io_error("writing satellite manifest", e))?;
        file.persist(self.root.join(MANIFEST_FILE))
            .map_err(|e| io_error("writing satellite manifest", e.error))?;
        Ok(())
    }
}

impl super::Satellite for LocalSatellite {
    type Project = LocalProject;

    fn open_project(&self, address: &str, api_key: &ApiKey) -> Result<LocalProject> {
        let manifest = self.load_manifest()?;
        if address != manifest.address {
            return Err(Network::Unauthenticated(format!(
                "satellite {} doesn't serve the address {}",
                manifest.address, address
            ))
            .into());
        }

        let id = hex::encode(api_key.head());
        let verified = manifest
            .projects
            .iter()
            .filter(|p| p.id == id)
            .filter_map(|p| hex::decode(&p.secret).ok())
            .any(|secret| api_key.verify(&secret));
        if !verified {
            return Err(Network::Unauthenticated(String::from(
                "the API key isn't valid for any project",
            ))
            .into());
        }

        Ok(LocalProject {
            dir: self.project_dir(api_key.head()),
            api_key: api_key.clone(),
        })
    }
}

/// A project session of a [`LocalSatellite`].
#[derive(Debug)]
pub struct LocalProject {
    dir: PathBuf,
    api_key: ApiKey,
}

impl LocalProject {
    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.dir.join("buckets").join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        key.split('/')
            .fold(self.bucket_dir(bucket), |path, component| path.join(component))
    }

    fn bucket_info(&self, bucket: &str) -> Result<Bucket> {
        let metadata = match fs::metadata(self.bucket_dir(bucket)) {
            Ok(m) if m.is_dir() => m,
            Ok(_) => return Err(Network::BucketNotFound(String::from(bucket)).into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Network::BucketNotFound(String::from(bucket)).into())
            }
            Err(e) => return Err(io_error("reading bucket", e)),
        };

        let created_at = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| Duration::from_secs(d.as_secs()))
            .unwrap_or_default();

        Ok(Bucket {
            name: String::from(bucket),
            created_at,
        })
    }
}

impl super::Project for LocalProject {
    type Upload = LocalUpload;
    type Download = fs::File;

    fn salt(&self) -> Result<Vec<u8>> {
        Ok(project_salt(self.api_key.head()))
    }

    fn stat_bucket(&self, bucket: &str) -> Result<Bucket> {
        check_bucket_name(bucket)?;
        authorize(&self.api_key, Operation::Stat, bucket, "")?;
        self.bucket_info(bucket)
    }

    fn create_bucket(&self, bucket: &str) -> Result<(Bucket, bool)> {
        check_bucket_name(bucket)?;
        authorize(&self.api_key, Operation::Write, bucket, "")?;

        match self.bucket_info(bucket) {
            Ok(info) => return Ok((info, false)),
            Err(e) if e.is_bucket_not_found() => {}
            Err(e) => return Err(e),
        }

        fs::create_dir_all(self.bucket_dir(bucket)).map_err(|e| io_error("creating bucket", e))?;
        Ok((self.bucket_info(bucket)?, true))
    }

    fn upload_object(&self, bucket: &str, key: &str) -> Result<LocalUpload> {
        check_bucket_name(bucket)?;
        check_object_key(key)?;
        authorize(&self.api_key, Operation::Write, bucket, key)?;
        self.bucket_info(bucket)?;

        let staging = self.dir.join("staging");
        fs::create_dir_all(&staging).map_err(|e| io_error("creating staging directory", e))?;
        let file =
            NamedTempFile::new_in(&staging).map_err(|e| io_error("creating staging file", e))?;

        Ok(LocalUpload {
            file: Some(file),
            target: self.object_path(bucket, key),
            key: String::from(key),
        })
    }

    fn download_object(&self, bucket: &str, key: &str) -> Result<fs::File> {
        check_bucket_name(bucket)?;
        check_object_key(key)?;
        authorize(&self.api_key, Operation::Read, bucket, key)?;
        self.bucket_info(bucket)?;

        fs::File::open(self.object_path(bucket, key)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Network::ObjectNotFound(String::from(key)).into()
            } else {
                io_error("opening object", e)
            }
        })
    }
}

/// An upload to a [`LocalProject`].
///
/// The data is written to a staging file which is moved to the object's path on commit and
/// removed if the upload drops before.
#[derive(Debug)]
pub struct LocalUpload {
    file: Option<NamedTempFile>,
    target: PathBuf,
    key: String,
}

impl io::Write for LocalUpload {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(Error::from(Network::UploadDone(self.key.clone())).into_io()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl super::Upload for LocalUpload {
    fn commit(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Err(Network::UploadDone(self.key.clone()).into());
        };

        file.flush().map_err(|e| io_error("flushing upload", e))?;
        if let Some(parent) = self.target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error("creating object directory", e))?;
        }
        file.persist(&self.target)
            .map_err(|e| io_error("committing upload", e.error))?;
        Ok(())
    }
}

fn io_error(ctx: &str, err: io::Error) -> Error {
    Network::Internal(format!("{}: {}", ctx, err)).into()
}
