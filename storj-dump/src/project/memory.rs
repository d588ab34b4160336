//! In-memory satellite and storage backend.

use super::{authorize, check_bucket_name, check_object_key, project_salt};
use crate::access::{ApiKey, Operation};
use crate::error::Network;
use crate::{crypto, Bucket, Error, Result};

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A satellite that keeps projects, buckets and objects in memory.
///
/// Clones share the same state, so a test can keep a clone for inspecting what the code under
/// test did through another one.
#[derive(Debug, Clone)]
pub struct MemorySatellite {
    address: String,
    state: Arc<Mutex<State>>,
}

/// Counters of the operations that a [`MemorySatellite`] has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    /// Opened project sessions.
    pub open_project: usize,
    /// Project sessions currently open.
    pub open_sessions: usize,
    /// Bucket stats.
    pub stat_bucket: usize,
    /// Bucket creations, including the ones of buckets that already existed.
    pub create_bucket: usize,
    /// Started uploads.
    pub upload_object: usize,
    /// Started downloads.
    pub download_object: usize,
}

/// Failures that a [`MemorySatellite`] can simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Creating a bucket reports success but the bucket isn't created.
    LoseCreatedBuckets,
    /// Creating a bucket fails with an internal error.
    CreateBucket,
    /// Getting the project salt fails with an internal error.
    Salt,
    /// Writing to an upload fails once the upload holds more than the given number of bytes.
    WriteAfter(usize),
}

#[derive(Debug, Default)]
struct State {
    projects: HashMap<Vec<u8>, ProjectState>,
    faults: Vec<Fault>,
    calls: Calls,
}

#[derive(Debug)]
struct ProjectState {
    secret: [u8; crypto::KEY_LEN],
    buckets: BTreeMap<String, BucketState>,
}

#[derive(Debug)]
struct BucketState {
    info: Bucket,
    objects: BTreeMap<String, Vec<u8>>,
}

impl MemorySatellite {
    /// Creates a satellite without projects listening on `address`.
    pub fn new(address: &str) -> Self {
        Self {
            address: String::from(address),
            state: Arc::default(),
        }
    }

    /// Creates a new project and returns its root API key.
    pub fn register_project(&self) -> Result<ApiKey> {
        let head = crypto::random_bytes::<16>()?;
        let secret = crypto::random_bytes::<{ crypto::KEY_LEN }>()?;

        self.lock().projects.insert(
            head.to_vec(),
            ProjectState {
                secret,
                buckets: BTreeMap::new(),
            },
        );

        Ok(ApiKey::new_root(&head, &secret))
    }

    /// Simulates `fault` in all the following operations.
    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    /// Returns the counters of the served operations.
    pub fn calls(&self) -> Calls {
        self.lock().calls
    }

    /// Returns `true` if any project has a bucket named `bucket`.
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.lock()
            .projects
            .values()
            .any(|p| p.buckets.contains_key(bucket))
    }

    /// Returns the stored data of an object, bypassing any permission check.
    ///
    /// The data is what the uploads wrote, i.e. sealed frames for objects uploaded by this crate.
    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .projects
            .values()
            .filter_map(|p| p.buckets.get(bucket))
            .find_map(|b| b.objects.get(key).cloned())
    }

    /// Returns the keys of the objects stored in `bucket`, bypassing any permission check.
    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .projects
            .values()
            .filter_map(|p| p.buckets.get(bucket))
            .flat_map(|b| b.objects.keys().cloned())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

impl super::Satellite for MemorySatellite {
    type Project = MemoryProject;

    fn open_project(&self, address: &str, api_key: &ApiKey) -> Result<MemoryProject> {
        if address != self.address {
            return Err(Network::Unauthenticated(format!(
                "satellite {} doesn't serve the address {}",
                self.address, address
            ))
            .into());
        }

        let mut state = self.lock();
        let verified = state
            .projects
            .get(api_key.head())
            .is_some_and(|p| api_key.verify(&p.secret));
        if !verified {
            return Err(Network::Unauthenticated(String::from(
                "the API key isn't valid for any project",
            ))
            .into());
        }

        state.calls.open_project += 1;
        state.calls.open_sessions += 1;

        Ok(MemoryProject {
            state: Arc::clone(&self.state),
            api_key: api_key.clone(),
        })
    }
}

/// A project session of a [`MemorySatellite`].
#[derive(Debug)]
pub struct MemoryProject {
    state: Arc<Mutex<State>>,
    api_key: ApiKey,
}

impl MemoryProject {
    fn with_project<T>(
        &self,
        f: impl FnOnce(&mut ProjectState, &mut State) -> Result<T>,
    ) -> Result<T> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let mut projects = std::mem::take(&mut state.projects);
        let res = match projects.get_mut(self.api_key.head()) {
            Some(project) => f(project, state),
            None => Err(Network::Unauthenticated(String::from("the project doesn't exist")).into()),
        };
        state.projects = projects;
        res
    }
}

impl super::Project for MemoryProject {
    type Upload = MemoryUpload;
    type Download = io::Cursor<Vec<u8>>;

    fn salt(&self) -> Result<Vec<u8>> {
        if lock(&self.state).faults.contains(&Fault::Salt) {
            return Err(Network::Internal(String::from("salt unavailable")).into());
        }

        Ok(project_salt(self.api_key.head()))
    }

    fn stat_bucket(&self, bucket: &str) -> Result<Bucket> {
        check_bucket_name(bucket)?;
        authorize(&self.api_key, Operation::Stat, bucket, "")?;

        self.with_project(|project, state| {
            state.calls.stat_bucket += 1;
            project
                .buckets
                .get(bucket)
                .map(|b| b.info.clone())
                .ok_or_else(|| Network::BucketNotFound(String::from(bucket)).into())
        })
    }

    fn create_bucket(&self, bucket: &str) -> Result<(Bucket, bool)> {
        check_bucket_name(bucket)?;
        authorize(&self.api_key, Operation::Write, bucket, "")?;

        self.with_project(|project, state| {
            state.calls.create_bucket += 1;

            if state.faults.contains(&Fault::CreateBucket) {
                return Err(Network::Internal(format!("cannot create bucket {}", bucket)).into());
            }

            if let Some(existing) = project.buckets.get(bucket) {
                return Ok((existing.info.clone(), false));
            }

            let info = Bucket::created_now(bucket);
            if !state.faults.contains(&Fault::LoseCreatedBuckets) {
                project.buckets.insert(
                    String::from(bucket),
                    BucketState {
                        info: info.clone(),
                        objects: BTreeMap::new(),
                    },
                );
            }

            Ok((info, true))
        })
    }

    fn upload_object(&self, bucket: &str, key: &str) -> Result<MemoryUpload> {
        check_bucket_name(bucket)?;
        check_object_key(key)?;
        authorize(&self.api_key, Operation::Write, bucket, key)?;

        self.with_project(|project, state| {
            state.calls.upload_object += 1;
            if !project.buckets.contains_key(bucket) {
                return Err(Network::BucketNotFound(String::from(bucket)).into());
            }

            let write_limit = state.faults.iter().find_map(|f| match f {
                Fault::WriteAfter(n) => Some(*n),
                _ => None,
            });

            Ok(MemoryUpload {
                state: Arc::clone(&self.state),
                head: self.api_key.head().to_vec(),
                bucket: String::from(bucket),
                key: String::from(key),
                data: Vec::new(),
                write_limit,
                committed: false,
            })
        })
    }

    fn download_object(&self, bucket: &str, key: &str) -> Result<io::Cursor<Vec<u8>>> {
        check_bucket_name(bucket)?;
        check_object_key(key)?;
        authorize(&self.api_key, Operation::Read, bucket, key)?;

        self.with_project(|project, state| {
            state.calls.download_object += 1;
            let bucket_state = project
                .buckets
                .get(bucket)
                .ok_or_else(|| Error::from(Network::BucketNotFound(String::from(bucket))))?;
            let data = bucket_state
                .objects
                .get(key)
                .ok_or_else(|| Error::from(Network::ObjectNotFound(String::from(key))))?;

            Ok(io::Cursor::new(data.clone()))
        })
    }
}

impl Drop for MemoryProject {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.calls.open_sessions = state.calls.open_sessions.saturating_sub(1);
    }
}

/// An upload to a [`MemoryProject`]. The data is buffered until it's committed.
#[derive(Debug)]
pub struct MemoryUpload {
    state: Arc<Mutex<State>>,
    head: Vec<u8>,
    bucket: String,
    key: String,
    data: Vec<u8>,
    write_limit: Option<usize>,
    committed: bool,
}

impl io::Write for MemoryUpload {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.committed {
            return Err(Error::from(Network::UploadDone(self.key.clone())).into_io());
        }

        if let Some(limit) = self.write_limit {
            if self.data.len() + buf.len() > limit {
                return Err(
                    Error::from(Network::Internal(String::from("connection lost"))).into_io(),
                );
            }
        }

        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl super::Upload for MemoryUpload {
    fn commit(&mut self) -> Result<()> {
        if self.committed {
            return Err(Network::UploadDone(self.key.clone()).into());
        }

        let mut state = lock(&self.state);
        let bucket = state
            .projects
            .get_mut(&self.head)
            .and_then(|p| p.buckets.get_mut(&self.bucket))
            .ok_or_else(|| Error::from(Network::BucketNotFound(self.bucket.clone())))?;

        bucket
            .objects
            .insert(self.key.clone(), std::mem::take(&mut self.data));
        self.committed = true;
        Ok(())
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
