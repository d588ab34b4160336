use storj_dump::object::upload::{StreamingUploader, CHUNK_SIZE};
use storj_dump::object::verify;
use storj_dump::project::memory::Fault;
use storj_dump::source::ReaderSource;
use storj_dump::{Caveat, Error, Network, Scope, ScopeFactory};

mod common;

const KEY: &str = "uploads/testdb/mysqldump_2024-01-02_03:04:05.sql";

fn derive(env: &common::Environment) -> Scope {
    ScopeFactory::new(&env.satellite)
        .derive(common::SATELLITE, &env.api_key, common::PASSPHRASE)
        .expect("derive scope")
}

#[test]
fn integration_upload_writes_every_chunk_until_exhaustion() {
    let env = common::Environment::new();
    let scope = derive(&env);

    let (a, b, c) = (
        common::random_bytes(100),
        common::random_bytes(CHUNK_SIZE),
        common::random_bytes(7),
    );
    let mut source = common::ScriptedSource::new(vec![a.clone(), b.clone(), c.clone()]);

    let summary = StreamingUploader::new(&env.satellite)
        .upload(&scope, "backups", KEY, &mut source)
        .expect("upload");
    assert_eq!(summary.bucket, "backups");
    assert_eq!(summary.key, KEY);
    assert_eq!(summary.bytes, (a.len() + b.len() + c.len()) as u64, "bytes");
    assert_eq!(summary.chunks, 3, "chunks");
    assert_eq!(source.reads, 4, "reads including the exhaustion one");

    let data = verify::read_back(&env.satellite, &scope, "backups", KEY).expect("read back");
    assert_eq!(data, [a, b, c].concat(), "object data");
}

#[test]
fn integration_upload_with_exhaustion_in_the_last_chunk() {
    let env = common::Environment::new();
    let scope = derive(&env);

    let mut source =
        common::ScriptedSource::new(vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()])
            .exhausting_with_last_chunk();
    let summary = StreamingUploader::new(&env.satellite)
        .upload(&scope, "backups", KEY, &mut source)
        .expect("upload");

    assert_eq!(summary.chunks, 3, "chunks");
    assert_eq!(source.reads, 3, "reads");
    let data = verify::read_back(&env.satellite, &scope, "backups", KEY).expect("read back");
    assert_eq!(data, b"abbccc");
}

#[test]
fn integration_short_and_empty_pending_chunks_keep_the_upload_going() {
    let env = common::Environment::new();
    let scope = derive(&env);

    let chunks = vec![
        b"short".to_vec(),
        Vec::new(),
        b"x".to_vec(),
        Vec::new(),
        b"tail".to_vec(),
    ];
    let summary = StreamingUploader::new(&env.satellite)
        .upload(&scope, "backups", KEY, common::ScriptedSource::new(chunks))
        .expect("upload");

    assert_eq!(summary.chunks, 3, "non-empty chunks");
    assert_eq!(summary.bytes, 10, "bytes");
    let data = verify::read_back(&env.satellite, &scope, "backups", KEY).expect("read back");
    assert_eq!(data, b"shortxtail");
}

#[test]
fn integration_never_exhausted_source_ends_with_a_source_error() {
    let env = common::Environment::new();
    let scope = derive(&env);

    let mut source = common::EndlessSource::new(1000);
    let err = StreamingUploader::new(&env.satellite)
        .upload(&scope, "backups", KEY, &mut source)
        .expect_err("the source never reports exhaustion");

    match err {
        Error::SourceRead(ioerr) => {
            assert_eq!(ioerr.to_string(), "read cap reached without exhaustion")
        }
        err => panic!("expected a source read error, got {}", err),
    }
    assert_eq!(source.reads, 1000, "reads");
    assert!(
        env.satellite.object_data("backups", KEY).is_none(),
        "uncommitted object"
    );
    assert_eq!(env.satellite.calls().open_sessions, 0, "open sessions");
}

#[test]
fn integration_upload_of_a_large_reader() {
    let env = common::Environment::new();
    let scope = derive(&env);

    let data = common::random_bytes(3 * CHUNK_SIZE + 1000);
    let summary = StreamingUploader::new(&env.satellite)
        .upload(&scope, "backups", KEY, ReaderSource::new(data.as_slice()))
        .expect("upload");

    assert_eq!(summary.chunks, 4, "chunks");
    assert_eq!(summary.bytes, data.len() as u64, "bytes");
    let read = verify::read_back(&env.satellite, &scope, "backups", KEY).expect("read back");
    assert_eq!(read, data, "object data");
}

#[test]
fn integration_upload_of_an_empty_source() {
    let env = common::Environment::new();
    let scope = derive(&env);

    let summary = StreamingUploader::new(&env.satellite)
        .upload(&scope, "backups", KEY, ReaderSource::new(std::io::empty()))
        .expect("upload");

    assert_eq!((summary.bytes, summary.chunks), (0, 0));
    assert_eq!(
        env.satellite.object_data("backups", KEY),
        Some(Vec::new()),
        "empty object"
    );
}

#[test]
fn integration_missing_bucket_is_created_once() {
    let env = common::Environment::new();
    let scope = derive(&env);
    assert!(!env.satellite.has_bucket("backups"), "bucket before upload");

    StreamingUploader::new(&env.satellite)
        .upload(
            &scope,
            "backups",
            KEY,
            common::ScriptedSource::new(vec![b"data".to_vec()]),
        )
        .expect("upload");

    assert!(env.satellite.has_bucket("backups"), "bucket after upload");
    let calls = env.satellite.calls();
    assert_eq!(calls.create_bucket, 1, "create calls");
    assert_eq!(calls.stat_bucket, 2, "open calls");

    // A second upload finds the bucket.
    StreamingUploader::new(&env.satellite)
        .upload(
            &scope,
            "backups",
            "uploads/testdb/second.sql",
            common::ScriptedSource::new(vec![b"data".to_vec()]),
        )
        .expect("second upload");
    assert_eq!(env.satellite.calls().create_bucket, 1, "create calls");
}

#[test]
fn integration_bucket_unavailable_after_the_retry() {
    let env = common::Environment::new();
    let scope = derive(&env);
    env.satellite.inject_fault(Fault::LoseCreatedBuckets);

    let err = StreamingUploader::new(&env.satellite)
        .upload(
            &scope,
            "backups",
            KEY,
            common::ScriptedSource::new(vec![b"data".to_vec()]),
        )
        .expect_err("bucket never appears");

    match err {
        Error::BucketUnavailable { bucket, .. } => assert_eq!(bucket, "backups"),
        err => panic!("expected a bucket unavailable error, got {}", err),
    }
    let calls = env.satellite.calls();
    assert_eq!(calls.create_bucket, 1, "create calls");
    assert_eq!(calls.stat_bucket, 2, "open calls");
    assert_eq!(calls.upload_object, 0, "started uploads");
    assert_eq!(calls.open_sessions, 0, "open sessions");
}

#[test]
fn integration_write_failure_aborts_the_upload() {
    let env = common::Environment::new();
    let scope = derive(&env);
    env.satellite.inject_fault(Fault::WriteAfter(CHUNK_SIZE));

    let mut source = common::ScriptedSource::new(vec![
        common::random_bytes(CHUNK_SIZE / 2),
        common::random_bytes(CHUNK_SIZE / 2),
        common::random_bytes(CHUNK_SIZE / 2),
    ]);
    let err = StreamingUploader::new(&env.satellite)
        .upload(&scope, "backups", KEY, &mut source)
        .expect_err("write failure");

    match err {
        Error::Upload { key, .. } => assert_eq!(key, KEY),
        err => panic!("expected an upload error, got {}", err),
    }
    assert_eq!(source.reads, 2, "reads before the failure");
    assert!(
        env.satellite.object_data("backups", KEY).is_none(),
        "partial object"
    );
}

#[test]
fn integration_upload_outside_of_the_restricted_path() {
    let env = common::Environment::new();
    let factory = ScopeFactory::new(&env.satellite);
    let scope = factory
        .restrict(&derive(&env), &Caveat::for_path("backups", "uploads/"))
        .expect("restrict scope");

    let err = StreamingUploader::new(&env.satellite)
        .upload(
            &scope,
            "backups",
            "private/dump.sql",
            common::ScriptedSource::new(vec![b"data".to_vec()]),
        )
        .expect_err("path not covered by the scope");
    assert!(matches!(err, Error::Upload { .. }), "{}", err);
    assert_eq!(
        env.satellite.calls().open_project,
        1,
        "only the derivation opened a project"
    );
}

#[test]
fn integration_invalid_key_is_rejected_before_touching_the_bucket() {
    let env = common::Environment::new();
    let scope = derive(&env);
    let opened_before = env.satellite.calls().open_project;

    for key in ["/", "uploads/testdb/", "uploads/../dump.sql"] {
        let err = StreamingUploader::new(&env.satellite)
            .upload(
                &scope,
                "backups",
                key,
                common::ScriptedSource::new(vec![b"data".to_vec()]),
            )
            .expect_err(key);
        match err {
            Error::Upload { key: failed, cause } => {
                assert_eq!(failed, key);
                assert!(
                    matches!(
                        cause.downcast_ref::<Error>(),
                        Some(Error::Network(Network::ObjectKeyInvalid(_)))
                    ),
                    "{}",
                    cause
                );
            }
            err => panic!("expected an upload error, got {}", err),
        }
    }

    assert!(!env.satellite.has_bucket("backups"), "bucket created");
    let calls = env.satellite.calls();
    assert_eq!(calls.open_project, opened_before, "opened projects");
    assert_eq!(calls.create_bucket, 0, "create calls");
}
