use storj_dump::config::StorjConfig;
use storj_dump::object::verify;
use storj_dump::pipeline::Options;
use storj_dump::project::memory::MemorySatellite;
use storj_dump::{Error, Pipeline, PipelineError, Scope, ScopeFactory};

mod common;

const KEY: &str = "uploads/testdb/mysqldump_2024-01-02_03:04:05.sql";

fn derive_config(env: &common::Environment) -> StorjConfig {
    StorjConfig {
        api_key: env.api_key.clone(),
        satellite: String::from(common::SATELLITE),
        bucket: String::from("backups"),
        upload_path: String::from("uploads"),
        encryption_passphrase: String::from(common::PASSPHRASE),
        disallow_writes: true,
        disallow_deletes: true,
        ..StorjConfig::default()
    }
}

fn pipeline(env: &common::Environment, options: Options) -> Pipeline<MemorySatellite> {
    Pipeline::new(env.satellite.clone(), options).with_clock(common::timestamp)
}

#[test]
fn integration_fresh_scope_returns_the_full_token() {
    let env = common::Environment::new();
    let outcome = pipeline(&env, Options::default())
        .run(
            &derive_config(&env),
            common::ScriptedSource::new(vec![b"CREATE TABLE".to_vec()]),
            "testdb",
            false,
        )
        .expect("run");

    assert_eq!(outcome.upload.key, KEY, "object key");
    assert!(outcome.verification.is_none(), "verification");

    let token = outcome.token.expect("token of a fresh scope");
    let scope = Scope::parse(&token).expect("parse token");
    assert!(scope.api_key().caveats().is_empty(), "full scope caveats");
    assert!(
        scope.encryption_access().has_default_key(),
        "full scope encryption access"
    );

    let data = verify::read_back(&env.satellite, &scope, "backups", KEY).expect("read back");
    assert_eq!(data, b"CREATE TABLE");
}

#[test]
fn integration_fresh_scope_returns_the_restricted_token_on_request() {
    let env = common::Environment::new();
    let outcome = pipeline(&env, Options::default())
        .run(
            &derive_config(&env),
            common::ScriptedSource::new(vec![b"INSERT INTO".to_vec()]),
            "testdb",
            true,
        )
        .expect("run with a write restriction");

    // The transfer uses the full scope, so it succeeds although the restriction disallows writes.
    assert_eq!(outcome.upload.key, KEY, "object key");

    let restricted = Scope::parse(&outcome.token.expect("restricted token")).expect("parse");
    let caveats = restricted.api_key().caveats();
    assert_eq!(caveats.len(), 1, "caveats");
    assert!(caveats[0].disallow_writes, "disallow writes");
    assert!(caveats[0].disallow_deletes, "disallow deletes");
    assert!(!caveats[0].disallow_reads, "disallow reads");
    assert_eq!(caveats[0].bucket, "backups");
    assert_eq!(caveats[0].path_prefix, "uploads");

    let data =
        verify::read_back(&env.satellite, &restricted, "backups", KEY).expect("read back");
    assert_eq!(data, b"INSERT INTO");
}

#[test]
fn integration_serialized_scope_skips_the_derivation() {
    let env = common::Environment::new();
    let scope = ScopeFactory::new(&env.satellite)
        .derive(common::SATELLITE, &env.api_key, common::PASSPHRASE)
        .expect("derive scope");
    let config = StorjConfig {
        bucket: String::from("backups"),
        upload_path: String::from("uploads/"),
        serialized_scope: scope.serialize().expect("serialize scope"),
        ..StorjConfig::default()
    };
    let opened_before = env.satellite.calls().open_project;

    let outcome = pipeline(&env, Options::default())
        .run(
            &config,
            common::ScriptedSource::new(vec![b"a".to_vec(), b"b".to_vec()]),
            "testdb",
            false,
        )
        .expect("run with a serialized scope");

    assert!(outcome.token.is_none(), "no token when reusing");
    assert_eq!(outcome.upload.key, KEY, "object key");
    assert_eq!(
        env.satellite.calls().open_project - opened_before,
        1,
        "only the upload opens a project"
    );

    let data = verify::read_back(&env.satellite, &scope, "backups", KEY).expect("read back");
    assert_eq!(data, b"ab");
}

#[test]
fn integration_serialized_scope_restricted_on_request() {
    let env = common::Environment::new();
    let scope = ScopeFactory::new(&env.satellite)
        .derive(common::SATELLITE, &env.api_key, common::PASSPHRASE)
        .expect("derive scope");
    let config = StorjConfig {
        bucket: String::from("backups"),
        upload_path: String::from("uploads"),
        serialized_scope: scope.serialize().expect("serialize scope"),
        disallow_deletes: true,
        ..StorjConfig::default()
    };

    let outcome = pipeline(&env, Options::default())
        .run(
            &config,
            common::ScriptedSource::new(vec![b"data".to_vec()]),
            "testdb",
            true,
        )
        .expect("run");

    let restricted = Scope::parse(&outcome.token.expect("restricted token")).expect("parse");
    assert_eq!(restricted.api_key().caveats().len(), 1, "caveats");
    assert!(!restricted.encryption_access().has_default_key());
}

#[test]
fn integration_empty_upload_path_stores_at_the_bucket_root() {
    let env = common::Environment::new();
    let config = StorjConfig {
        upload_path: String::new(),
        ..derive_config(&env)
    };

    let outcome = pipeline(&env, Options::default())
        .run(
            &config,
            common::ScriptedSource::new(vec![b"data".to_vec()]),
            "testdb",
            false,
        )
        .expect("run");
    assert_eq!(outcome.upload.key, "testdb/mysqldump_2024-01-02_03:04:05.sql");
}

#[test]
fn integration_debug_mode_verifies_and_mirrors() {
    let env = common::Environment::new();
    let mirror = tempfile::tempdir().expect("temp dir");
    let options = Options {
        debug: true,
        mirror_dir: Some(mirror.path().to_path_buf()),
    };

    let data = common::random_bytes(2048);
    let outcome = pipeline(&env, options)
        .run(
            &derive_config(&env),
            common::ScriptedSource::new(vec![data.clone()]),
            "testdb",
            false,
        )
        .expect("run in debug mode");

    let verification = outcome.verification.expect("verification");
    let expected_path = mirror
        .path()
        .join("testdb")
        .join("mysqldump_2024-01-02_03_04_05.sql");
    assert_eq!(verification.bytes, data.len() as u64, "verified bytes");
    assert_eq!(verification.mirrored_to.as_ref(), Some(&expected_path));
    assert_eq!(
        std::fs::read(&expected_path).expect("read mirror"),
        data,
        "mirrored data"
    );
}

#[test]
fn integration_failed_verification_does_not_fail_the_run() {
    let env = common::Environment::new();
    let scope = ScopeFactory::new(&env.satellite)
        .derive(common::SATELLITE, &env.api_key, common::PASSPHRASE)
        .expect("derive scope");
    let restricted = ScopeFactory::new(&env.satellite)
        .restrict(
            &scope,
            &storj_dump::Caveat {
                disallow_reads: true,
                ..storj_dump::Caveat::for_path("backups", "uploads")
            },
        )
        .expect("restrict scope");
    let config = StorjConfig {
        bucket: String::from("backups"),
        upload_path: String::from("uploads"),
        serialized_scope: restricted.serialize().expect("serialize scope"),
        ..StorjConfig::default()
    };
    let mirror = tempfile::tempdir().expect("temp dir");
    let options = Options {
        debug: true,
        mirror_dir: Some(mirror.path().to_path_buf()),
    };

    let outcome = pipeline(&env, options)
        .run(
            &config,
            common::ScriptedSource::new(vec![b"data".to_vec()]),
            "testdb",
            false,
        )
        .expect("the upload succeeds");
    assert!(outcome.verification.is_none(), "verification");
    assert_eq!(outcome.upload.bytes, 4);

    // Nothing is left in the mirror directory.
    let leftovers: Vec<_> = std::fs::read_dir(mirror.path().join("testdb"))
        .expect("read mirror directory")
        .collect();
    assert!(leftovers.is_empty(), "mirror files: {:?}", leftovers);
}

#[test]
fn integration_errors_are_tagged_with_the_stage() {
    let env = common::Environment::new();

    let config = StorjConfig {
        api_key: String::from("not an API key"),
        ..derive_config(&env)
    };
    let err = pipeline(&env, Options::default())
        .run(
            &config,
            common::ScriptedSource::new(vec![]),
            "testdb",
            false,
        )
        .expect_err("invalid API key");
    assert!(
        matches!(err, PipelineError::Scope(Error::InvalidKeyFormat(_))),
        "{}",
        err
    );

    let config = StorjConfig {
        encryption_passphrase: String::new(),
        ..derive_config(&env)
    };
    let err = pipeline(&env, Options::default())
        .run(
            &config,
            common::ScriptedSource::new(vec![]),
            "testdb",
            false,
        )
        .expect_err("missing passphrase");
    assert!(matches!(err, PipelineError::Config(_)), "{}", err);

    let config = StorjConfig {
        satellite: String::from("eu1.storj.test:7777"),
        ..derive_config(&env)
    };
    let err = pipeline(&env, Options::default())
        .run(
            &config,
            common::ScriptedSource::new(vec![]),
            "testdb",
            false,
        )
        .expect_err("unknown satellite");
    assert!(
        matches!(err.kind(), Error::AuthenticationFailed(_)),
        "{}",
        err
    );

    let err = pipeline(&env, Options::default())
        .run(
            &derive_config(&env),
            common::EndlessSource::new(3),
            "testdb",
            false,
        )
        .expect_err("source failure");
    assert!(
        matches!(err, PipelineError::Upload(Error::SourceRead(_))),
        "{}",
        err
    );
}
