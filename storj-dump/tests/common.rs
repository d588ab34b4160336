#![allow(dead_code)]

use storj_dump::project::memory::MemorySatellite;
use storj_dump::source::{ByteSource, Chunk};

use std::collections::VecDeque;
use std::io;

use chrono::{NaiveDate, NaiveDateTime};
use rand::RngCore;

pub const SATELLITE: &str = "us1.storj.test:7777";
pub const PASSPHRASE: &str = "you'll never guess this";

/// A memory satellite with a registered project.
pub struct Environment {
    pub satellite: MemorySatellite,
    pub api_key: String,
}

impl Environment {
    pub fn new() -> Self {
        let satellite = MemorySatellite::new(SATELLITE);
        let api_key = satellite
            .register_project()
            .expect("register project")
            .serialize()
            .expect("serialize API key");

        Self { satellite, api_key }
    }
}

/// The timestamp 2024-01-02 03:04:05.
pub fn timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .and_then(|d| d.and_hms_opt(3, 4, 5))
        .expect("valid timestamp")
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::rng().fill_bytes(&mut data);
    data
}

/// A source that yields a fixed list of chunks, each one in a single read and reporting pending
/// data, and then reports exhaustion with an empty chunk.
///
/// It panics if it's read after reporting exhaustion.
pub struct ScriptedSource {
    chunks: VecDeque<Vec<u8>>,
    last_carries_exhaustion: bool,
    exhausted: bool,
    pub reads: usize,
}

impl ScriptedSource {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            last_carries_exhaustion: false,
            exhausted: false,
            reads: 0,
        }
    }

    /// Reports exhaustion with the last chunk instead of with an additional empty one.
    pub fn exhausting_with_last_chunk(mut self) -> Self {
        self.last_carries_exhaustion = true;
        self
    }
}

impl ByteSource for ScriptedSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Chunk> {
        assert!(!self.exhausted, "source read after exhaustion");
        self.reads += 1;

        let Some(chunk) = self.chunks.pop_front() else {
            self.exhausted = true;
            return Ok(Chunk::last(0));
        };

        buf[..chunk.len()].copy_from_slice(&chunk);
        if self.last_carries_exhaustion && self.chunks.is_empty() {
            self.exhausted = true;
            return Ok(Chunk::last(chunk.len()));
        }

        Ok(Chunk::pending(chunk.len()))
    }
}

/// A source that never reports exhaustion: it yields short chunks until it's read `cap` times
/// and then fails.
pub struct EndlessSource {
    cap: usize,
    pub reads: usize,
}

impl EndlessSource {
    pub fn new(cap: usize) -> Self {
        Self { cap, reads: 0 }
    }
}

impl ByteSource for EndlessSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Chunk> {
        if self.reads >= self.cap {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "read cap reached without exhaustion",
            ));
        }

        self.reads += 1;
        buf[0] = b'x';
        Ok(Chunk::pending(1))
    }
}
