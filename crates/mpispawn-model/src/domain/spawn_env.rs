use serde::{Deserialize, Serialize};

/// Single environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    key: String,
    value: String,
}

impl KeyValue {
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Environment handed to every process of a spawned group.
///
/// Stored as an ordered list and serialized as a transparent array wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnEnv(pub Vec<KeyValue>);

impl SpawnEnv {
    pub const UNIVERSE_SIZE: &'static str = "MPISPAWN_UNIVERSE_SIZE";
    pub const WORLD_SIZE: &'static str = "MPISPAWN_WORLD_SIZE";
    pub const NUM_JOBS: &'static str = "MPISPAWN_NUM_JOBS";
    pub const JOB_ID: &'static str = "MPISPAWN_JOB_ID";
    pub const RANK: &'static str = "MPISPAWN_RANK";

    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Group-wide variables for task `job_id` of `num_jobs`.
    pub fn for_group(
        universe_size: usize,
        world_size: usize,
        num_jobs: usize,
        job_id: usize,
    ) -> Self {
        let mut env = Self::new();
        env.push(Self::UNIVERSE_SIZE, universe_size.to_string());
        env.push(Self::WORLD_SIZE, world_size.to_string());
        env.push(Self::NUM_JOBS, num_jobs.to_string());
        env.push(Self::JOB_ID, job_id.to_string());
        env
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Get the value for a key, returning the last matching entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    /// Append a key–value pair. Later entries override earlier ones in [`SpawnEnv::get`].
    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    /// Copy of `self` with the rank of one process appended.
    pub fn with_rank(&self, rank: usize) -> SpawnEnv {
        let mut out = self.clone();
        out.push(Self::RANK, rank.to_string());
        out
    }
}
