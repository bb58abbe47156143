//! Configuration of a workload.
//!
//! A [`Configuration`] consists of the parameters that drive the [`WorkloadEngine`] (thread count
//! and operation mix) and a set of [`Tuning`] parameters describing a hypothetical storage engine.
//! The tuning parameters do not influence the workload. They are carried along for external
//! reporting, see [`Configuration::export`].
//!
//! [`WorkloadEngine`]: crate::WorkloadEngine

use std::fmt;

use serde::Serialize;
use serde::ser::SerializeMap;

use crate::error::{Error, Result};

/// Absolute tolerance when checking that the operation ratios sum to `1.0`.
const RATIO_TOLERANCE: f64 = 1e-6;

/// Validated, immutable workload configuration.
///
/// Construct with [`Configuration::defaults`] and check with [`Configuration::validate`] before
/// handing it to the engine. Once constructed, the configuration is shared read-only, usually
/// behind an `Arc`.
#[derive(Clone, Debug)]
pub struct Configuration {
    threads: usize,
    target_keys: u64,
    read_ratio: f64,
    write_ratio: f64,
    delete_ratio: f64,
    tuning: Tuning,
}

impl Configuration {
    /// Creates a configuration with explicit tuning parameters.
    pub fn new(
        threads: usize,
        target_keys: u64,
        read_ratio: f64,
        write_ratio: f64,
        delete_ratio: f64,
        tuning: Tuning,
    ) -> Self {
        Self {
            threads,
            target_keys,
            read_ratio,
            write_ratio,
            delete_ratio,
            tuning,
        }
    }

    /// Creates a configuration with the default set of [`Tuning`] parameters.
    pub fn defaults(
        threads: usize,
        target_keys: u64,
        read_ratio: f64,
        write_ratio: f64,
        delete_ratio: f64,
    ) -> Self {
        let tuning = Tuning::defaults(threads);
        Self::new(
            threads,
            target_keys,
            read_ratio,
            write_ratio,
            delete_ratio,
            tuning,
        )
    }

    /// Checks that the read, write and delete ratios sum to `1.0`.
    ///
    /// The ratios are never corrected silently. A mix that is off by more than `1e-6` is rejected
    /// with [`Error::InvalidConfiguration`].
    pub fn validate(&self) -> Result<()> {
        let sum = self.read_ratio + self.write_ratio + self.delete_ratio;
        // Written as a negation so that NaN ratios are rejected as well.
        if !((sum - 1.0).abs() <= RATIO_TOLERANCE) {
            return Err(Error::InvalidConfiguration { sum });
        }

        Ok(())
    }

    /// The number of worker threads the engine spawns.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// The advisory number of keys the workload aims for.
    pub fn target_keys(&self) -> u64 {
        self.target_keys
    }

    /// The share of read operations.
    pub fn read_ratio(&self) -> f64 {
        self.read_ratio
    }

    /// The share of write operations.
    pub fn write_ratio(&self) -> f64 {
        self.write_ratio
    }

    /// The share of delete operations.
    pub fn delete_ratio(&self) -> f64 {
        self.delete_ratio
    }

    /// The pass-through storage engine tuning parameters.
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Exports all tuning parameters in their stable reporting order.
    pub fn export(&self) -> TuningTable<TuningValue> {
        TuningTable(
            TuningParameter::ALL
                .iter()
                .map(|&param| (param, self.tuning.value(param)))
                .collect(),
        )
    }
}

/// Sizing and threading parameters of a hypothetical storage engine.
///
/// None of these affect the workload. See [`TuningParameter`] for descriptions of each field.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub struct Tuning {
    pub max_number_of_keys_in_segment_cache: i64,
    pub max_number_of_keys_in_segment_write_cache: i64,
    pub max_number_of_keys_in_segment_write_cache_during_maintenance: i64,
    pub max_number_of_keys_in_segment_chunk: i64,
    pub max_number_of_delta_cache_files: i64,
    pub max_number_of_keys_in_segment: i64,
    pub max_number_of_segments_in_cache: i64,
    pub bloom_filter_number_of_hash_functions: i64,
    pub bloom_filter_index_size_in_bytes: i64,
    pub bloom_filter_probability_of_false_positive: f64,
    pub disk_io_buffer_size_in_bytes: i64,
    pub index_worker_thread_count: i64,
    pub number_of_io_threads: i64,
    pub number_of_segment_index_maintenance_threads: i64,
    pub number_of_index_maintenance_threads: i64,
    pub number_of_registry_lifecycle_threads: i64,
    pub index_busy_backoff_millis: i64,
    pub index_busy_timeout_millis: i64,
    pub segment_maintenance_auto_enabled: bool,
    pub index_name: String,
    pub key_class: String,
    pub value_class: String,
    pub key_type_descriptor: String,
    pub value_type_descriptor: String,
    pub context_logging_enabled: bool,
}

impl Tuning {
    /// Returns the default tuning for a workload running `threads` workers.
    pub fn defaults(threads: usize) -> Self {
        Self {
            max_number_of_keys_in_segment_cache: 500_000,
            max_number_of_keys_in_segment_write_cache: 250_000,
            max_number_of_keys_in_segment_write_cache_during_maintenance: 100_000,
            max_number_of_keys_in_segment_chunk: 50_000,
            max_number_of_delta_cache_files: 128,
            max_number_of_keys_in_segment: 1_000_000,
            max_number_of_segments_in_cache: 16,
            bloom_filter_number_of_hash_functions: 7,
            bloom_filter_index_size_in_bytes: 128 * 1024 * 1024,
            bloom_filter_probability_of_false_positive: 0.01,
            disk_io_buffer_size_in_bytes: 1024 * 1024,
            index_worker_thread_count: threads.max(2) as i64,
            number_of_io_threads: 4,
            number_of_segment_index_maintenance_threads: 2,
            number_of_index_maintenance_threads: 2,
            number_of_registry_lifecycle_threads: 2,
            index_busy_backoff_millis: 10,
            index_busy_timeout_millis: 500,
            segment_maintenance_auto_enabled: true,
            index_name: "storesim-index".to_owned(),
            key_class: "u64".to_owned(),
            value_class: "bytes".to_owned(),
            key_type_descriptor: "LONG".to_owned(),
            value_type_descriptor: "BINARY".to_owned(),
            context_logging_enabled: false,
        }
    }

    /// Returns the value of a single parameter.
    pub fn value(&self, param: TuningParameter) -> TuningValue {
        use TuningParameter as P;
        use TuningValue as V;

        match param {
            P::MaxNumberOfKeysInSegmentCache => V::Integer(self.max_number_of_keys_in_segment_cache),
            P::MaxNumberOfKeysInSegmentWriteCache => {
                V::Integer(self.max_number_of_keys_in_segment_write_cache)
            }
            P::MaxNumberOfKeysInSegmentWriteCacheDuringMaintenance => {
                V::Integer(self.max_number_of_keys_in_segment_write_cache_during_maintenance)
            }
            P::MaxNumberOfKeysInSegmentChunk => V::Integer(self.max_number_of_keys_in_segment_chunk),
            P::MaxNumberOfDeltaCacheFiles => V::Integer(self.max_number_of_delta_cache_files),
            P::MaxNumberOfKeysInSegment => V::Integer(self.max_number_of_keys_in_segment),
            P::MaxNumberOfSegmentsInCache => V::Integer(self.max_number_of_segments_in_cache),
            P::BloomFilterNumberOfHashFunctions => {
                V::Integer(self.bloom_filter_number_of_hash_functions)
            }
            P::BloomFilterIndexSizeInBytes => V::Integer(self.bloom_filter_index_size_in_bytes),
            P::BloomFilterProbabilityOfFalsePositive => {
                V::Float(self.bloom_filter_probability_of_false_positive)
            }
            P::DiskIoBufferSizeInBytes => V::Integer(self.disk_io_buffer_size_in_bytes),
            P::IndexWorkerThreadCount => V::Integer(self.index_worker_thread_count),
            P::NumberOfIoThreads => V::Integer(self.number_of_io_threads),
            P::NumberOfSegmentIndexMaintenanceThreads => {
                V::Integer(self.number_of_segment_index_maintenance_threads)
            }
            P::NumberOfIndexMaintenanceThreads => {
                V::Integer(self.number_of_index_maintenance_threads)
            }
            P::NumberOfRegistryLifecycleThreads => {
                V::Integer(self.number_of_registry_lifecycle_threads)
            }
            P::IndexBusyBackoffMillis => V::Integer(self.index_busy_backoff_millis),
            P::IndexBusyTimeoutMillis => V::Integer(self.index_busy_timeout_millis),
            P::SegmentMaintenanceAutoEnabled => V::Bool(self.segment_maintenance_auto_enabled),
            P::IndexName => V::Text(self.index_name.clone()),
            P::KeyClass => V::Text(self.key_class.clone()),
            P::ValueClass => V::Text(self.value_class.clone()),
            P::KeyTypeDescriptor => V::Text(self.key_type_descriptor.clone()),
            P::ValueTypeDescriptor => V::Text(self.value_type_descriptor.clone()),
            P::ContextLoggingEnabled => V::Bool(self.context_logging_enabled),
        }
    }
}

/// A named tuning parameter.
///
/// The declaration order of the variants is the reporting order. Consumers render the exported
/// parameters as an ordered table, so new variants must only be appended.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[allow(missing_docs)]
pub enum TuningParameter {
    MaxNumberOfKeysInSegmentCache,
    MaxNumberOfKeysInSegmentWriteCache,
    MaxNumberOfKeysInSegmentWriteCacheDuringMaintenance,
    MaxNumberOfKeysInSegmentChunk,
    MaxNumberOfDeltaCacheFiles,
    MaxNumberOfKeysInSegment,
    MaxNumberOfSegmentsInCache,
    BloomFilterNumberOfHashFunctions,
    BloomFilterIndexSizeInBytes,
    BloomFilterProbabilityOfFalsePositive,
    DiskIoBufferSizeInBytes,
    IndexWorkerThreadCount,
    NumberOfIoThreads,
    NumberOfSegmentIndexMaintenanceThreads,
    NumberOfIndexMaintenanceThreads,
    NumberOfRegistryLifecycleThreads,
    IndexBusyBackoffMillis,
    IndexBusyTimeoutMillis,
    SegmentMaintenanceAutoEnabled,
    IndexName,
    KeyClass,
    ValueClass,
    KeyTypeDescriptor,
    ValueTypeDescriptor,
    ContextLoggingEnabled,
}

impl TuningParameter {
    /// All parameters in reporting order.
    pub const ALL: [TuningParameter; 25] = [
        Self::MaxNumberOfKeysInSegmentCache,
        Self::MaxNumberOfKeysInSegmentWriteCache,
        Self::MaxNumberOfKeysInSegmentWriteCacheDuringMaintenance,
        Self::MaxNumberOfKeysInSegmentChunk,
        Self::MaxNumberOfDeltaCacheFiles,
        Self::MaxNumberOfKeysInSegment,
        Self::MaxNumberOfSegmentsInCache,
        Self::BloomFilterNumberOfHashFunctions,
        Self::BloomFilterIndexSizeInBytes,
        Self::BloomFilterProbabilityOfFalsePositive,
        Self::DiskIoBufferSizeInBytes,
        Self::IndexWorkerThreadCount,
        Self::NumberOfIoThreads,
        Self::NumberOfSegmentIndexMaintenanceThreads,
        Self::NumberOfIndexMaintenanceThreads,
        Self::NumberOfRegistryLifecycleThreads,
        Self::IndexBusyBackoffMillis,
        Self::IndexBusyTimeoutMillis,
        Self::SegmentMaintenanceAutoEnabled,
        Self::IndexName,
        Self::KeyClass,
        Self::ValueClass,
        Self::KeyTypeDescriptor,
        Self::ValueTypeDescriptor,
        Self::ContextLoggingEnabled,
    ];

    /// The name under which the parameter is reported.
    pub fn name(self) -> &'static str {
        self.schema().0
    }

    /// A human-readable description of the parameter.
    pub fn description(self) -> &'static str {
        self.schema().1
    }

    /// Returns the descriptions of all parameters in reporting order.
    pub fn descriptions() -> TuningTable<&'static str> {
        TuningTable(
            Self::ALL
                .iter()
                .map(|&param| (param, param.description()))
                .collect(),
        )
    }

    fn schema(self) -> (&'static str, &'static str) {
        match self {
            Self::MaxNumberOfKeysInSegmentCache => (
                "maxNumberOfKeysInSegmentCache",
                "Maximum number of keys kept in in-memory segment read cache.",
            ),
            Self::MaxNumberOfKeysInSegmentWriteCache => (
                "maxNumberOfKeysInSegmentWriteCache",
                "Maximum number of keys buffered in segment write cache during normal operation.",
            ),
            Self::MaxNumberOfKeysInSegmentWriteCacheDuringMaintenance => (
                "maxNumberOfKeysInSegmentWriteCacheDuringMaintenance",
                "Maximum write-cache key capacity while maintenance mode is active.",
            ),
            Self::MaxNumberOfKeysInSegmentChunk => (
                "maxNumberOfKeysInSegmentChunk",
                "Maximum number of keys per segment chunk unit.",
            ),
            Self::MaxNumberOfDeltaCacheFiles => (
                "maxNumberOfDeltaCacheFiles",
                "Maximum number of delta cache files retained.",
            ),
            Self::MaxNumberOfKeysInSegment => (
                "maxNumberOfKeysInSegment",
                "Upper bound of keys in a single segment.",
            ),
            Self::MaxNumberOfSegmentsInCache => (
                "maxNumberOfSegmentsInCache",
                "Maximum number of segments held in cache simultaneously.",
            ),
            Self::BloomFilterNumberOfHashFunctions => (
                "bloomFilterNumberOfHashFunctions",
                "Number of hash functions used by Bloom filter.",
            ),
            Self::BloomFilterIndexSizeInBytes => (
                "bloomFilterIndexSizeInBytes",
                "Size of Bloom filter index in bytes.",
            ),
            Self::BloomFilterProbabilityOfFalsePositive => (
                "bloomFilterProbabilityOfFalsePositive",
                "Expected Bloom filter false positive probability.",
            ),
            Self::DiskIoBufferSizeInBytes => (
                "diskIoBufferSizeInBytes",
                "Buffer size used for disk I/O operations.",
            ),
            Self::IndexWorkerThreadCount => (
                "indexWorkerThreadCount",
                "Number of worker threads for index operations.",
            ),
            Self::NumberOfIoThreads => (
                "numberOfIoThreads",
                "Number of threads dedicated to I/O processing.",
            ),
            Self::NumberOfSegmentIndexMaintenanceThreads => (
                "numberOfSegmentIndexMaintenanceThreads",
                "Number of threads for segment-index maintenance tasks.",
            ),
            Self::NumberOfIndexMaintenanceThreads => (
                "numberOfIndexMaintenanceThreads",
                "Number of threads for general index maintenance tasks.",
            ),
            Self::NumberOfRegistryLifecycleThreads => (
                "numberOfRegistryLifecycleThreads",
                "Number of threads used for registry lifecycle operations.",
            ),
            Self::IndexBusyBackoffMillis => (
                "indexBusyBackoffMillis",
                "Backoff interval before retry when index is busy.",
            ),
            Self::IndexBusyTimeoutMillis => (
                "indexBusyTimeoutMillis",
                "Timeout waiting for index busy state to clear.",
            ),
            Self::SegmentMaintenanceAutoEnabled => (
                "segmentMaintenanceAutoEnabled",
                "Whether automatic segment maintenance is enabled.",
            ),
            Self::IndexName => ("indexName", "Logical index identifier."),
            Self::KeyClass => ("keyClass", "Type used for key serialization/handling."),
            Self::ValueClass => ("valueClass", "Type used for value serialization/handling."),
            Self::KeyTypeDescriptor => ("keyTypeDescriptor", "Descriptor string for key type."),
            Self::ValueTypeDescriptor => (
                "valueTypeDescriptor",
                "Descriptor string for value type.",
            ),
            Self::ContextLoggingEnabled => (
                "contextLoggingEnabled",
                "Whether context-aware logging is enabled.",
            ),
        }
    }
}

impl fmt::Display for TuningParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The value of a single tuning parameter.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum TuningValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// An ordered table keyed by [`TuningParameter`].
///
/// Serializes as a map from parameter name to value, preserving the reporting order.
#[derive(Clone, Debug, PartialEq)]
pub struct TuningTable<T>(Vec<(TuningParameter, T)>);

impl<T> TuningTable<T> {
    /// Returns the entry for the given parameter.
    pub fn get(&self, param: TuningParameter) -> Option<&T> {
        self.0.iter().find(|(p, _)| *p == param).map(|(_, v)| v)
    }

    /// Iterates over all entries in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = (TuningParameter, &T)> {
        self.0.iter().map(|(p, v)| (*p, v))
    }

    /// The number of entries in the table.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Serialize> Serialize for TuningTable<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (param, value) in &self.0 {
            map.serialize_entry(param.name(), value)?;
        }
        map.end()
    }
}
