//! The dataset operations template
//!
//! [`DatasetTemplate`] turns record types into datasets: it names and
//! describes the dataset for a type, provisions it on first use through the
//! repository, caches the handle, and runs write/read channels against it
//! with the channel closed on every exit path.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use static_assertions::assert_impl_all;
use tracing::{debug, info, warn};

use crate::cache::DatasetCache;
use crate::codec::Format;
use crate::descriptor::{DatasetDefinition, DatasetDescriptor};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::repository::{DatasetHandle, DatasetRepository, RecordReader};
use crate::resolver::SchemaResolver;

/// Record-level operations over a dataset repository
pub trait DatasetOperations {
    /// Append `records` to the dataset of `T`, in slice order
    ///
    /// Records written before a failure are not rolled back.
    fn write<T: Record>(&self, records: &[T]) -> Result<()>;

    /// Read every record of `T`'s dataset
    ///
    /// A dataset nothing was written to yields an empty vector.
    fn read<T: Record>(&self) -> Result<Vec<T>>;

    /// Invoke `callback` once per record of `T`'s dataset, on the calling thread
    ///
    /// Iteration stops at the first error, which is returned unchanged.
    fn read_with<T, F>(&self, callback: F) -> Result<()>
    where
        T: Record,
        F: FnMut(T) -> Result<()>;

    /// Run `callback` against the underlying repository
    fn execute<R, F>(&self, callback: F) -> Result<R>
    where
        F: FnOnce(&dyn DatasetRepository) -> Result<R>;

    /// Name of the dataset holding records of `T`
    fn dataset_name<T: Record>(&self) -> String;
}

/// Default [`DatasetOperations`] implementation
pub struct DatasetTemplate {
    /// Backing repository
    repository: Arc<dyn DatasetRepository>,

    /// Schema registry
    resolver: SchemaResolver,

    /// Provisioned dataset handles by record type
    cache: DatasetCache,

    /// Format for types without a definition
    default_format: Format,

    /// Per-type provisioning definitions
    definitions: HashMap<TypeId, DatasetDefinition>,
}

assert_impl_all!(DatasetTemplate: Send, Sync);

impl DatasetTemplate {
    /// Create a template over `repository` with default settings
    pub fn new(repository: Arc<dyn DatasetRepository>) -> Self {
        Self {
            repository,
            resolver: SchemaResolver::new(),
            cache: DatasetCache::new(),
            default_format: Format::default(),
            definitions: HashMap::new(),
        }
    }

    /// Start configuring a template
    pub fn builder() -> DatasetTemplateBuilder {
        DatasetTemplateBuilder::new()
    }

    /// Format used for types without a definition
    pub fn default_format(&self) -> Format {
        self.default_format
    }

    /// Whether the dataset of `T` is provisioned and cached
    pub fn is_provisioned<T: Record>(&self) -> bool {
        self.cache.contains::<T>()
    }

    /// Descriptor of `T`'s dataset if it exists; never provisions
    pub fn dataset_descriptor<T: Record>(&self) -> Result<Option<DatasetDescriptor>> {
        if let Some(handle) = self.cache.get::<T>() {
            return Ok(Some(handle.descriptor().clone()));
        }

        let name = T::dataset_name();
        if !self.repository.exists(&name)? {
            return Ok(None);
        }
        match self.repository.load(&name) {
            Ok(handle) => Ok(Some(handle.descriptor().clone())),
            // Deleted between the two calls
            Err(Error::DatasetNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Handle for `T`'s dataset, provisioning it on first use
    fn dataset<T: Record>(&self) -> Result<Arc<dyn DatasetHandle>> {
        let name = T::dataset_name();
        self.cache.get_or_create::<T, _>(&name, || {
            let schema = self.resolver.resolve::<T>()?;
            let descriptor = match self.definitions.get(&TypeId::of::<T>()) {
                Some(definition) => definition.descriptor((*schema).clone(), self.default_format),
                None => DatasetDescriptor::new((*schema).clone()).with_format(self.default_format),
            };

            let handle = self.repository.create_or_open(&name, &descriptor)?;
            info!(
                dataset = %name,
                record = std::any::type_name::<T>(),
                format = %handle.descriptor().format(),
                "dataset provisioned"
            );
            Ok(handle)
        })
    }

    /// Decode every record of `dataset` into `callback`, closing the reader
    /// whatever happens
    fn stream<T, F>(dataset: &dyn DatasetHandle, callback: F) -> Result<()>
    where
        T: Record,
        F: FnMut(T) -> Result<()>,
    {
        let mut reader = dataset.new_reader()?;
        debug!(dataset = %dataset.name(), "read channel opened");

        let drained = drain(dataset, reader.as_mut(), callback);
        let closed = reader.close();
        finish(dataset.name(), "read", drained, closed)
    }
}

/// Feed every record from `reader` to `callback`
fn drain<T, F>(dataset: &dyn DatasetHandle, reader: &mut dyn RecordReader, mut callback: F) -> Result<()>
where
    T: Record,
    F: FnMut(T) -> Result<()>,
{
    let format = dataset.descriptor().format();
    while let Some(bytes) = reader.next_record()? {
        let record = format.decode(dataset.name(), &bytes)?;
        callback(record)?;
    }
    Ok(())
}

/// Combine the outcome of a channel's work with the outcome of closing it
///
/// The first failure wins; a close failure after a work failure is logged.
fn finish(dataset: &str, channel: &str, work: Result<()>, closed: Result<()>) -> Result<()> {
    match (work, closed) {
        (Ok(()), closed) => {
            debug!(dataset = %dataset, channel, "channel closed");
            closed
        }
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(dataset = %dataset, channel, error = %close_err, "closing channel failed after an earlier error");
            Err(e)
        }
    }
}

impl DatasetOperations for DatasetTemplate {
    fn write<T: Record>(&self, records: &[T]) -> Result<()> {
        if records.is_empty() {
            return Err(Error::InvalidArgument("records to write must not be empty".into()));
        }

        let dataset = self.dataset::<T>()?;
        let format = dataset.descriptor().format();
        let mut writer = dataset.new_writer()?;
        debug!(dataset = %dataset.name(), records = records.len(), "write channel opened");

        let written = records.iter().try_for_each(|record| {
            let bytes = format.encode(dataset.name(), record)?;
            writer.write(&bytes)
        });
        let closed = writer.close();
        finish(dataset.name(), "write", written, closed)
    }

    fn read<T: Record>(&self) -> Result<Vec<T>> {
        let dataset = self.dataset::<T>()?;
        let mut records = Vec::new();
        Self::stream(dataset.as_ref(), |record: T| {
            records.push(record);
            Ok(())
        })?;
        Ok(records)
    }

    fn read_with<T, F>(&self, callback: F) -> Result<()>
    where
        T: Record,
        F: FnMut(T) -> Result<()>,
    {
        let dataset = self.dataset::<T>()?;
        Self::stream(dataset.as_ref(), callback)
    }

    fn execute<R, F>(&self, callback: F) -> Result<R>
    where
        F: FnOnce(&dyn DatasetRepository) -> Result<R>,
    {
        let view = CacheAwareRepository {
            inner: self.repository.as_ref(),
            cache: &self.cache,
        };
        callback(&view)
    }

    fn dataset_name<T: Record>(&self) -> String {
        T::dataset_name()
    }
}

impl fmt::Debug for DatasetTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetTemplate")
            .field("default_format", &self.default_format)
            .field("definitions", &self.definitions.len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Repository view handed to [`DatasetOperations::execute`] callbacks
///
/// Deleting a dataset through it also forgets any cached handle for that
/// dataset, so the next write or read provisions it again.
struct CacheAwareRepository<'a> {
    inner: &'a dyn DatasetRepository,
    cache: &'a DatasetCache,
}

impl DatasetRepository for CacheAwareRepository<'_> {
    fn create(&self, name: &str, descriptor: &DatasetDescriptor) -> Result<Arc<dyn DatasetHandle>> {
        self.inner.create(name, descriptor)
    }

    fn load(&self, name: &str) -> Result<Arc<dyn DatasetHandle>> {
        self.inner.load(name)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        self.inner.exists(name)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let removed = self.inner.delete(name)?;
        self.cache.invalidate_name(name);
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<String>> {
        self.inner.list()
    }

    fn create_or_open(&self, name: &str, descriptor: &DatasetDescriptor) -> Result<Arc<dyn DatasetHandle>> {
        self.inner.create_or_open(name, descriptor)
    }
}

/// A builder for [`DatasetTemplate`]
#[derive(Default)]
pub struct DatasetTemplateBuilder {
    /// The backing repository
    repository: Option<Arc<dyn DatasetRepository>>,

    /// Format for types without a definition
    default_format: Format,

    /// Per-type definitions
    definitions: HashMap<TypeId, DatasetDefinition>,
}

impl DatasetTemplateBuilder {
    /// Create a new template builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backing repository
    pub fn repository(mut self, repository: Arc<dyn DatasetRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Set the format used for types without a definition
    pub fn default_format(mut self, format: Format) -> Self {
        self.default_format = format;
        self
    }

    /// Register how the dataset of `T` should be provisioned
    pub fn definition<T: Record>(mut self, definition: DatasetDefinition) -> Self {
        self.definitions.insert(TypeId::of::<T>(), definition);
        self
    }

    /// Build the template
    pub fn build(self) -> Result<DatasetTemplate> {
        let repository = self.repository.ok_or_else(|| {
            Error::InvalidArgument("a repository is required to build a dataset template".into())
        })?;

        Ok(DatasetTemplate {
            repository,
            resolver: SchemaResolver::new(),
            cache: DatasetCache::new(),
            default_format: self.default_format,
            definitions: self.definitions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDatasetRepository;
    use crate::repository::{MockDatasetRepository, RecordWriter};
    use crate::schema::{DataType, Schema};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestPojo {
        id: i64,
        name: Option<String>,
    }

    impl Record for TestPojo {
        fn schema() -> Schema {
            Schema::builder()
                .required("id", DataType::Int64)
                .optional("name", DataType::String)
                .build()
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Unstorable {
        id: i64,
    }

    impl Record for Unstorable {
        fn schema() -> Schema {
            Schema::builder().required("id", DataType::Null).build()
        }
    }

    fn pojo(id: i64, name: &str) -> TestPojo {
        TestPojo { id, name: Some(name.to_string()) }
    }

    /// Channels that remember whether they were closed and fail on demand
    #[derive(Debug, Default)]
    struct Channels {
        writer_closed: AtomicBool,
        reader_closed: AtomicBool,
        writes: AtomicUsize,
    }

    #[derive(Debug)]
    struct TrackedHandle {
        descriptor: DatasetDescriptor,
        channels: Arc<Channels>,
        fail_on_write: usize,
        stored: Vec<Vec<u8>>,
    }

    struct TrackedWriter {
        channels: Arc<Channels>,
        fail_on_write: usize,
    }

    struct TrackedReader {
        channels: Arc<Channels>,
        pending: Vec<Vec<u8>>,
    }

    impl DatasetHandle for TrackedHandle {
        fn name(&self) -> &str {
            "testpojo"
        }

        fn descriptor(&self) -> &DatasetDescriptor {
            &self.descriptor
        }

        fn new_writer(&self) -> Result<Box<dyn RecordWriter>> {
            Ok(Box::new(TrackedWriter {
                channels: Arc::clone(&self.channels),
                fail_on_write: self.fail_on_write,
            }))
        }

        fn new_reader(&self) -> Result<Box<dyn RecordReader>> {
            let mut pending = self.stored.clone();
            pending.reverse();
            Ok(Box::new(TrackedReader {
                channels: Arc::clone(&self.channels),
                pending,
            }))
        }
    }

    impl RecordWriter for TrackedWriter {
        fn write(&mut self, _record: &[u8]) -> Result<()> {
            let n = self.channels.writes.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_on_write {
                return Err(Error::record_io("testpojo", "disk full"));
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.channels.writer_closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    impl RecordReader for TrackedReader {
        fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
            Ok(self.pending.pop())
        }

        fn close(&mut self) -> Result<()> {
            self.channels.reader_closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tracked_template(channels: &Arc<Channels>, fail_on_write: usize, stored: Vec<Vec<u8>>) -> DatasetTemplate {
        let handle: Arc<dyn DatasetHandle> = Arc::new(TrackedHandle {
            descriptor: DatasetDescriptor::new(TestPojo::schema()),
            channels: Arc::clone(channels),
            fail_on_write,
            stored,
        });

        let mut repo = MockDatasetRepository::new();
        repo.expect_create_or_open()
            .times(1)
            .returning(move |_, _| Ok(Arc::clone(&handle)));
        DatasetTemplate::new(Arc::new(repo))
    }

    fn encoded(records: &[TestPojo]) -> Vec<Vec<u8>> {
        records.iter().map(|r| serde_json::to_vec(r).unwrap()).collect()
    }

    #[test]
    fn test_provisions_once_across_operations() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let backing = Arc::new(InMemoryDatasetRepository::new());
        let delegate = Arc::clone(&backing);

        let mut repo = MockDatasetRepository::new();
        repo.expect_create_or_open()
            .times(1)
            .returning(move |name, descriptor| {
                assert_eq!(name, "testpojo");
                assert_eq!(descriptor.schema().len(), 2);
                delegate.create_or_open(name, descriptor)
            });

        let template = DatasetTemplate::new(Arc::new(repo));
        template.write(&[pojo(22, "Sven")]).unwrap();
        template.write(&[pojo(48, "Nisse")]).unwrap();
        assert_eq!(template.read::<TestPojo>().unwrap().len(), 2);
        assert!(template.is_provisioned::<TestPojo>());
    }

    #[test]
    fn test_empty_write_rejected_before_provisioning() {
        // No expectations: any repository call would panic
        let template = DatasetTemplate::new(Arc::new(MockDatasetRepository::new()));
        let err = template.write::<TestPojo>(&[]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!template.is_provisioned::<TestPojo>());
    }

    #[test]
    fn test_unsupported_schema_never_reaches_repository() {
        let template = DatasetTemplate::new(Arc::new(MockDatasetRepository::new()));
        let err = template.write(&[Unstorable { id: 1 }]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSchema(_)));
    }

    #[test]
    fn test_writer_closed_after_mid_stream_failure() {
        let channels = Arc::new(Channels::default());
        let template = tracked_template(&channels, 2, Vec::new());

        let err = template
            .write(&[pojo(1, "a"), pojo(2, "b"), pojo(3, "c")])
            .unwrap_err();

        assert!(matches!(err, Error::RecordIo { .. }));
        assert_eq!(channels.writes.load(Ordering::SeqCst), 2);
        assert!(channels.writer_closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_reader_closed_when_callback_fails() {
        let channels = Arc::new(Channels::default());
        let stored = encoded(&[pojo(1, "a"), pojo(2, "b"), pojo(3, "c")]);
        let template = tracked_template(&channels, 0, stored);

        let mut seen = Vec::new();
        let err = template
            .read_with(|record: TestPojo| -> Result<()> {
                if record.id == 2 {
                    return Err(Error::callback("stop at two"));
                }
                seen.push(record.id);
                Ok(())
            })
            .unwrap_err();

        assert!(err.is_callback());
        assert_eq!(err.to_string(), "Callback error: stop at two");
        assert_eq!(seen, vec![1]);
        assert!(channels.reader_closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failed_decode_yields_no_partial_collection() {
        let channels = Arc::new(Channels::default());
        let mut stored = encoded(&[pojo(1, "a")]);
        stored.push(b"{broken".to_vec());
        let template = tracked_template(&channels, 0, stored);

        let result = template.read::<TestPojo>();
        assert!(matches!(result, Err(Error::RecordIo { .. })));
        assert!(channels.reader_closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_delete_through_execute_resets_lifecycle() {
        let repo = Arc::new(InMemoryDatasetRepository::new());
        let template = DatasetTemplate::new(repo.clone());

        template.write(&[pojo(1, "a")]).unwrap();
        assert_eq!(repo.provision_calls(), 1);

        let removed = template
            .execute(|repository| repository.delete(&template.dataset_name::<TestPojo>()))
            .unwrap();
        assert!(removed);
        assert!(!template.is_provisioned::<TestPojo>());
        assert_eq!(template.dataset_descriptor::<TestPojo>().unwrap(), None);

        assert!(template.read::<TestPojo>().unwrap().is_empty());
        assert_eq!(repo.provision_calls(), 2);
    }

    /// Pauses the first provisioning after the dataset was opened
    struct GatedRepository {
        inner: InMemoryDatasetRepository,
        armed: AtomicBool,
        opened: Barrier,
        resume: Barrier,
    }

    impl DatasetRepository for GatedRepository {
        fn create(&self, name: &str, descriptor: &DatasetDescriptor) -> Result<Arc<dyn DatasetHandle>> {
            self.inner.create(name, descriptor)
        }

        fn load(&self, name: &str) -> Result<Arc<dyn DatasetHandle>> {
            self.inner.load(name)
        }

        fn exists(&self, name: &str) -> Result<bool> {
            self.inner.exists(name)
        }

        fn delete(&self, name: &str) -> Result<bool> {
            self.inner.delete(name)
        }

        fn list(&self) -> Result<Vec<String>> {
            self.inner.list()
        }

        fn create_or_open(&self, name: &str, descriptor: &DatasetDescriptor) -> Result<Arc<dyn DatasetHandle>> {
            let handle = self.inner.create_or_open(name, descriptor)?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.opened.wait();
                self.resume.wait();
            }
            Ok(handle)
        }
    }

    #[test]
    fn test_delete_during_provisioning_is_not_cached() {
        let repo = Arc::new(GatedRepository {
            inner: InMemoryDatasetRepository::new(),
            armed: AtomicBool::new(true),
            opened: Barrier::new(2),
            resume: Barrier::new(2),
        });
        let template = DatasetTemplate::new(repo.clone());

        thread::scope(|scope| {
            let writer = scope.spawn(|| template.write(&[pojo(1, "a")]));

            repo.opened.wait();
            let removed = template.execute(|repository| repository.delete("testpojo")).unwrap();
            assert!(removed);
            repo.resume.wait();

            writer.join().unwrap().unwrap();
        });

        template.write(&[pojo(2, "b")]).unwrap();

        assert!(repo.inner.exists("testpojo").unwrap());
        let mut read = template.read::<TestPojo>().unwrap();
        read.sort_by_key(|p| p.id);
        assert_eq!(read, vec![pojo(1, "a"), pojo(2, "b")]);
        assert_eq!(repo.inner.record_count("testpojo"), Some(2));
        assert_eq!(repo.inner.provision_calls(), 2);
    }

    #[test]
    fn test_execute_propagates_callback_error() {
        let template = DatasetTemplate::new(Arc::new(InMemoryDatasetRepository::new()));
        let err = template
            .execute(|_| -> Result<()> { Err(Error::callback("refused")) })
            .unwrap_err();
        assert!(err.is_callback());

        let names = template.execute(|repository| repository.list()).unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_builder_definitions_choose_format() {
        let repo = Arc::new(InMemoryDatasetRepository::new());
        let template = DatasetTemplate::builder()
            .repository(repo)
            .definition::<TestPojo>(DatasetDefinition::with_format(Format::Bincode).property("owner", "tests"))
            .build()
            .unwrap();

        assert_eq!(template.dataset_descriptor::<TestPojo>().unwrap(), None);
        template.write(&[pojo(7, "x")]).unwrap();

        let descriptor = template.dataset_descriptor::<TestPojo>().unwrap().unwrap();
        assert_eq!(descriptor.format(), Format::Bincode);
        assert_eq!(descriptor.property("owner"), Some("tests"));
        assert_eq!(template.read::<TestPojo>().unwrap(), vec![pojo(7, "x")]);
    }

    #[test]
    fn test_builder_requires_repository() {
        let err = DatasetTemplate::builder().default_format(Format::Bincode).build().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
