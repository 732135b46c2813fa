use anyhow::{Context, Result};
use log::info;
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableTable};
use std::path::Path;

use crate::database::schema::image::{
    IMAGE_PATH_TABLE, IMAGE_TABLE, ImageId, ImageRecord, ImageUpdate,
};

/// Durable image metadata, addressable by id and by storage path.
pub trait RecordStore: Send + Sync + 'static {
    fn find_by_path(&self, path: &str) -> Result<Option<ImageRecord>>;

    fn get_by_id(&self, id: &ImageId) -> Result<Option<ImageRecord>>;

    /// Persist a new record. Returns `false` without writing anything when
    /// another record already owns `record.path`.
    fn create(&self, record: &ImageRecord) -> Result<bool>;

    /// Returns the updated record, or `None` if the id is unknown.
    fn update(&self, id: &ImageId, update: ImageUpdate) -> Result<Option<ImageRecord>>;
}

pub struct RedbRecordStore {
    in_disk: Database,
}

impl RedbRecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path)
            .with_context(|| format!("Failed to open record store {:?}", path))?;
        let store = Self { in_disk: db };
        store.initialize_tables()?;
        info!("Record store opened at {:?}", path);
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .context("Failed to create in-memory record store")?;
        let store = Self { in_disk: db };
        store.initialize_tables()?;
        Ok(store)
    }

    fn initialize_tables(&self) -> Result<()> {
        let txn = self.in_disk.begin_write()?;
        let _ = txn.open_table(IMAGE_TABLE)?;
        let _ = txn.open_table(IMAGE_PATH_TABLE)?;
        txn.commit()?;
        Ok(())
    }

    pub fn len(&self) -> Result<u64> {
        use redb::ReadableTableMetadata;
        let txn = self.in_disk.begin_read()?;
        let table = txn.open_table(IMAGE_TABLE)?;
        Ok(table.len()?)
    }
}

impl RecordStore for RedbRecordStore {
    fn find_by_path(&self, path: &str) -> Result<Option<ImageRecord>> {
        let txn = self.in_disk.begin_read()?;
        let path_table = txn.open_table(IMAGE_PATH_TABLE)?;
        let image_table = txn.open_table(IMAGE_TABLE)?;

        let Some(id) = path_table.get(path)? else {
            return Ok(None);
        };
        let Some(bytes) = image_table.get(id.value())? else {
            return Ok(None);
        };
        let record: ImageRecord = bitcode::decode(bytes.value())
            .with_context(|| format!("Failed to decode image record for path {}", path))?;
        Ok(Some(record))
    }

    fn get_by_id(&self, id: &ImageId) -> Result<Option<ImageRecord>> {
        let txn = self.in_disk.begin_read()?;
        let image_table = txn.open_table(IMAGE_TABLE)?;

        match image_table.get(id.as_str())? {
            Some(bytes) => {
                let record: ImageRecord = bitcode::decode(bytes.value())
                    .with_context(|| format!("Failed to decode image record {}", id))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn create(&self, record: &ImageRecord) -> Result<bool> {
        let txn = self.in_disk.begin_write()?;
        {
            let mut path_table = txn.open_table(IMAGE_PATH_TABLE)?;
            if path_table.get(record.path.as_str())?.is_some() {
                // Dropping the transaction without commit discards it
                return Ok(false);
            }
            path_table.insert(record.path.as_str(), record.id.as_str())?;

            let mut image_table = txn.open_table(IMAGE_TABLE)?;
            let bytes = bitcode::encode(record);
            image_table.insert(record.id.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(true)
    }

    fn update(&self, id: &ImageId, update: ImageUpdate) -> Result<Option<ImageRecord>> {
        let txn = self.in_disk.begin_write()?;
        let updated = {
            let mut image_table = txn.open_table(IMAGE_TABLE)?;
            let existing: Option<ImageRecord> = match image_table.get(id.as_str())? {
                Some(bytes) => Some(bitcode::decode(bytes.value())?),
                None => None,
            };
            let Some(mut record) = existing else {
                return Ok(None);
            };
            update.apply(&mut record);
            let bytes = bitcode::encode(&record);
            image_table.insert(id.as_str(), bytes.as_slice())?;
            record
        };
        txn.commit()?;
        Ok(Some(updated))
    }
}
