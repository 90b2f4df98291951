//! DurableStore: the ledger's fixed-layout region in non-volatile storage.
//!
//! The whole region (see [`layout`]) lives in a single blob behind a
//! [`StoragePort`].  The store keeps an image of that blob in RAM;
//! `write_record` / `write_aggregate` patch their fixed-offset slice of
//! the image and write the image back.  Every write is a synchronous,
//! blocking round-trip.  A power cut between two writes can leave one
//! record older than another; nothing here pretends otherwise.

pub mod layout;

use log::{info, warn};

use crate::app::ledger::{AggregateState, FilterId, FilterLedger, FilterRecord};
use crate::app::ports::{StorageError, StoragePort};

use layout::{HeaderState, REGION_LEN};

pub const STORE_NAMESPACE: &str = "filtermon";
pub const STORE_KEY: &str = "ledger";

pub struct DurableStore<S: StoragePort> {
    storage: S,
    image: [u8; REGION_LEN],
}

impl<S: StoragePort> DurableStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            image: [0u8; REGION_LEN],
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Raw region image as last read or written.
    pub fn image(&self) -> &[u8; REGION_LEN] {
        &self.image
    }

    fn load_image(&mut self) -> Result<usize, StorageError> {
        let mut buf = [0u8; REGION_LEN];
        let len = self.storage.read(STORE_NAMESPACE, STORE_KEY, &mut buf)?;
        self.image = buf;
        Ok(len)
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.storage.write(STORE_NAMESPACE, STORE_KEY, &self.image)
    }

    /// Make sure the region holds a valid, current-schema image.
    ///
    /// A missing blob, an unset flag, a short blob or a schema-version
    /// mismatch all end the same way: the region is erased and the header
    /// written.  Returns `true` when that happened.
    pub fn ensure_initialized(&mut self) -> Result<bool, StorageError> {
        let state = if !self.storage.exists(STORE_NAMESPACE, STORE_KEY) {
            HeaderState::Uninitialized
        } else {
            match self.load_image() {
                Ok(len) if len < REGION_LEN => {
                    warn!("Store: region short ({} of {} bytes)", len, REGION_LEN);
                    HeaderState::Uninitialized
                }
                Ok(_) => layout::header_state(&self.image),
                Err(StorageError::NotFound) => HeaderState::Uninitialized,
                Err(e) => return Err(e),
            }
        };

        match state {
            HeaderState::Valid => Ok(false),
            HeaderState::Uninitialized => {
                info!("Store: first boot, initialising region");
                self.erase_all()?;
                self.initialize()?;
                Ok(true)
            }
            HeaderState::SchemaMismatch { found } => {
                warn!(
                    "Store: schema {} found, expected {}; erasing region",
                    found,
                    layout::SCHEMA_VERSION
                );
                self.erase_all()?;
                self.initialize()?;
                Ok(true)
            }
        }
    }

    fn initialize(&mut self) -> Result<(), StorageError> {
        layout::write_header(&mut self.image);
        self.flush()
    }

    /// Read and decode the whole region.
    pub fn read_all(&mut self) -> Result<FilterLedger, StorageError> {
        self.load_image()?;
        layout::decode_region(&self.image).map_err(|e| {
            warn!("Store: region unreadable: {}", e);
            StorageError::IoError
        })
    }

    pub fn write_record(
        &mut self,
        id: FilterId,
        record: &FilterRecord,
    ) -> Result<(), StorageError> {
        layout::store_record(&mut self.image, id, record);
        self.flush()
    }

    pub fn write_aggregate(&mut self, aggregate: &AggregateState) -> Result<(), StorageError> {
        layout::store_aggregate(&mut self.image, aggregate);
        self.flush()
    }

    /// Aggregate and all three records in one write.
    pub fn write_ledger(&mut self, ledger: &FilterLedger) -> Result<(), StorageError> {
        self.image = layout::encode_region(ledger);
        self.flush()
    }

    /// Zero-fill the region, clearing the initialised flag.
    pub fn erase_all(&mut self) -> Result<(), StorageError> {
        self.image = [0u8; REGION_LEN];
        self.flush()
    }
}
