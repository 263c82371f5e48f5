use sqc_schemas::ItemError;
use std::fmt;

/// Why a put failed. Every variant leaves the cursor untouched.
#[derive(Debug)]
pub enum PutError {
    /// The document did not carry a usable queue key / sequence.
    Document(ItemError),
    /// The item store rejected the upsert.
    PersistItem(anyhow::Error),
    /// The item is stored, but the single-step cursor write failed.
    AdvanceWrite(anyhow::Error),
}

impl PutError {
    /// True when the item was persisted before the failure.
    pub fn item_stored(&self) -> bool {
        matches!(self, PutError::AdvanceWrite(_))
    }
}

impl fmt::Display for PutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Document(e) => write!(f, "invalid document: {e}"),
            PutError::PersistItem(e) => write!(f, "item upsert failed: {e:#}"),
            PutError::AdvanceWrite(e) => write!(f, "cursor write failed: {e:#}"),
        }
    }
}

impl std::error::Error for PutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PutError::Document(e) => Some(e),
            PutError::PersistItem(e) | PutError::AdvanceWrite(e) => Some(&**e),
        }
    }
}

impl From<ItemError> for PutError {
    fn from(e: ItemError) -> Self {
        PutError::Document(e)
    }
}
