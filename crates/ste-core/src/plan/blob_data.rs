//! Translation of optional order attributes into fixed-width plan fields.

use crate::common::BlobTransferAttributes;
use crate::error::AttributeError;

pub const MAX_CONTENT_TYPE_BYTES: usize = 256;
pub const MAX_CONTENT_ENCODING_BYTES: usize = 256;
pub const MAX_METADATA_BYTES: usize = 1000;
/// Largest chunk a single order may request.
pub const MAX_BLOCK_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Destination-specific configuration stored in the plan header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationBlobData {
    pub content_type: String,
    pub content_encoding: String,
    pub metadata: String,
    /// Requested chunk size; 0 means the engine default.
    pub block_size: u64,
}

impl DestinationBlobData {
    /// Validate attributes against the fixed field widths of the plan header.
    pub fn from_attributes(attrs: &BlobTransferAttributes) -> Result<Self, AttributeError> {
        check_len("content type", &attrs.content_type, MAX_CONTENT_TYPE_BYTES)?;
        check_len(
            "content encoding",
            &attrs.content_encoding,
            MAX_CONTENT_ENCODING_BYTES,
        )?;
        check_len("metadata", &attrs.metadata, MAX_METADATA_BYTES)?;
        if attrs.block_size_in_bytes > MAX_BLOCK_SIZE_BYTES {
            return Err(AttributeError::BlockSizeTooLarge(
                attrs.block_size_in_bytes,
                MAX_BLOCK_SIZE_BYTES,
            ));
        }
        Ok(DestinationBlobData {
            content_type: attrs.content_type.clone(),
            content_encoding: attrs.content_encoding.clone(),
            metadata: attrs.metadata.clone(),
            block_size: attrs.block_size_in_bytes,
        })
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), AttributeError> {
    if value.len() > max {
        return Err(AttributeError::TooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_defaults() {
        let data = DestinationBlobData::from_attributes(&BlobTransferAttributes::default()).unwrap();
        assert_eq!(data, DestinationBlobData::default());
    }

    #[test]
    fn rejects_long_metadata() {
        let attrs = BlobTransferAttributes {
            metadata: "k=".to_string() + &"v".repeat(MAX_METADATA_BYTES),
            ..Default::default()
        };
        let err = DestinationBlobData::from_attributes(&attrs).unwrap_err();
        assert!(matches!(err, AttributeError::TooLong { field: "metadata", .. }));
    }

    #[test]
    fn rejects_huge_block_size() {
        let attrs = BlobTransferAttributes {
            block_size_in_bytes: MAX_BLOCK_SIZE_BYTES + 1,
            ..Default::default()
        };
        assert_eq!(
            DestinationBlobData::from_attributes(&attrs),
            Err(AttributeError::BlockSizeTooLarge(
                MAX_BLOCK_SIZE_BYTES + 1,
                MAX_BLOCK_SIZE_BYTES
            ))
        );
    }
}
