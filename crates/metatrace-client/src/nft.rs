//! Token metadata document for minting.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use metatrace_shared::constants::NFT_DESCRIPTION;
use metatrace_shared::UploadRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NftAttribute {
    pub trait_type: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NftMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    pub attributes: Vec<NftAttribute>,
}

impl NftMetadata {
    /// Every extracted metadata field becomes an attribute. The name is the
    /// analysed `filename` field when there is one, else the uploaded name.
    pub fn from_record(record: &UploadRecord) -> Self {
        let name = record
            .metadata
            .get("filename")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(&record.filename)
            .to_string();

        let attributes = record
            .metadata
            .iter()
            .map(|(key, value)| NftAttribute {
                trait_type: key.clone(),
                value: value.clone(),
            })
            .collect();

        Self {
            name,
            description: NFT_DESCRIPTION.to_string(),
            image: record.content_url.clone(),
            attributes,
        }
    }
}
