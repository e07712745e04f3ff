//! Base64 transport encoding used at the service boundary.
//!
//! Inside the core everything is raw bytes. Fragments leave and enter the
//! process as [`FragmentRecord`]s whose `data` field carries base64 text, and
//! whole files travel as a single base64 string.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::fragment::{Fragment, FragmentPayload};
use crate::hash::ContentId;

/// Explicit payload format carried by records written after the format tag
/// was introduced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    Sealed,
    Legacy,
}

/// Wire and storage form of a [`Fragment`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub fragment_id: u32,
    pub fragment_hash: ContentId,
    pub size: u64,
    pub position: u64,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<PayloadFormat>,
}

impl From<&Fragment> for FragmentRecord {
    fn from(fragment: &Fragment) -> Self {
        let (data, format) = match &fragment.payload {
            FragmentPayload::Sealed(bytes) => (encode_bytes(bytes), Some(PayloadFormat::Sealed)),
            FragmentPayload::Legacy(text) => (text.clone(), Some(PayloadFormat::Legacy)),
            FragmentPayload::Untagged(text) => (text.clone(), None),
        };
        Self {
            fragment_id: fragment.fragment_id,
            fragment_hash: fragment.plaintext_hash,
            size: fragment.plaintext_size,
            position: fragment.position,
            data,
            format,
        }
    }
}

impl TryFrom<FragmentRecord> for Fragment {
    type Error = VaultError;

    /// Sealed records must carry valid base64; legacy and untagged text is
    /// kept verbatim and only decoded during reassembly.
    fn try_from(record: FragmentRecord) -> Result<Self, Self::Error> {
        let payload = match record.format {
            Some(PayloadFormat::Sealed) => FragmentPayload::Sealed(
                decode_bytes(&record.data)
                    .map_err(|_| VaultError::MalformedEnvelope("sealed payload is not base64"))?,
            ),
            Some(PayloadFormat::Legacy) => FragmentPayload::Legacy(record.data),
            None => FragmentPayload::Untagged(record.data),
        };
        Ok(Fragment {
            fragment_id: record.fragment_id,
            position: record.position,
            plaintext_size: record.size,
            plaintext_hash: record.fragment_hash,
            payload,
        })
    }
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_bytes(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{FragmentCipher, SymmetricKey};
    use crate::fragment::Fragmenter;

    #[test]
    fn sealed_fragments_keep_their_tag_through_json() {
        let cipher = FragmentCipher::new(SymmetricKey::generate());
        let fragments = Fragmenter::with_chunk_size(&cipher, 8)
            .expect("fragmenter")
            .fragment(b"transport encoding check")
            .expect("fragment");

        let records: Vec<FragmentRecord> = fragments.iter().map(FragmentRecord::from).collect();
        let json = serde_json::to_string(&records).expect("json");
        assert!(json.contains("\"format\":\"sealed\""));

        let parsed: Vec<FragmentRecord> = serde_json::from_str(&json).expect("parse");
        let back: Vec<Fragment> = parsed
            .into_iter()
            .map(Fragment::try_from)
            .collect::<Result<_, _>>()
            .expect("decode");
        assert_eq!(back, fragments);
    }

    #[test]
    fn records_without_format_are_untagged() {
        let json = format!(
            r#"{{"fragment_id":1,"fragment_hash":"{}","size":5,"position":0,"data":"aGVsbG8="}}"#,
            ContentId::of(b"hello")
        );
        let record: FragmentRecord = serde_json::from_str(&json).expect("parse");
        assert_eq!(record.format, None);
        let fragment = Fragment::try_from(record).expect("fragment");
        assert_eq!(fragment.payload, FragmentPayload::Untagged("aGVsbG8=".into()));
    }

    #[test]
    fn sealed_record_with_bad_base64_is_malformed() {
        let record = FragmentRecord {
            fragment_id: 1,
            fragment_hash: ContentId::of(b"x"),
            size: 1,
            position: 0,
            data: "***".into(),
            format: Some(PayloadFormat::Sealed),
        };
        assert!(matches!(
            Fragment::try_from(record),
            Err(VaultError::MalformedEnvelope(_))
        ));
    }
}
