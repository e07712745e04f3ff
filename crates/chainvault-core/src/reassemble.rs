use tracing::debug;

use crate::codec::decode_bytes;
use crate::crypto::FragmentCipher;
use crate::error::VaultError;
use crate::fragment::{Fragment, FragmentPayload};

/// Stitches a set of fragments back into candidate bytes.
///
/// The output is not validated; pair it with [`crate::verify::verify`].
#[derive(Clone, Copy, Debug)]
pub struct Reassembler<'a> {
    cipher: &'a FragmentCipher,
}

impl<'a> Reassembler<'a> {
    pub fn new(cipher: &'a FragmentCipher) -> Self {
        Self { cipher }
    }

    /// Sort `fragments` by position, recover each plaintext and concatenate.
    ///
    /// Caller order is ignored. A strict subset of a content's fragments
    /// produces a shorter, different byte sequence, not the original with
    /// holes. Recorded plaintext sizes are never trusted for allocation.
    pub fn reassemble<'f, I>(&self, fragments: I) -> Result<Vec<u8>, VaultError>
    where
        I: IntoIterator<Item = &'f Fragment>,
    {
        let mut ordered: Vec<&Fragment> = fragments.into_iter().collect();
        ordered.sort_by_key(|fragment| fragment.position);

        let mut combined = Vec::new();
        for fragment in ordered {
            combined.extend_from_slice(&self.recover(fragment)?);
        }
        Ok(combined)
    }

    /// Plaintext of a single fragment, dispatched on its payload format.
    pub fn recover(&self, fragment: &Fragment) -> Result<Vec<u8>, VaultError> {
        match &fragment.payload {
            FragmentPayload::Sealed(sealed) => self
                .cipher
                .decrypt(sealed)
                .map_err(|err| unrecoverable(fragment, err.to_string())),
            FragmentPayload::Legacy(text) => decode_bytes(text)
                .map_err(|err| unrecoverable(fragment, format!("legacy decode: {err}"))),
            FragmentPayload::Untagged(text) => self.recover_untagged(fragment, text),
        }
    }

    /// Records without a format tag are tried as sealed envelopes first. The
    /// legacy reading is used only when that attempt fails.
    fn recover_untagged(&self, fragment: &Fragment, text: &str) -> Result<Vec<u8>, VaultError> {
        let raw = decode_bytes(text).map_err(|err| {
            unrecoverable(
                fragment,
                format!("payload is neither an envelope nor a legacy chunk: {err}"),
            )
        })?;
        match self.cipher.decrypt(&raw) {
            Ok(plain) => Ok(plain),
            Err(err) if err.is_envelope_error() => {
                debug!(
                    fragment_id = fragment.fragment_id,
                    position = fragment.position,
                    cause = %err,
                    "untagged fragment did not open, using legacy plain decode"
                );
                Ok(raw)
            }
            Err(err) => Err(unrecoverable(fragment, err.to_string())),
        }
    }
}

fn unrecoverable(fragment: &Fragment, reason: String) -> VaultError {
    VaultError::FragmentUnrecoverable {
        fragment_id: fragment.fragment_id,
        position: fragment.position,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_bytes;
    use crate::crypto::{SymmetricKey, KEY_SIZE};
    use crate::fragment::Fragmenter;
    use crate::hash::ContentId;
    use crate::verify::{verify, Verdict};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn cipher() -> FragmentCipher {
        FragmentCipher::new(SymmetricKey::from_bytes([11u8; KEY_SIZE]))
    }

    fn fragment_of(id: u32, position: u64, chunk: &[u8], payload: FragmentPayload) -> Fragment {
        Fragment {
            fragment_id: id,
            position,
            plaintext_size: chunk.len() as u64,
            plaintext_hash: ContentId::of(chunk),
            payload,
        }
    }

    #[test]
    fn shuffled_input_reassembles_identically() {
        let cipher = cipher();
        let content: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let fragments = Fragmenter::with_chunk_size(&cipher, 700)
            .expect("fragmenter")
            .fragment(&content)
            .expect("fragment");

        let mut shuffled = fragments.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(42));

        let reassembler = Reassembler::new(&cipher);
        let sorted = reassembler.reassemble(&fragments).expect("sorted");
        let unsorted = reassembler.reassemble(&shuffled).expect("shuffled");
        assert_eq!(sorted, unsorted);
        assert_eq!(sorted, content);
    }

    #[test]
    fn mixed_format_sets_are_tolerated() {
        let cipher = cipher();
        let fragments = vec![
            fragment_of(
                1,
                0,
                b"hello ",
                FragmentPayload::Sealed(cipher.encrypt(b"hello ").expect("seal")),
            ),
            fragment_of(
                2,
                6,
                b"legacy ",
                FragmentPayload::Legacy(encode_bytes(b"legacy ")),
            ),
            fragment_of(
                3,
                13,
                b"world",
                FragmentPayload::Untagged(encode_bytes(b"world")),
            ),
            fragment_of(
                4,
                18,
                b"!",
                FragmentPayload::Untagged(encode_bytes(&cipher.encrypt(b"!").expect("seal"))),
            ),
        ];
        let out = Reassembler::new(&cipher).reassemble(&fragments).expect("reassemble");
        assert_eq!(out, b"hello legacy world!");
    }

    #[test]
    fn tampered_sealed_fragment_never_falls_back() {
        let cipher = cipher();
        let mut fragments = Fragmenter::with_chunk_size(&cipher, 4)
            .expect("fragmenter")
            .fragment(b"abcdefghij")
            .expect("fragment");
        if let FragmentPayload::Sealed(sealed) = &mut fragments[1].payload {
            sealed[30] ^= 0x80;
        }
        let err = Reassembler::new(&cipher)
            .reassemble(&fragments)
            .expect_err("tampered envelope must fail");
        match err {
            VaultError::FragmentUnrecoverable {
                fragment_id,
                position,
                ..
            } => {
                assert_eq!(fragment_id, 2);
                assert_eq!(position, 4);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn untagged_envelope_prefers_decryption_over_legacy_reading() {
        // A valid envelope is also valid base64 of arbitrary bytes; the legacy
        // reading must only be taken once opening has failed.
        let cipher = cipher();
        let sealed = cipher.encrypt(b"real plaintext").expect("seal");
        let fragment = fragment_of(
            1,
            0,
            b"real plaintext",
            FragmentPayload::Untagged(encode_bytes(&sealed)),
        );
        let recovered = Reassembler::new(&cipher).recover(&fragment).expect("recover");
        assert_eq!(recovered, b"real plaintext");
        assert_ne!(recovered, sealed);
    }

    #[test]
    fn tampered_untagged_envelope_is_caught_by_integrity_check() {
        let cipher = cipher();
        let content = b"untagged tamper";
        let mut sealed = cipher.encrypt(content).expect("seal");
        sealed[3] ^= 0x01;
        let fragment = fragment_of(1, 0, content, FragmentPayload::Untagged(encode_bytes(&sealed)));

        // Opening fails, so the legacy reading yields the raw envelope bytes,
        // which cannot hash to the original address.
        let candidate = Reassembler::new(&cipher)
            .reassemble([&fragment])
            .expect("legacy reading");
        assert_eq!(candidate, sealed);
        assert!(matches!(
            verify(&ContentId::of(content), &candidate),
            Verdict::Mismatch { .. }
        ));
    }

    #[test]
    fn corrupt_recorded_sizes_do_not_drive_allocation() {
        let cipher = cipher();
        let mut fragments = Fragmenter::with_chunk_size(&cipher, 4)
            .expect("fragmenter")
            .fragment(b"abcdefgh")
            .expect("fragment");
        fragments[0].plaintext_size = u64::MAX / 2;
        fragments[1].plaintext_size = u64::MAX;

        let out = Reassembler::new(&cipher).reassemble(&fragments).expect("reassemble");
        assert_eq!(out, b"abcdefgh");
        assert_eq!(fragments[1].end(), u64::MAX);
    }

    #[test]
    fn undecodable_payloads_are_unrecoverable() {
        let cipher = cipher();
        let legacy = fragment_of(7, 0, b"x", FragmentPayload::Legacy("%%%".into()));
        let untagged = fragment_of(8, 1, b"y", FragmentPayload::Untagged("%%%".into()));
        let reassembler = Reassembler::new(&cipher);
        assert!(matches!(
            reassembler.recover(&legacy),
            Err(VaultError::FragmentUnrecoverable { fragment_id: 7, .. })
        ));
        assert!(matches!(
            reassembler.recover(&untagged),
            Err(VaultError::FragmentUnrecoverable { fragment_id: 8, .. })
        ));
    }

    #[test]
    fn missing_fragment_yields_mismatch() {
        let cipher = cipher();
        let content: Vec<u8> = (0..1000u32).map(|i| (i * 7) as u8).collect();
        let address = ContentId::of(&content);
        let fragments = Fragmenter::with_chunk_size(&cipher, 256)
            .expect("fragmenter")
            .fragment(&content)
            .expect("fragment");
        assert!(fragments.len() >= 2);

        for skip in 0..fragments.len() {
            let subset = fragments
                .iter()
                .enumerate()
                .filter(|(idx, _)| *idx != skip)
                .map(|(_, fragment)| fragment);
            let candidate = Reassembler::new(&cipher).reassemble(subset).expect("subset");
            assert!(candidate.len() < content.len());
            assert!(matches!(verify(&address, &candidate), Verdict::Mismatch { .. }));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn round_trip_verifies(
            content in proptest::collection::vec(any::<u8>(), 1..4096),
            chunk_size in 1usize..1024,
        ) {
            let cipher = cipher();
            let fragments = Fragmenter::with_chunk_size(&cipher, chunk_size)
                .expect("fragmenter")
                .fragment(&content)
                .expect("fragment");
            let candidate = Reassembler::new(&cipher).reassemble(&fragments).expect("reassemble");
            prop_assert_eq!(verify(&ContentId::of(&content), &candidate), Verdict::Ok);
        }

        #[test]
        fn reassembly_ignores_input_order(
            content in proptest::collection::vec(any::<u8>(), 1..2048),
            chunk_size in 1usize..256,
            seed in any::<u64>(),
        ) {
            let cipher = cipher();
            let fragments = Fragmenter::with_chunk_size(&cipher, chunk_size)
                .expect("fragmenter")
                .fragment(&content)
                .expect("fragment");
            let mut shuffled = fragments.clone();
            shuffled.shuffle(&mut StdRng::seed_from_u64(seed));
            let reassembler = Reassembler::new(&cipher);
            prop_assert_eq!(
                reassembler.reassemble(&shuffled).expect("shuffled"),
                reassembler.reassemble(&fragments).expect("sorted")
            );
        }
    }
}
