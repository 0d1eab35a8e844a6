use alloy::sol_types::SolValue;
use alloy_primitives::B256;
use thiserror::Error;

/// Length of a packed step input: uint64 trusted_height || bytes32 trusted_header.
pub const STEP_INPUT_LEN: usize = 40;

/// Length of a packed skip input: uint64 trusted_height || bytes32 trusted_header ||
/// uint64 target_height.
pub const SKIP_INPUT_LEN: usize = 48;

/// Length of every proof output: a single bytes32 header hash.
pub const HEADER_OUTPUT_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn expect_len(bytes: &[u8], expected: usize) -> Result<(), CodecError> {
    if bytes.len() != expected {
        return Err(CodecError::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

/// Input of the step function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInput {
    pub trusted_height: u64,
    pub trusted_header: B256,
}

impl StepInput {
    /// Packed encoding, as consumed by the prover.
    pub fn abi_encode_packed(&self) -> Vec<u8> {
        (self.trusted_height, self.trusted_header).abi_encode_packed()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        expect_len(bytes, STEP_INPUT_LEN)?;
        Ok(Self {
            trusted_height: read_u64(&bytes[0..8]),
            trusted_header: B256::from_slice(&bytes[8..40]),
        })
    }
}

/// Input of the skip function. Freeze requests reuse it with the conflict height as the
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipInput {
    pub trusted_height: u64,
    pub trusted_header: B256,
    pub target_height: u64,
}

impl SkipInput {
    pub fn abi_encode_packed(&self) -> Vec<u8> {
        (self.trusted_height, self.trusted_header, self.target_height).abi_encode_packed()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        expect_len(bytes, SKIP_INPUT_LEN)?;
        Ok(Self {
            trusted_height: read_u64(&bytes[0..8]),
            trusted_header: B256::from_slice(&bytes[8..40]),
            target_height: read_u64(&bytes[40..48]),
        })
    }
}

/// Decode the output of a step or skip proof: the header hash of the proven block.
pub fn decode_header_output(bytes: &[u8]) -> Result<B256, CodecError> {
    expect_len(bytes, HEADER_OUTPUT_LEN)?;
    Ok(B256::from_slice(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_input_layout() {
        let input = StepInput {
            trusted_height: 1000,
            trusted_header: B256::repeat_byte(0xab),
        };
        let encoded = input.abi_encode_packed();

        assert_eq!(encoded.len(), STEP_INPUT_LEN);
        assert_eq!(hex::encode(&encoded[..8]), "00000000000003e8");
        assert!(encoded[8..].iter().all(|b| *b == 0xab));
        assert_eq!(StepInput::decode(&encoded), Ok(input));
    }

    #[test]
    fn test_skip_input_layout() {
        let input = SkipInput {
            trusted_height: 1001,
            trusted_header: B256::repeat_byte(0x11),
            target_height: 1500,
        };
        let encoded = input.abi_encode_packed();

        assert_eq!(encoded.len(), SKIP_INPUT_LEN);
        assert_eq!(hex::encode(&encoded[..8]), "00000000000003e9");
        assert_eq!(hex::encode(&encoded[40..]), "00000000000005dc");
        assert_eq!(SkipInput::decode(&encoded), Ok(input));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(
            StepInput::decode(&[0u8; 48]),
            Err(CodecError::InvalidLength {
                expected: STEP_INPUT_LEN,
                actual: 48
            })
        );
        assert!(SkipInput::decode(&[0u8; 40]).is_err());
        assert!(decode_header_output(&[0u8; 64]).is_err());
        assert_eq!(
            decode_header_output(&[7u8; 32]),
            Ok(B256::repeat_byte(7))
        );
    }
}
