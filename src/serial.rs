//! Binary serialization and deserialization of compiled rulesets.
//!
//! A compiled [`RuleSet`](crate::RuleSet) carries its rules in evaluation
//! order, every formula action already parsed, and the engine config it was
//! compiled with. This module persists all of it so a service can skip
//! re-parsing rule files at startup.
//!
//! ## Wire Format
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic bytes: b"VALU"
//! 4       2     Format version (u16, little-endian)
//! 6       2     Engine version (u16, little-endian)
//! 8       4     Flags (u32, bit 0 = stop on first match)
//! 12      4     Payload length in bytes (u32, little-endian)
//! 16      16    BLAKE3 hash of the payload (truncated to 16 bytes)
//! 32..    var   Bincode-encoded payload
//! ```
//!
//! The format version must match exactly; the engine version is
//! informational.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::PreparedFormula;
use crate::compile::compile_patterns;
use crate::config::EngineConfig;
use crate::evaluate::RuleEvaluator;
use crate::types::{ActionKind, CompiledRule, RuleSet};

const MAGIC: &[u8; 4] = b"VALU";
const FORMAT_VERSION: u16 = 1;
const ENGINE_VERSION: u16 = 1;
const HEADER_SIZE: usize = 32;
const FLAG_STOP_ON_FIRST_MATCH: u32 = 1;

/// Errors that can occur when serializing a [`RuleSet`](crate::RuleSet) to bytes.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to encode ruleset: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("I/O error during serialization: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when deserializing a [`RuleSet`](crate::RuleSet) from bytes.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("not a valuator binary: invalid magic bytes")]
    BadMagic,

    #[error("incompatible format version: blob is v{blob}, engine supports v{supported}")]
    IncompatibleVersion { blob: u16, supported: u16 },

    #[error("integrity check failed: BLAKE3 checksum mismatch")]
    ChecksumMismatch,

    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("failed to decode payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("I/O error during deserialization: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedRuleSet {
    metadata: RuleSetMetadata,
    config: EngineConfig,
    rules: Vec<CompiledRule>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RuleSetMetadata {
    rule_count: usize,
    action_count: usize,
    source_digest: Option<[u8; 32]>,
}

/// Flags word and payload for `ruleset`.
fn ruleset_to_serialized(ruleset: &RuleSet, source_text: Option<&str>) -> (u32, SerializedRuleSet) {
    let source_digest = source_text.map(|s| *blake3::hash(s.as_bytes()).as_bytes());
    let flags = if ruleset.stop_on_first_match {
        FLAG_STOP_ON_FIRST_MATCH
    } else {
        0
    };

    let serialized = SerializedRuleSet {
        metadata: RuleSetMetadata {
            rule_count: ruleset.rules.len(),
            action_count: ruleset.rules.iter().map(|c| c.rule.actions.len()).sum(),
            source_digest,
        },
        config: ruleset.config().clone(),
        rules: ruleset.rules.clone(),
    };
    (flags, serialized)
}

fn serialized_to_ruleset(
    flags: u32,
    mut ser: SerializedRuleSet,
) -> Result<RuleSet, DeserializeError> {
    validate(&ser)?;
    for compiled in &mut ser.rules {
        compiled.patterns = compile_patterns(&compiled.rule)
            .map_err(|e| DeserializeError::Validation(e.to_string()))?;
    }
    Ok(RuleSet {
        rules: ser.rules,
        evaluator: RuleEvaluator::with_config(ser.config),
        stop_on_first_match: flags & FLAG_STOP_ON_FIRST_MATCH != 0,
    })
}

fn validate(ser: &SerializedRuleSet) -> Result<(), DeserializeError> {
    let rule_count = ser.rules.len();
    if ser.metadata.rule_count != rule_count {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} rules but payload has {}",
            ser.metadata.rule_count, rule_count
        )));
    }
    let action_count: usize = ser.rules.iter().map(|c| c.rule.actions.len()).sum();
    if ser.metadata.action_count != action_count {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} actions but payload has {}",
            ser.metadata.action_count, action_count
        )));
    }

    ser.config
        .validate()
        .map_err(|e| DeserializeError::Validation(e.to_string()))?;

    let mut ids = HashSet::new();
    for compiled in &ser.rules {
        let id = compiled.rule.id.as_str();
        if id.trim().is_empty() {
            return Err(DeserializeError::Validation("rule with empty id".to_owned()));
        }
        if !ids.insert(id) {
            return Err(DeserializeError::Validation(format!("duplicate rule id '{id}'")));
        }
        validate_formulas(compiled, ser.config.max_nesting_depth)?;
    }

    for window in ser.rules.windows(2) {
        if window[0].rule.evaluation_order > window[1].rule.evaluation_order {
            return Err(DeserializeError::Validation(
                "rules not sorted by ascending evaluation_order".to_owned(),
            ));
        }
    }

    Ok(())
}

fn validate_formulas(compiled: &CompiledRule, max_depth: usize) -> Result<(), DeserializeError> {
    let rule = &compiled.rule;
    if compiled.formulas.len() != rule.actions.len() {
        return Err(DeserializeError::Validation(format!(
            "rule '{}' has {} actions but {} prepared formulas",
            rule.id,
            rule.actions.len(),
            compiled.formulas.len()
        )));
    }

    for (i, (action, prepared)) in rule.actions.iter().zip(&compiled.formulas).enumerate() {
        let expects_formula = action.kind == ActionKind::Formula && action.formula.is_some();
        match prepared {
            PreparedFormula::NotApplicable if expects_formula => {
                return Err(DeserializeError::Validation(format!(
                    "rule '{}' action {i} is a formula but was not prepared",
                    rule.id
                )));
            }
            PreparedFormula::Parsed(_) | PreparedFormula::Invalid(_) if !expects_formula => {
                return Err(DeserializeError::Validation(format!(
                    "rule '{}' action {i} carries a formula it does not use",
                    rule.id
                )));
            }
            PreparedFormula::Parsed(expr) if expr.depth() > max_depth => {
                return Err(DeserializeError::Validation(format!(
                    "rule '{}' action {i} formula depth {} exceeds {max_depth}",
                    rule.id,
                    expr.depth()
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn write_header(buf: &mut Vec<u8>, flags: u32, payload: &[u8]) {
    let hash = blake3::hash(payload);
    let hash_bytes = hash.as_bytes();

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&ENGINE_VERSION.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    #[allow(clippy::cast_possible_truncation)] // payload will never exceed 4 GiB
    let payload_len = payload.len() as u32;
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&hash_bytes[..16]);
}

struct Header {
    format_version: u16,
    flags: u32,
    payload_len: u32,
    hash: [u8; 16],
}

#[allow(clippy::cast_possible_truncation)] // HEADER_SIZE is 32, always fits in u32
fn read_header(bytes: &[u8]) -> Result<Header, DeserializeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DeserializeError::LengthMismatch {
            expected: HEADER_SIZE as u32,
            actual: bytes.len(),
        });
    }

    if &bytes[0..4] != MAGIC {
        return Err(DeserializeError::BadMagic);
    }

    // bytes[6..8] is the engine version, informational only
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&bytes[16..32]);

    Ok(Header {
        format_version: u16::from_le_bytes([bytes[4], bytes[5]]),
        flags: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        payload_len: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        hash,
    })
}

pub(crate) fn encode(
    ruleset: &RuleSet,
    source_text: Option<&str>,
) -> Result<Vec<u8>, SerializeError> {
    let (flags, serialized) = ruleset_to_serialized(ruleset, source_text);
    encode_serialized(flags, &serialized)
}

fn encode_serialized(flags: u32, serialized: &SerializedRuleSet) -> Result<Vec<u8>, SerializeError> {
    let payload = bincode::serde::encode_to_vec(serialized, bincode::config::standard())?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_header(&mut buf, flags, &payload);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Check the header, payload length and checksum, then decode the payload.
fn decode_checked(bytes: &[u8]) -> Result<(u32, SerializedRuleSet), DeserializeError> {
    let header = read_header(bytes)?;

    if header.format_version != FORMAT_VERSION {
        return Err(DeserializeError::IncompatibleVersion {
            blob: header.format_version,
            supported: FORMAT_VERSION,
        });
    }

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != header.payload_len as usize {
        return Err(DeserializeError::LengthMismatch {
            expected: header.payload_len,
            actual: payload.len(),
        });
    }

    let computed_hash = blake3::hash(payload);
    if computed_hash.as_bytes()[..16] != header.hash {
        return Err(DeserializeError::ChecksumMismatch);
    }

    let (serialized, _): (SerializedRuleSet, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
    Ok((header.flags, serialized))
}

pub(crate) fn decode(bytes: &[u8]) -> Result<RuleSet, DeserializeError> {
    let (flags, serialized) = decode_checked(bytes)?;
    serialized_to_ruleset(flags, serialized)
}

/// The BLAKE3 digest of the source text a blob was built from, if one was
/// recorded. Compare against the current rule file to decide whether a
/// cached blob is stale.
///
/// # Errors
///
/// As [`RuleSet::from_bytes`](crate::RuleSet::from_bytes), except that the
/// decoded rules are not validated.
pub fn source_digest(bytes: &[u8]) -> Result<Option<[u8; 32]>, DeserializeError> {
    let (_, serialized) = decode_checked(bytes)?;
    Ok(serialized.metadata.source_digest)
}
