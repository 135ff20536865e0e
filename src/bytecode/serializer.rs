//! Binary encoding of compiled programs.
//!
//! The stream is a sequence of tag-prefixed constants followed by a final
//! BYTECODE section holding the raw main instruction stream:
//!
//! - Integer:          `[01][8-byte varint slot]`
//! - String:           `[02][8-byte varint length][raw bytes]`
//! - CompiledFunction: `[03][8-byte varint ins length][ins bytes]`
//!                     `[8-byte varint numLocals][8-byte varint numParams]`
//! - Bytecode:         `[04][instruction bytes to end of stream]`
//!
//! Varint slots are zigzag LEB128, zero-padded to a fixed 8 bytes so every
//! length field has a known size. Decoding must advance the cursor on every
//! step; failing to make progress is a fatal decode error.

use std::rc::Rc;

use crate::bytecode::chunk::Bytecode;
use crate::error::{DecodeError, EncodeError};
use crate::object::{CompiledFunction, Value};

/// Type tags for serialized objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SerialType {
    Integer = 1,
    String = 2,
    CompiledFn = 3,
    Bytecode = 4,
}

/// Width of a fixed varint slot.
const SLOT: usize = 8;

impl Bytecode {
    /// Encode the constant pool followed by the main instruction stream.
    pub fn serialize(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();

        for constant in &self.constants {
            match constant {
                Value::Integer(n) => {
                    buf.push(SerialType::Integer as u8);
                    buf.extend_from_slice(&varint_slot(*n)?);
                }
                Value::String(s) => {
                    buf.push(SerialType::String as u8);
                    buf.extend_from_slice(&varint_slot(s.len() as i64)?);
                    buf.extend_from_slice(s.as_bytes());
                }
                Value::CompiledFunction(func) => {
                    buf.push(SerialType::CompiledFn as u8);
                    buf.extend_from_slice(&varint_slot(func.instructions.len() as i64)?);
                    buf.extend_from_slice(&func.instructions);
                    buf.extend_from_slice(&varint_slot(func.num_locals as i64)?);
                    buf.extend_from_slice(&varint_slot(func.num_parameters as i64)?);
                }
                other => return Err(EncodeError::UnsupportedConstant(other.type_name())),
            }
        }

        // the main instructions carry no length; they run to end of stream
        buf.push(SerialType::Bytecode as u8);
        buf.extend_from_slice(&self.instructions);
        Ok(buf)
    }

    /// Decode a stream produced by `serialize`.
    pub fn deserialize(bytes: &[u8]) -> Result<Bytecode, DecodeError> {
        let mut constants = Vec::new();
        let mut offset = 0;
        let mut previous = usize::MAX;

        while offset < bytes.len() {
            if offset == previous {
                return Err(DecodeError::NoProgress(offset));
            }
            previous = offset;

            match bytes[offset] {
                tag if tag == SerialType::Integer as u8 => {
                    let value = read_slot(bytes, offset + 1)?;
                    constants.push(Value::Integer(value));
                    offset += 1 + SLOT;
                }
                tag if tag == SerialType::String as u8 => {
                    let length = read_length(bytes, offset + 1)?;
                    let start = offset + 1 + SLOT;
                    let end = start
                        .checked_add(length)
                        .filter(|&end| end <= bytes.len())
                        .ok_or(DecodeError::Truncated(start))?;
                    let text = String::from_utf8_lossy(&bytes[start..end]).into_owned();
                    constants.push(Value::string(text));
                    offset = end;
                }
                tag if tag == SerialType::CompiledFn as u8 => {
                    let ins_length = read_length(bytes, offset + 1)?;
                    let ins_start = offset + 1 + SLOT;
                    let ins_end = ins_start
                        .checked_add(ins_length)
                        .filter(|&end| {
                            end.checked_add(2 * SLOT)
                                .is_some_and(|trailer| trailer <= bytes.len())
                        })
                        .ok_or(DecodeError::Truncated(ins_start))?;

                    let instructions = bytes[ins_start..ins_end].to_vec();
                    let num_locals = read_length(bytes, ins_end)?;
                    let num_parameters = read_length(bytes, ins_end + SLOT)?;

                    constants.push(Value::CompiledFunction(Rc::new(CompiledFunction::new(
                        instructions,
                        num_locals,
                        num_parameters,
                    ))));
                    offset = ins_end + 2 * SLOT;
                }
                tag if tag == SerialType::Bytecode as u8 => {
                    return Ok(Bytecode::new(bytes[offset + 1..].to_vec(), constants));
                }
                tag => return Err(DecodeError::UnknownTag { tag, offset }),
            }
        }

        Err(DecodeError::MissingBytecode)
    }
}

/// Encode a value as zigzag LEB128 into a fixed 8-byte slot.
fn varint_slot(value: i64) -> Result<[u8; SLOT], EncodeError> {
    let mut buf = [0u8; 10];
    let written = put_varint(&mut buf, value);
    if written > SLOT {
        return Err(EncodeError::VarintOverflow(value));
    }
    let mut slot = [0u8; SLOT];
    slot[..written].copy_from_slice(&buf[..written]);
    Ok(slot)
}

/// Read the 8-byte varint slot beginning at `offset`.
fn read_slot(bytes: &[u8], offset: usize) -> Result<i64, DecodeError> {
    let end = offset
        .checked_add(SLOT)
        .filter(|&end| end <= bytes.len())
        .ok_or(DecodeError::Truncated(offset))?;
    let (value, _) = read_varint(&bytes[offset..end]).ok_or(DecodeError::BadVarint(offset))?;
    Ok(value)
}

/// Read a varint slot that must hold a non-negative length.
fn read_length(bytes: &[u8], offset: usize) -> Result<usize, DecodeError> {
    let value = read_slot(bytes, offset)?;
    usize::try_from(value).map_err(|_| DecodeError::BadVarint(offset))
}

/// Write `value` as zigzag LEB128, returning the number of bytes written.
/// The buffer must hold at least 10 bytes.
pub(crate) fn put_varint(buf: &mut [u8], value: i64) -> usize {
    // zigzag: small magnitudes of either sign take few bytes
    let mut encoded = ((value << 1) ^ (value >> 63)) as u64;
    let mut written = 0;

    loop {
        let byte = (encoded & 0x7f) as u8;
        encoded >>= 7;
        if encoded == 0 {
            buf[written] = byte;
            written += 1;
            return written;
        }
        buf[written] = byte | 0x80;
        written += 1;
    }
}

/// Read a zigzag LEB128 value. Returns the value and the number of bytes
/// consumed, or `None` when the continuation bits run past the slice.
pub(crate) fn read_varint(bytes: &[u8]) -> Option<(i64, usize)> {
    let mut encoded: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        encoded |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            let value = ((encoded >> 1) as i64) ^ -((encoded & 1) as i64);
            return Some((value, i + 1));
        }
        shift += 7;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::instruction::{make, OpCode};

    fn sample_bytecode() -> Bytecode {
        let func = CompiledFunction::new(
            [
                make(OpCode::GetLocal, &[0]),
                make(OpCode::ReturnValue, &[]),
            ]
            .concat(),
            1,
            1,
        );

        let instructions = [
            make(OpCode::Constant, &[0]),
            make(OpCode::Constant, &[1]),
            make(OpCode::Add, &[]),
            make(OpCode::Closure, &[3, 0]),
            make(OpCode::Pop, &[]),
        ]
        .concat();

        Bytecode::new(
            instructions,
            vec![
                Value::Integer(34),
                Value::Integer(-35),
                Value::string("monkey"),
                Value::CompiledFunction(Rc::new(func)),
            ],
        )
    }

    #[test]
    fn test_varint_roundtrip() {
        for value in [0i64, 1, -1, 63, -64, 300, -300, i64::MAX, i64::MIN] {
            let mut buf = [0u8; 10];
            let written = put_varint(&mut buf, value);
            let (decoded, read) = read_varint(&buf[..written]).unwrap();
            assert_eq!(decoded, value, "roundtrip of {}", value);
            assert_eq!(read, written);
        }
    }

    #[test]
    fn test_serialize_roundtrip() {
        let bytecode = sample_bytecode();
        let bytes = bytecode.serialize().expect("encode error");
        let decoded = Bytecode::deserialize(&bytes).expect("decode error");

        assert_eq!(decoded.instructions, bytecode.instructions);
        assert_eq!(decoded.constants, bytecode.constants);
    }

    #[test]
    fn test_serialized_stream_layout() {
        let bytecode = Bytecode::new(vec![OpCode::Null as u8], vec![Value::Integer(1)]);
        let bytes = bytecode.serialize().unwrap();

        // tag + 8-byte slot, then the bytecode tag and the raw stream
        assert_eq!(bytes[0], SerialType::Integer as u8);
        assert_eq!(bytes.len(), 1 + 8 + 1 + 1);
        assert_eq!(bytes[9], SerialType::Bytecode as u8);
        assert_eq!(bytes[10], OpCode::Null as u8);
    }

    #[test]
    fn test_unknown_tag_is_fatal() {
        let err = Bytecode::deserialize(&[0xff]);
        assert!(matches!(err, Err(DecodeError::UnknownTag { tag: 0xff, .. })));
    }

    #[test]
    fn test_truncated_string_is_fatal() {
        let bytecode = Bytecode::new(vec![], vec![Value::string("hello world")]);
        let bytes = bytecode.serialize().unwrap();
        let err = Bytecode::deserialize(&bytes[..10]);
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_bytecode_section_is_fatal() {
        let bytecode = Bytecode::new(vec![], vec![Value::Integer(7)]);
        let mut bytes = bytecode.serialize().unwrap();
        bytes.pop(); // drop the instruction stream
        bytes.pop(); // drop the BYTECODE tag
        assert!(matches!(
            Bytecode::deserialize(&bytes),
            Err(DecodeError::MissingBytecode)
        ));
    }

    #[test]
    fn test_unsupported_constant_is_an_encode_error() {
        let bytecode = Bytecode::new(vec![], vec![Value::Boolean(true)]);
        assert!(matches!(
            bytecode.serialize(),
            Err(EncodeError::UnsupportedConstant("Boolean"))
        ));
    }

    #[test]
    fn test_huge_integer_is_an_encode_error() {
        let bytecode = Bytecode::new(vec![], vec![Value::Integer(i64::MAX)]);
        assert!(matches!(
            bytecode.serialize(),
            Err(EncodeError::VarintOverflow(_))
        ));
    }
}
