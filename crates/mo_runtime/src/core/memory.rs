//! Script slot memory: the interpreter stack and the global variable area.
//!
//! Each region is a vector of slots plus a byte area. A slot either holds a value directly
//! (a scalar, an object reference, ...) or is a `Value::Data` that names a run of bytes in
//! the region's byte area, which is how structs and fixed arrays are laid out.

use std::fmt;
use std::ops::Range;

use super::value::Value;
use crate::errors::AccessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Stack,
    Globals,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Stack => f.write_str("stack"),
            Region::Globals => f.write_str("globals"),
        }
    }
}

pub struct SlotStore {
    region: Region,
    slots: Vec<Value>,
    data: Vec<u8>,
}

impl SlotStore {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            slots: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push(&mut self, value: Value) -> u32 {
        let slot = self.slots.len() as u32;
        self.slots.push(value);
        slot
    }

    /// Reserves `len` zeroed bytes and pushes a slot naming them.
    pub fn push_data(&mut self, len: usize) -> u32 {
        let at = self.data.len() as i32;
        self.data.resize(self.data.len() + len, 0);
        self.push(Value::Data {
            region: self.region,
            at,
        })
    }

    /// Pops the top slot; a data slot gives its bytes back as well.
    pub fn pop(&mut self) -> Option<Value> {
        let value = self.slots.pop()?;
        if let Value::Data { at, .. } = value {
            if at >= 0 && (at as usize) <= self.data.len() {
                self.data.truncate(at as usize);
            }
        }
        Some(value)
    }

    pub fn truncate(&mut self, len: usize) {
        while self.slots.len() > len {
            self.pop();
        }
    }

    pub fn get(&self, slot: u32) -> Option<&Value> {
        self.slots.get(slot as usize)
    }

    pub fn set(&mut self, slot: u32, value: Value) -> Result<(), AccessError> {
        let region = self.region;
        let entry = self
            .slots
            .get_mut(slot as usize)
            .ok_or(AccessError::NoSuchSlot { region, slot })?;
        *entry = value;
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, at: i64, width: usize) -> Result<Range<usize>, AccessError> {
        match usize::try_from(at) {
            Ok(start) if start + width <= self.data.len() => Ok(start..start + width),
            _ => Err(AccessError::OutOfBounds {
                region: self.region,
                at,
                width,
            }),
        }
    }

    fn read_array<const N: usize>(&self, at: i64) -> Result<[u8; N], AccessError> {
        let range = self.range(at, N)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.data[range]);
        Ok(buf)
    }

    fn write_slice(&mut self, at: i64, bytes: &[u8]) -> Result<(), AccessError> {
        let range = self.range(at, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_u8(&self, at: i64) -> Result<u8, AccessError> {
        Ok(self.read_array::<1>(at)?[0])
    }

    pub fn read_i16(&self, at: i64) -> Result<i16, AccessError> {
        self.read_array(at).map(i16::from_le_bytes)
    }

    pub fn read_i32(&self, at: i64) -> Result<i32, AccessError> {
        self.read_array(at).map(i32::from_le_bytes)
    }

    pub fn read_f32(&self, at: i64) -> Result<f32, AccessError> {
        self.read_array(at).map(f32::from_le_bytes)
    }

    pub fn write_u8(&mut self, at: i64, value: u8) -> Result<(), AccessError> {
        self.write_slice(at, &[value])
    }

    pub fn write_i16(&mut self, at: i64, value: i16) -> Result<(), AccessError> {
        self.write_slice(at, &value.to_le_bytes())
    }

    pub fn write_i32(&mut self, at: i64, value: i32) -> Result<(), AccessError> {
        self.write_slice(at, &value.to_le_bytes())
    }

    pub fn write_f32(&mut self, at: i64, value: f32) -> Result<(), AccessError> {
        self.write_slice(at, &value.to_le_bytes())
    }
}

/// Both slot regions an interpreter reads and writes through.
pub struct ScriptMemory {
    pub stack: SlotStore,
    pub globals: SlotStore,
}

impl ScriptMemory {
    pub fn new() -> Self {
        Self {
            stack: SlotStore::new(Region::Stack),
            globals: SlotStore::new(Region::Globals),
        }
    }

    pub fn region(&self, region: Region) -> &SlotStore {
        match region {
            Region::Stack => &self.stack,
            Region::Globals => &self.globals,
        }
    }

    pub fn region_mut(&mut self, region: Region) -> &mut SlotStore {
        match region {
            Region::Stack => &mut self.stack,
            Region::Globals => &mut self.globals,
        }
    }
}

impl Default for ScriptMemory {
    fn default() -> Self {
        Self::new()
    }
}
