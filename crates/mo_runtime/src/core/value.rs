//! Value/address abstraction.
//!
//! A `Value` describes a place the interpreter can read or write: an immediate, a slot on
//! the stack or in the globals, an element of a static native array, or a field of a managed
//! object. Reads and writes are width-polymorphic: a place written at one width may be read
//! at another and is truncated or widened instead of failing.
//!
//! Managed fields hold a generation-checked [`ObjectRef`], never the object itself. The
//! handle is resolved through the pool for the duration of a single access.

use std::rc::Rc;

use mo_core::{Handle, NativeAddress, ObjectRef, Scalar};

use super::manager::{FieldLocation, StaticArray, TypeManager};
use super::memory::{Region, ScriptMemory};
use super::pool::ManagedObjectPool;
use crate::errors::AccessError;

#[derive(Debug, Clone, Default)]
pub enum Value {
    /// An invalidated slot.
    #[default]
    Undefined,
    Immediate(Scalar),
    /// Raw bytes in a slot region, starting at `at`.
    Data { region: Region, at: i32 },
    StackSlot { slot: u32, offset: i32 },
    GlobalSlot { slot: u32, offset: i32 },
    StaticArrayElement {
        array: Rc<StaticArray>,
        base: NativeAddress,
        offset: i32,
    },
    ManagedField { object: ObjectRef, offset: i32 },
}

/// Where an access finally lands.
enum Target<'a> {
    Scalar(Scalar),
    ScalarSlot { region: Region, slot: u32 },
    Bytes { region: Region, at: i64 },
    Field(FieldRef<'a>),
}

/// A flattened field of a managed object or static array element.
///
/// Borrowed from the pool or the value it came from, so it cannot outlive them.
#[derive(Clone, Copy)]
pub struct FieldRef<'a> {
    manager: &'a dyn TypeManager,
    pub location: FieldLocation,
}

impl<'a> FieldRef<'a> {
    pub fn manager(&self) -> &'a dyn TypeManager {
        self.manager
    }

    pub fn read_u8(&self) -> u8 {
        self.manager.read_u8(self.location.address, self.location.offset)
    }

    pub fn read_i16(&self) -> i16 {
        self.manager.read_i16(self.location.address, self.location.offset)
    }

    pub fn read_i32(&self) -> i32 {
        self.manager.read_i32(self.location.address, self.location.offset)
    }

    pub fn read_f32(&self) -> f32 {
        self.manager.read_f32(self.location.address, self.location.offset)
    }

    pub fn write_u8(&self, value: u8) {
        self.manager.write_u8(self.location.address, self.location.offset, value)
    }

    pub fn write_i16(&self, value: i16) {
        self.manager.write_i16(self.location.address, self.location.offset, value)
    }

    pub fn write_i32(&self, value: i32) {
        self.manager.write_i32(self.location.address, self.location.offset, value)
    }

    pub fn write_f32(&self, value: f32) {
        self.manager.write_f32(self.location.address, self.location.offset, value)
    }
}

/// Result of collapsing one level of slot indirection.
pub enum Direct<'a> {
    /// Nothing further to collapse.
    Value(Value),
    /// Raw bytes in a slot region.
    Bytes { region: Region, at: i64 },
    /// A managed object field, flattened by its type manager.
    Field(FieldRef<'a>),
}

impl Value {
    pub fn int(value: i32) -> Self {
        Value::Immediate(Scalar::Int(value))
    }

    pub fn float(value: f32) -> Self {
        Value::Immediate(Scalar::Float(value))
    }

    pub fn data(region: Region, at: i32) -> Self {
        Value::Data { region, at }
    }

    pub fn stack_slot(slot: u32, offset: i32) -> Self {
        Value::StackSlot { slot, offset }
    }

    pub fn global_slot(slot: u32, offset: i32) -> Self {
        Value::GlobalSlot { slot, offset }
    }

    pub fn static_array_element(array: Rc<StaticArray>, base: NativeAddress, offset: i32) -> Self {
        Value::StaticArrayElement {
            array,
            base,
            offset,
        }
    }

    /// A field of the object currently behind `handle`, or `None` for a stale handle.
    pub fn managed_field(pool: &ManagedObjectPool, handle: Handle, offset: i32) -> Option<Self> {
        let object = pool.object_ref(handle)?;
        Some(Value::ManagedField { object, offset })
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// The same place moved by `delta` bytes. Immediates and undefined values are returned
    /// unchanged.
    pub fn offset_by(&self, delta: i32) -> Value {
        match self {
            Value::Data { region, at } => Value::Data {
                region: *region,
                at: at.wrapping_add(delta),
            },
            Value::StackSlot { slot, offset } => Value::StackSlot {
                slot: *slot,
                offset: offset.wrapping_add(delta),
            },
            Value::GlobalSlot { slot, offset } => Value::GlobalSlot {
                slot: *slot,
                offset: offset.wrapping_add(delta),
            },
            Value::StaticArrayElement {
                array,
                base,
                offset,
            } => Value::StaticArrayElement {
                array: Rc::clone(array),
                base: *base,
                offset: offset.wrapping_add(delta),
            },
            Value::ManagedField { object, offset } => Value::ManagedField {
                object: *object,
                offset: offset.wrapping_add(delta),
            },
            other => other.clone(),
        }
    }

    fn slot_ref(&self) -> Option<(Region, u32, i32)> {
        match self {
            Value::StackSlot { slot, offset } => Some((Region::Stack, *slot, *offset)),
            Value::GlobalSlot { slot, offset } => Some((Region::Globals, *slot, *offset)),
            _ => None,
        }
    }

    fn slot_target<'m>(
        memory: &'m ScriptMemory,
        region: Region,
        slot: u32,
    ) -> Result<&'m Value, AccessError> {
        memory
            .region(region)
            .get(slot)
            .ok_or(AccessError::NoSuchSlot { region, slot })
    }

    fn read_target<'a>(
        &'a self,
        memory: &ScriptMemory,
        pool: &'a ManagedObjectPool,
    ) -> Result<Target<'a>, AccessError> {
        if let Some((region, slot, offset)) = self.slot_ref() {
            return match Self::slot_target(memory, region, slot)? {
                Value::Data { region, at } => Ok(Target::Bytes {
                    region: *region,
                    at: *at as i64 + offset as i64,
                }),
                Value::Immediate(scalar) => Ok(Target::Scalar(*scalar)),
                Value::Undefined => Err(AccessError::Undefined),
                _ => Err(AccessError::NotScalar),
            };
        }
        match self {
            Value::Immediate(scalar) => Ok(Target::Scalar(*scalar)),
            _ => self.place_target(pool),
        }
    }

    fn write_target<'a>(
        &'a self,
        memory: &ScriptMemory,
        pool: &'a ManagedObjectPool,
    ) -> Result<Target<'a>, AccessError> {
        if let Some((region, slot, offset)) = self.slot_ref() {
            return match Self::slot_target(memory, region, slot)? {
                Value::Data { region, at } => Ok(Target::Bytes {
                    region: *region,
                    at: *at as i64 + offset as i64,
                }),
                // Anything else is overwritten with the new scalar.
                _ => Ok(Target::ScalarSlot { region, slot }),
            };
        }
        match self {
            Value::Immediate(_) => Err(AccessError::NotAddressable),
            _ => self.place_target(pool),
        }
    }

    /// Targets that do not depend on slot memory.
    fn place_target<'a>(&'a self, pool: &'a ManagedObjectPool) -> Result<Target<'a>, AccessError> {
        match self {
            Value::Data { region, at } => Ok(Target::Bytes {
                region: *region,
                at: *at as i64,
            }),
            Value::StaticArrayElement {
                array,
                base,
                offset,
            } => {
                let index = array.element_index(*offset);
                if index < 0 || index >= array.count() {
                    return Err(AccessError::ElementOutOfRange {
                        index,
                        count: array.count(),
                    });
                }
                let (address, offset) = array.locate(*base, *offset);
                Ok(Target::Field(FieldRef {
                    manager: array.element_manager().as_ref(),
                    location: FieldLocation { address, offset },
                }))
            }
            Value::ManagedField { object, offset } => {
                let resolved = pool
                    .resolve(*object)
                    .ok_or(AccessError::StaleObject(object.handle))?;
                Ok(Target::Field(FieldRef {
                    manager: resolved.manager.as_ref(),
                    location: FieldLocation {
                        address: resolved.address,
                        offset: *offset,
                    },
                }))
            }
            Value::Undefined => Err(AccessError::Undefined),
            _ => Err(AccessError::NotAddressable),
        }
    }

    pub fn read_u8(&self, memory: &ScriptMemory, pool: &ManagedObjectPool) -> Result<u8, AccessError> {
        match self.read_target(memory, pool)? {
            Target::Scalar(scalar) => Ok(scalar.as_u8()),
            Target::Bytes { region, at } => memory.region(region).read_u8(at),
            Target::Field(field) => Ok(field.read_u8()),
            Target::ScalarSlot { .. } => Err(AccessError::NotScalar),
        }
    }

    pub fn read_i16(&self, memory: &ScriptMemory, pool: &ManagedObjectPool) -> Result<i16, AccessError> {
        match self.read_target(memory, pool)? {
            Target::Scalar(scalar) => Ok(scalar.as_i16()),
            Target::Bytes { region, at } => memory.region(region).read_i16(at),
            Target::Field(field) => Ok(field.read_i16()),
            Target::ScalarSlot { .. } => Err(AccessError::NotScalar),
        }
    }

    pub fn read_i32(&self, memory: &ScriptMemory, pool: &ManagedObjectPool) -> Result<i32, AccessError> {
        match self.read_target(memory, pool)? {
            Target::Scalar(scalar) => Ok(scalar.as_i32()),
            Target::Bytes { region, at } => memory.region(region).read_i32(at),
            Target::Field(field) => Ok(field.read_i32()),
            Target::ScalarSlot { .. } => Err(AccessError::NotScalar),
        }
    }

    pub fn read_f32(&self, memory: &ScriptMemory, pool: &ManagedObjectPool) -> Result<f32, AccessError> {
        match self.read_target(memory, pool)? {
            Target::Scalar(scalar) => Ok(scalar.as_f32()),
            Target::Bytes { region, at } => memory.region(region).read_f32(at),
            Target::Field(field) => Ok(field.read_f32()),
            Target::ScalarSlot { .. } => Err(AccessError::NotScalar),
        }
    }

    /// Writes a byte. A scalar slot takes it zero-extended.
    pub fn write_u8(
        &self,
        memory: &mut ScriptMemory,
        pool: &ManagedObjectPool,
        value: u8,
    ) -> Result<(), AccessError> {
        match self.write_target(memory, pool)? {
            Target::Bytes { region, at } => memory.region_mut(region).write_u8(at, value),
            Target::Field(field) => {
                field.write_u8(value);
                Ok(())
            }
            Target::ScalarSlot { region, slot } => memory
                .region_mut(region)
                .set(slot, Value::int(value as i32)),
            Target::Scalar(_) => Err(AccessError::NotAddressable),
        }
    }

    /// Writes a 16-bit integer. A scalar slot takes it sign-extended.
    pub fn write_i16(
        &self,
        memory: &mut ScriptMemory,
        pool: &ManagedObjectPool,
        value: i16,
    ) -> Result<(), AccessError> {
        match self.write_target(memory, pool)? {
            Target::Bytes { region, at } => memory.region_mut(region).write_i16(at, value),
            Target::Field(field) => {
                field.write_i16(value);
                Ok(())
            }
            Target::ScalarSlot { region, slot } => memory
                .region_mut(region)
                .set(slot, Value::int(value as i32)),
            Target::Scalar(_) => Err(AccessError::NotAddressable),
        }
    }

    pub fn write_i32(
        &self,
        memory: &mut ScriptMemory,
        pool: &ManagedObjectPool,
        value: i32,
    ) -> Result<(), AccessError> {
        match self.write_target(memory, pool)? {
            Target::Bytes { region, at } => memory.region_mut(region).write_i32(at, value),
            Target::Field(field) => {
                field.write_i32(value);
                Ok(())
            }
            Target::ScalarSlot { region, slot } => {
                memory.region_mut(region).set(slot, Value::int(value))
            }
            Target::Scalar(_) => Err(AccessError::NotAddressable),
        }
    }

    pub fn write_f32(
        &self,
        memory: &mut ScriptMemory,
        pool: &ManagedObjectPool,
        value: f32,
    ) -> Result<(), AccessError> {
        match self.write_target(memory, pool)? {
            Target::Bytes { region, at } => memory.region_mut(region).write_f32(at, value),
            Target::Field(field) => {
                field.write_f32(value);
                Ok(())
            }
            Target::ScalarSlot { region, slot } => {
                memory.region_mut(region).set(slot, Value::float(value))
            }
            Target::Scalar(_) => Err(AccessError::NotAddressable),
        }
    }

    /// Collapses one level of slot indirection (offsets add up) and flattens a managed
    /// field into a direct field reference. Used on numeric hot paths.
    pub fn direct<'a>(
        &'a self,
        memory: &ScriptMemory,
        pool: &'a ManagedObjectPool,
    ) -> Result<Direct<'a>, AccessError> {
        let collapsed = match self.slot_ref() {
            Some((region, slot, offset)) => {
                Self::slot_target(memory, region, slot)?.offset_by(offset)
            }
            None => self.clone(),
        };
        match collapsed {
            Value::Data { region, at } => Ok(Direct::Bytes {
                region,
                at: at as i64,
            }),
            Value::ManagedField { object, offset } => {
                let resolved = pool
                    .resolve(object)
                    .ok_or(AccessError::StaleObject(object.handle))?;
                let location = resolved.manager.field_ref(resolved.address, offset);
                Ok(Direct::Field(FieldRef {
                    manager: resolved.manager.as_ref(),
                    location,
                }))
            }
            other => Ok(Direct::Value(other)),
        }
    }

    /// Collapses one level of slot indirection but keeps an object reference as an object
    /// reference, for callers that must still know they look at an object.
    pub fn direct_object(&self, memory: &ScriptMemory) -> Result<Value, AccessError> {
        match self.slot_ref() {
            Some((region, slot, offset)) => {
                Ok(Self::slot_target(memory, region, slot)?.offset_by(offset))
            }
            None => Ok(self.clone()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Immediate(a), Value::Immediate(b)) => a == b,
            (Value::Data { region: r1, at: a1 }, Value::Data { region: r2, at: a2 }) => {
                r1 == r2 && a1 == a2
            }
            (
                Value::StackSlot { slot: s1, offset: o1 },
                Value::StackSlot { slot: s2, offset: o2 },
            ) => s1 == s2 && o1 == o2,
            (
                Value::GlobalSlot { slot: s1, offset: o1 },
                Value::GlobalSlot { slot: s2, offset: o2 },
            ) => s1 == s2 && o1 == o2,
            (
                Value::StaticArrayElement {
                    array: a1,
                    base: b1,
                    offset: o1,
                },
                Value::StaticArrayElement {
                    array: a2,
                    base: b2,
                    offset: o2,
                },
            ) => Rc::ptr_eq(a1, a2) && b1 == b2 && o1 == o2,
            (
                Value::ManagedField { object: x1, offset: o1 },
                Value::ManagedField { object: x2, offset: o2 },
            ) => x1 == x2 && o1 == o2,
            _ => false,
        }
    }
}

impl Eq for Value {}
