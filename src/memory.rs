//! Memory and the memory-mapped bus.
//!
//! Everything the processor can address implements [Device]: plain [Memory], peripherals
//! such as the [screen](crate::device::ScreenDevice) and the [MemoryMapper] that composes
//! them into a single 16-bit address space.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::MemoryError;

/// Trait for implementing memory and memory-mapped peripherals.
///
/// Addresses are relative to the start of the region the device is mapped at.
/// 16-bit values are big-endian.
pub trait Device {
    /// Reads the byte at `addr`.
    fn get_u8(&mut self, addr: u16) -> Result<u8, MemoryError>;

    /// Reads the 16-bit value whose high byte is at `addr`.
    fn get_u16(&mut self, addr: u16) -> Result<u16, MemoryError>;

    /// Overwrites the byte at `addr`.
    fn set_u8(&mut self, addr: u16, value: u8) -> Result<(), MemoryError>;

    /// Overwrites the 16-bit value whose high byte is at `addr`.
    fn set_u16(&mut self, addr: u16, value: u16) -> Result<(), MemoryError>;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn get_u8(&mut self, addr: u16) -> Result<u8, MemoryError> {
        (**self).get_u8(addr)
    }

    fn get_u16(&mut self, addr: u16) -> Result<u16, MemoryError> {
        (**self).get_u16(addr)
    }

    fn set_u8(&mut self, addr: u16, value: u8) -> Result<(), MemoryError> {
        (**self).set_u8(addr, value)
    }

    fn set_u16(&mut self, addr: u16, value: u16) -> Result<(), MemoryError> {
        (**self).set_u16(addr, value)
    }
}

/// Shared handle to a device, so that the owner can keep inspecting a device after
/// mapping it.
impl<D: Device + ?Sized> Device for Rc<RefCell<D>> {
    fn get_u8(&mut self, addr: u16) -> Result<u8, MemoryError> {
        self.borrow_mut().get_u8(addr)
    }

    fn get_u16(&mut self, addr: u16) -> Result<u16, MemoryError> {
        self.borrow_mut().get_u16(addr)
    }

    fn set_u8(&mut self, addr: u16, value: u8) -> Result<(), MemoryError> {
        self.borrow_mut().set_u8(addr, value)
    }

    fn set_u16(&mut self, addr: u16, value: u16) -> Result<(), MemoryError> {
        self.borrow_mut().set_u16(addr, value)
    }
}

/// A zero-initialized, fixed-size, byte-addressable buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Memory {
    inner: Vec<u8>,
}

impl Memory {
    pub fn new(size: usize) -> Memory {
        Memory {
            inner: vec![0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.inner.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner[..]
    }

    fn check(&self, offset: usize, width: usize) -> Result<(), MemoryError> {
        if offset + width > self.inner.len() {
            return Err(MemoryError::OutOfBounds {
                offset,
                size: self.inner.len(),
            });
        }

        Ok(())
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, MemoryError> {
        self.check(offset, 1)?;
        Ok(self.inner[offset])
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16, MemoryError> {
        self.check(offset, 2)?;
        Ok(u16::from_be_bytes([self.inner[offset], self.inner[offset + 1]]))
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) -> Result<(), MemoryError> {
        self.check(offset, 1)?;
        self.inner[offset] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) -> Result<(), MemoryError> {
        self.check(offset, 2)?;
        let [high, low] = value.to_be_bytes();
        self.inner[offset] = high;
        self.inner[offset + 1] = low;
        Ok(())
    }
}

impl Device for Memory {
    fn get_u8(&mut self, addr: u16) -> Result<u8, MemoryError> {
        self.read_u8(addr as usize)
    }

    fn get_u16(&mut self, addr: u16) -> Result<u16, MemoryError> {
        self.read_u16(addr as usize)
    }

    fn set_u8(&mut self, addr: u16, value: u8) -> Result<(), MemoryError> {
        self.write_u8(addr as usize, value)
    }

    fn set_u16(&mut self, addr: u16, value: u16) -> Result<(), MemoryError> {
        self.write_u16(addr as usize, value)
    }
}

/// Highest address of the 16-bit address space.
pub const ADDRESS_SPACE_END: usize = 0xFFFF;

/// Identifies a mapping created with [MemoryMapper::map].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegionHandle(usize);

struct Region {
    handle: RegionHandle,
    device: Box<dyn Device>,
    start: u16,
    end: u16,
    allow_write: bool,
}

impl Region {
    fn contains(&self, address: u16) -> bool {
        self.start <= address && address <= self.end
    }
}

/// Composes devices into one 16-bit address space.
///
/// When regions overlap, the most recently mapped region covering an address wins.
/// Reads from unmapped addresses return 0 and writes to them, or to regions mapped
/// without write access, are dropped.
#[derive(Default)]
pub struct MemoryMapper {
    regions: Vec<Region>,
    next_handle: usize,
}

impl MemoryMapper {
    pub fn new() -> MemoryMapper {
        MemoryMapper::default()
    }

    /// Maps `device` to the inclusive address range `start..=end`. The device sees
    /// addresses relative to `start`.
    ///
    /// # Errors
    /// [MemoryError::InvalidRange] if `start > end` or `end` lies outside of the address
    /// space. Existing mappings are left untouched.
    pub fn map<D>(&mut self, device: D, start: usize, end: usize, allow_write: bool)
        -> Result<RegionHandle, MemoryError>
    where
        D: Device + 'static,
    {
        if start > end || end > ADDRESS_SPACE_END {
            return Err(MemoryError::InvalidRange { start, end });
        }

        let handle = RegionHandle(self.next_handle);
        self.next_handle += 1;

        self.regions.push(Region {
            handle,
            device: Box::new(device),
            start: start as u16,
            end: end as u16,
            allow_write,
        });

        Ok(handle)
    }

    /// Removes a mapping and hands back its device.
    pub fn unmap(&mut self, handle: RegionHandle) -> Option<Box<dyn Device>> {
        let index = self.regions.iter().position(|region| region.handle == handle)?;
        Some(self.regions.remove(index).device)
    }

    fn find_region(&mut self, address: u16) -> Option<&mut Region> {
        self.regions.iter_mut().rev().find(|region| region.contains(address))
    }

    fn read_byte(&mut self, address: Option<u16>) -> Result<u8, MemoryError> {
        let address = match address {
            Some(address) => address,
            None => return Ok(0),
        };

        match self.find_region(address) {
            Some(region) => {
                let offset = address - region.start;
                region.device.get_u8(offset)
            },
            None => Ok(0),
        }
    }

    fn write_byte(&mut self, address: Option<u16>, value: u8) -> Result<(), MemoryError> {
        let address = match address {
            Some(address) => address,
            None => return Ok(()),
        };

        match self.find_region(address) {
            Some(region) if region.allow_write => {
                let offset = address - region.start;
                region.device.set_u8(offset, value)
            },
            _ => Ok(()),
        }
    }

    /// Writes `bytes` to consecutive addresses beginning at `start`.
    pub fn load(&mut self, start: u16, bytes: &[u8]) -> Result<(), MemoryError> {
        for (i, byte) in bytes.iter().enumerate() {
            let address = start as usize + i;

            if address > ADDRESS_SPACE_END {
                break;
            }

            self.write_byte(Some(address as u16), *byte)?;
        }

        Ok(())
    }
}

impl Device for MemoryMapper {
    fn get_u8(&mut self, addr: u16) -> Result<u8, MemoryError> {
        self.read_byte(Some(addr))
    }

    fn get_u16(&mut self, addr: u16) -> Result<u16, MemoryError> {
        let high = self.read_byte(Some(addr))?;
        let low = self.read_byte(addr.checked_add(1))?;

        Ok(u16::from_be_bytes([high, low]))
    }

    fn set_u8(&mut self, addr: u16, value: u8) -> Result<(), MemoryError> {
        self.write_byte(Some(addr), value)
    }

    /// Routes a 16-bit write to the device covering `addr` as a whole when that
    /// device also covers `addr + 1`, so that peripherals observe the full value.
    /// Otherwise each byte is routed on its own.
    fn set_u16(&mut self, addr: u16, value: u16) -> Result<(), MemoryError> {
        if let Some(next) = addr.checked_add(1) {
            let owner = self.owner_of(addr);

            if owner.is_some() && owner == self.owner_of(next) {
                return self.write_word(addr, value);
            }
        }

        let [high, low] = value.to_be_bytes();
        self.write_byte(Some(addr), high)?;
        self.write_byte(addr.checked_add(1), low)
    }
}

impl MemoryMapper {
    fn owner_of(&self, address: u16) -> Option<RegionHandle> {
        self.regions.iter().rev()
            .find(|region| region.contains(address))
            .map(|region| region.handle)
    }

    fn write_word(&mut self, address: u16, value: u16) -> Result<(), MemoryError> {
        match self.find_region(address) {
            Some(region) if region.allow_write => {
                let offset = address - region.start;
                region.device.set_u16(offset, value)
            },
            _ => Ok(()),
        }
    }
}

#[test]
fn test_memory_big_endian() {
    let mut memory = Memory::new(4);

    memory.write_u16(1, 0xABCD).unwrap();

    assert_eq!(memory.read_u8(1), Ok(0xAB));
    assert_eq!(memory.read_u8(2), Ok(0xCD));
    assert_eq!(memory.read_u16(1), Ok(0xABCD));
    assert_eq!(memory.as_bytes(), &[0, 0xAB, 0xCD, 0]);
}

#[test]
fn test_memory_out_of_bounds() {
    let mut memory = Memory::new(4);

    assert_eq!(memory.read_u8(4), Err(MemoryError::OutOfBounds { offset: 4, size: 4 }));
    assert_eq!(memory.read_u16(3), Err(MemoryError::OutOfBounds { offset: 3, size: 4 }));
    assert!(memory.write_u16(3, 1).is_err());
    assert!(memory.set_u8(0xFFFF, 1).is_err());
}

#[test]
fn test_mapper_invalid_range() {
    let mut mapper = MemoryMapper::new();

    assert_eq!(
        mapper.map(Memory::new(16), 0x10, 0x0F, true).err(),
        Some(MemoryError::InvalidRange { start: 0x10, end: 0x0F }),
    );
    assert!(mapper.map(Memory::new(16), 0xFFF0, 0x10000, true).is_err());
    assert!(mapper.map(Memory::new(16), 0xFFF0, 0xFFFF, true).is_ok());
}

#[test]
fn test_mapper_last_mapped_wins() {
    let low = Rc::new(RefCell::new(Memory::new(0x100)));
    let high = Rc::new(RefCell::new(Memory::new(0x10)));

    let mut mapper = MemoryMapper::new();
    mapper.map(low.clone(), 0x00, 0xFF, true).unwrap();
    let overlay = mapper.map(high.clone(), 0x40, 0x4F, true).unwrap();

    mapper.set_u8(0x41, 0x77).unwrap();
    assert_eq!(high.borrow().read_u8(0x01), Ok(0x77));
    assert_eq!(low.borrow().read_u8(0x41), Ok(0x00));

    mapper.unmap(overlay).unwrap();
    assert_eq!(mapper.get_u8(0x41), Ok(0x00));

    mapper.set_u8(0x41, 0x55).unwrap();
    assert_eq!(low.borrow().read_u8(0x41), Ok(0x55));
}

#[test]
fn test_mapper_unmapped_and_read_only() {
    let rom = Rc::new(RefCell::new(Memory::new(0x10)));
    rom.borrow_mut().write_u8(0, 0x42).unwrap();

    let mut mapper = MemoryMapper::new();
    mapper.map(rom.clone(), 0x8000, 0x800F, false).unwrap();

    assert_eq!(mapper.get_u8(0x1234), Ok(0));
    mapper.set_u16(0x1234, 0xFFFF).unwrap();

    mapper.set_u8(0x8000, 0x00).unwrap();
    assert_eq!(mapper.get_u8(0x8000), Ok(0x42));
}

#[test]
fn test_mapper_word_across_regions() {
    let first = Rc::new(RefCell::new(Memory::new(0x10)));
    let second = Rc::new(RefCell::new(Memory::new(0x10)));

    let mut mapper = MemoryMapper::new();
    mapper.map(first.clone(), 0x00, 0x0F, true).unwrap();
    mapper.map(second.clone(), 0x10, 0x1F, true).unwrap();

    mapper.set_u16(0x0F, 0x1234).unwrap();

    assert_eq!(first.borrow().read_u8(0x0F), Ok(0x12));
    assert_eq!(second.borrow().read_u8(0x00), Ok(0x34));
    assert_eq!(mapper.get_u16(0x0F), Ok(0x1234));

    mapper.set_u16(0xFFFF, 0xABCD).unwrap();
    assert_eq!(mapper.get_u16(0xFFFF), Ok(0));
}

#[test]
fn test_mapper_load() {
    let ram = Rc::new(RefCell::new(Memory::new(0x10000)));

    let mut mapper = MemoryMapper::new();
    mapper.map(ram.clone(), 0x0000, 0xFFFF, true).unwrap();
    mapper.load(0xFFFE, &[1, 2, 3]).unwrap();

    assert_eq!(mapper.get_u16(0xFFFE), Ok(0x0102));
    assert_eq!(mapper.get_u8(0x0000), Ok(0));
}
