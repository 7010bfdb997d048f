//! Name bindings of one assembly run.
//!
//! The [SymbolTable] maps labels, constants and data blocks to their values. The
//! [StructureTable] maps structure names to member offsets. Structures exist only at
//! assembly time and are never encoded.

use std::collections::HashMap;

use edit_distance::edit_distance;

use crate::error::CompileError;
use crate::parsing::Span;

/// What kind of declaration bound a symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Label,
    Constant,
    Data,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SymbolInfo {
    pub kind: SymbolKind,
    /// Address of a label or data block, or the value of a constant.
    pub value: u16,
    pub exported: bool,
    pub defined: Option<Span>,
}

#[derive(Default, Debug, Clone)]
pub struct SymbolTable {
    inner: HashMap<String, SymbolInfo>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Binds `name`. A name can only be bound once.
    pub fn define(&mut self, name: &str, info: SymbolInfo) -> Result<(), CompileError> {
        if self.inner.contains_key(name) {
            return Err(CompileError::DuplicateBinding {
                name: name.to_string(),
                span: info.defined,
            });
        }

        self.inner.insert(name.to_string(), info);

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SymbolInfo> {
        self.inner.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Looks up the value bound to `name`.
    ///
    /// # Errors
    /// [CompileError::UnresolvedSymbol] with the closest bound name as a suggestion.
    pub fn resolve(&self, name: &str) -> Result<u16, CompileError> {
        match self.inner.get(name) {
            Some(info) => Ok(info.value),
            None => Err(CompileError::UnresolvedSymbol {
                name: name.to_string(),
                suggestion: closest_name(name, self.inner.keys()),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SymbolInfo)> {
        self.inner.iter().map(|(name, info)| (name.as_str(), info))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Member offsets of one structure, in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct StructureInfo {
    pub members: Vec<(String, u16)>,
    pub exported: bool,
    pub defined: Option<Span>,
}

impl StructureInfo {
    /// Computes cumulative offsets from member sizes.
    pub fn from_sizes<'a, I>(members: I, exported: bool, defined: Option<Span>) -> StructureInfo
    where
        I: IntoIterator<Item = (&'a str, u32)>,
    {
        let mut offset = 0u16;

        let members = members.into_iter()
            .map(|(name, size)| {
                let member = (name.to_string(), offset);
                offset = offset.wrapping_add(size as u16);
                member
            })
            .collect();

        StructureInfo {
            members,
            exported,
            defined,
        }
    }

    pub fn offset_of(&self, member: &str) -> Option<u16> {
        self.members.iter()
            .find(|(name, _)| name == member)
            .map(|(_, offset)| *offset)
    }
}

#[derive(Default, Debug, Clone)]
pub struct StructureTable {
    inner: HashMap<String, StructureInfo>,
}

impl StructureTable {
    pub fn new() -> StructureTable {
        StructureTable::default()
    }

    pub fn define(&mut self, name: &str, info: StructureInfo) -> Result<(), CompileError> {
        if self.inner.contains_key(name) {
            return Err(CompileError::DuplicateBinding {
                name: name.to_string(),
                span: info.defined,
            });
        }

        self.inner.insert(name.to_string(), info);

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&StructureInfo> {
        self.inner.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Offset of `member` inside `structure`.
    pub fn resolve(&self, structure: &str, member: &str) -> Result<u16, CompileError> {
        let info = self.inner.get(structure)
            .ok_or_else(|| CompileError::UnknownStructure {
                name: structure.to_string(),
            })?;

        info.offset_of(member)
            .ok_or_else(|| CompileError::UnknownMember {
                structure: structure.to_string(),
                member: member.to_string(),
            })
    }
}

/// The known name closest to `name`, if it is close enough to be a likely typo.
pub(crate) fn closest_name<'a, I, S>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a S>,
    S: AsRef<str> + 'a + ?Sized,
{
    let limit = std::cmp::max(2, name.len() / 3);

    candidates.into_iter()
        .map(|candidate| {
            let candidate: &str = candidate.as_ref();
            (edit_distance(name, candidate), candidate)
        })
        .filter(|(distance, _)| *distance <= limit)
        .min()
        .map(|(_, candidate)| candidate.to_string())
}

#[cfg(test)]
fn label(value: u16) -> SymbolInfo {
    SymbolInfo {
        kind: SymbolKind::Label,
        value,
        exported: false,
        defined: None,
    }
}

#[test]
fn test_symbol_table() {
    let mut table = SymbolTable::new();

    table.define("loop", label(0x10)).unwrap();
    table.define("counter", label(0x20)).unwrap();

    assert_eq!(table.resolve("loop"), Ok(0x10));
    assert_eq!(
        table.define("loop", label(0x30)),
        Err(CompileError::DuplicateBinding { name: "loop".into(), span: None }),
    );
    assert_eq!(table.resolve("loop"), Ok(0x10));

    assert_eq!(
        table.resolve("lop"),
        Err(CompileError::UnresolvedSymbol { name: "lop".into(), suggestion: Some("loop".into()) }),
    );
    assert_eq!(
        table.resolve("elsewhere"),
        Err(CompileError::UnresolvedSymbol { name: "elsewhere".into(), suggestion: None }),
    );
}

#[test]
fn test_structure_offsets() {
    let mut table = StructureTable::new();
    let info = StructureInfo::from_sizes(vec![("x", 2), ("y", 2), ("flags", 1), ("z", 2)], false, None);

    table.define("Point", info).unwrap();

    assert_eq!(table.resolve("Point", "x"), Ok(0));
    assert_eq!(table.resolve("Point", "y"), Ok(2));
    assert_eq!(table.resolve("Point", "z"), Ok(5));
    assert_eq!(
        table.resolve("Point", "w"),
        Err(CompileError::UnknownMember { structure: "Point".into(), member: "w".into() }),
    );
    assert_eq!(
        table.resolve("Pointer", "x"),
        Err(CompileError::UnknownStructure { name: "Pointer".into() }),
    );
}
