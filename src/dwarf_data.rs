//! The debug-info index: parses the DWARF sections embedded in the
//! tracee's ELF file once at construction and answers
//! function-name/address/line queries against an immutable in-memory index.
//!
//! Built with `gimli` (DWARF) over `object` (ELF/section access). The
//! parsing shape below — load raw sections with `object`, hand them to
//! `gimli::Dwarf::load`, then walk units/DIEs/line programs — is the
//! standard idiom shared by `gimli`'s own `dwarfdump` example and by
//! `addr2line`, the two reference consumers of this API pairing.

use std::borrow::Cow;
use std::fs;

use gimli::{EndianSlice, RunTimeEndian};
use object::{Object, ObjectSection};

use crate::error::DwarfError;

/// A source-line record: one row of a compilation unit's line-number
/// program.
#[derive(Debug, Clone)]
pub struct Line {
    pub file: String,
    pub line: usize,
    pub address: usize,
}

/// A `DW_TAG_subprogram` entry: name plus the `[low_pc, high_pc)` range of
/// machine addresses it covers.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub low_pc: usize,
    pub high_pc: usize,
}

struct CompilationUnit {
    low_pc: usize,
    high_pc: usize,
    /// Sorted ascending by address.
    lines: Vec<Line>,
    functions: Vec<Function>,
}

/// A restartable forward cursor over a compilation unit's line table,
/// positioned at the record that covers a queried address.
pub struct LineCursor<'a> {
    lines: &'a [Line],
    pos: usize,
}

impl<'a> LineCursor<'a> {
    pub fn file(&self) -> &str {
        &self.lines[self.pos].file
    }

    pub fn line(&self) -> usize {
        self.lines[self.pos].line
    }

    pub fn address(&self) -> usize {
        self.lines[self.pos].address
    }

    /// Move to the next record in address order. Returns `false` (and does
    /// not move) if already at the last record.
    pub fn advance(&mut self) -> bool {
        if self.pos + 1 < self.lines.len() {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Display for LineCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file(), self.line())
    }
}

/// Immutable after construction.
pub struct DwarfData {
    units: Vec<CompilationUnit>,
}

impl DwarfData {
    /// Parses `path`'s embedded DWARF sections. If the
    /// file cannot be opened, or the object has no recognized debug
    /// sections, the returned index is empty rather than an error — only
    /// I/O and format failures are surfaced as `Err`.
    pub fn from_file(path: &str) -> Result<DwarfData, DwarfError> {
        let buffer = fs::read(path).map_err(|_| DwarfError::ErrorOpeningFile)?;
        let object = object::File::parse(&*buffer)?;

        let endian = if object.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let load_section = |id: gimli::SectionId| -> Result<Cow<[u8]>, gimli::Error> {
            match object.section_by_name(id.name()) {
                Some(section) => Ok(section
                    .uncompressed_data()
                    .unwrap_or(Cow::Borrowed(&[][..]))),
                None => Ok(Cow::Borrowed(&[][..])),
            }
        };
        let dwarf_cow = gimli::Dwarf::load(load_section)?;
        let borrow_section: &dyn for<'a> Fn(&'a Cow<[u8]>) -> EndianSlice<'a, RunTimeEndian> =
            &|section| EndianSlice::new(section, endian);
        let dwarf = dwarf_cow.borrow(&borrow_section);

        let mut units = Vec::new();
        let mut iter = dwarf.units();
        while let Some(header) = iter.next()? {
            let unit = dwarf.unit(header)?;
            units.push(Self::load_unit(&dwarf, &unit)?);
        }

        Ok(DwarfData { units })
    }

    fn load_unit<R: gimli::Reader>(
        dwarf: &gimli::Dwarf<R>,
        unit: &gimli::Unit<R>,
    ) -> Result<CompilationUnit, gimli::Error> {
        let mut functions = Vec::new();
        let mut entries = unit.entries();
        while let Some((_, entry)) = entries.next_dfs()? {
            if entry.tag() != gimli::DW_TAG_subprogram {
                continue;
            }
            let name = entry
                .attr_value(gimli::DW_AT_name)?
                .and_then(|v| dwarf.attr_string(unit, v).ok())
                .map(|s| s.to_string_lossy().into_owned());
            let low_pc = entry.attr_value(gimli::DW_AT_low_pc)?.and_then(|v| match v {
                gimli::AttributeValue::Addr(addr) => Some(addr as usize),
                _ => None,
            });
            let high_pc_attr = entry.attr_value(gimli::DW_AT_high_pc)?;
            if let (Some(name), Some(low_pc)) = (name, low_pc) {
                let high_pc = match high_pc_attr {
                    Some(gimli::AttributeValue::Addr(addr)) => addr as usize,
                    Some(gimli::AttributeValue::Udata(offset)) => low_pc + offset as usize,
                    _ => low_pc,
                };
                functions.push(Function {
                    name,
                    low_pc,
                    high_pc,
                });
            }
        }

        let mut lines = Vec::new();
        if let Some(program) = unit.line_program.clone() {
            let header = program.header().clone();
            let mut rows = program.rows();
            while let Some((row_header, row)) = rows.next_row()? {
                if row.end_sequence() {
                    continue;
                }
                let Some(line) = row.line() else { continue };
                if let Some(path) = Self::file_path(dwarf, unit, row_header, row.file_index()) {
                    lines.push(Line {
                        file: path,
                        line: line.get() as usize,
                        address: row.address() as usize,
                    });
                }
            }
            let _ = header;
        }
        lines.sort_by_key(|l| l.address);

        let low_pc = lines
            .first()
            .map(|l| l.address)
            .into_iter()
            .chain(functions.iter().map(|f| f.low_pc))
            .min()
            .unwrap_or(0);
        let high_pc = lines
            .last()
            .map(|l| l.address + 1)
            .into_iter()
            .chain(functions.iter().map(|f| f.high_pc))
            .max()
            .unwrap_or(0);

        Ok(CompilationUnit {
            low_pc,
            high_pc,
            lines,
            functions,
        })
    }

    fn file_path<R: gimli::Reader>(
        dwarf: &gimli::Dwarf<R>,
        unit: &gimli::Unit<R>,
        header: &gimli::LineProgramHeader<R>,
        file_index: u64,
    ) -> Option<String> {
        let file = header.file(file_index)?;
        let mut path = String::new();
        if let Some(dir) = file.directory(header) {
            if let Ok(dir_str) = dwarf.attr_string(unit, dir) {
                path.push_str(&dir_str.to_string_lossy());
                path.push('/');
            }
        }
        if let Ok(name) = dwarf.attr_string(unit, file.path_name()) {
            path.push_str(&name.to_string_lossy());
        }
        Some(path)
    }

    /// True when no compilation unit carried any functions or line records
    /// — the "stripped binary" case, which callers should warn about once.
    pub fn is_empty(&self) -> bool {
        self.units
            .iter()
            .all(|u| u.functions.is_empty() && u.lines.is_empty())
    }

    pub fn print_summary(&self) {
        for (i, unit) in self.units.iter().enumerate() {
            log::debug!(
                "compilation unit {}: {} functions, {} line records, range [{:#x}, {:#x})",
                i,
                unit.functions.len(),
                unit.lines.len(),
                unit.low_pc,
                unit.high_pc
            );
        }
    }

    /// `function-entry(name) → address`: first subprogram
    /// whose name matches exactly, across all compilation units.
    pub fn function_entry(&self, name: &str) -> Option<usize> {
        self.units
            .iter()
            .flat_map(|u| u.functions.iter())
            .find(|f| f.name == name)
            .map(|f| f.low_pc)
    }

    /// `line-at(address) → cursor`: the record covering
    /// `addr` — the latest line-table row at or before `addr` within the
    /// compilation unit whose range contains it. This is the usual DWARF
    /// line-table lookup (a row describes every address up to the next
    /// row), and subsumes exact-address lookups such as a function's
    /// entry address.
    pub fn line_at(&self, addr: usize) -> Option<LineCursor<'_>> {
        let unit = self
            .units
            .iter()
            .find(|u| addr >= u.low_pc && addr < u.high_pc)?;
        if unit.lines.is_empty() {
            return None;
        }
        let pos = match unit.lines.binary_search_by_key(&addr, |l| l.address) {
            Ok(pos) => pos,
            Err(0) => return None,
            Err(pos) => pos - 1,
        };
        Some(LineCursor {
            lines: &unit.lines,
            pos,
        })
    }

    /// `enclosing-subprogram(pc) → entry`.
    pub fn enclosing_subprogram(&self, pc: usize) -> Option<&Function> {
        self.units
            .iter()
            .flat_map(|u| u.functions.iter())
            .find(|f| pc >= f.low_pc && pc < f.high_pc)
    }

    /// `break <line-number>` support: lowest address
    /// among line records carrying the given source line number.
    pub fn addr_for_line(&self, line: usize) -> Option<usize> {
        self.units
            .iter()
            .flat_map(|u| u.lines.iter())
            .filter(|l| l.line == line)
            .map(|l| l.address)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(lines: Vec<Line>, functions: Vec<Function>) -> CompilationUnit {
        let low_pc = lines.iter().map(|l| l.address).min().unwrap_or(0);
        let high_pc = lines.iter().map(|l| l.address + 1).max().unwrap_or(0);
        CompilationUnit {
            low_pc,
            high_pc,
            lines,
            functions,
        }
    }

    fn sample() -> DwarfData {
        let lines = vec![
            Line { file: "hello.c".into(), line: 7, address: 0x4011a0 },
            Line { file: "hello.c".into(), line: 8, address: 0x4011a8 },
            Line { file: "hello.c".into(), line: 9, address: 0x4011b4 },
        ];
        let functions = vec![Function {
            name: "main".into(),
            low_pc: 0x4011a0,
            high_pc: 0x4011c0,
        }];
        DwarfData {
            units: vec![unit(lines, functions)],
        }
    }

    #[test]
    fn function_entry_resolves_known_name() {
        let dwarf = sample();
        assert_eq!(dwarf.function_entry("main"), Some(0x4011a0));
        assert_eq!(dwarf.function_entry("nope"), None);
    }

    #[test]
    fn line_at_finds_exact_and_floors_mid_instruction_addresses() {
        let dwarf = sample();
        let cursor = dwarf.line_at(0x4011a0).unwrap();
        assert_eq!(cursor.line(), 7);

        // An address between two line-table rows belongs to the earlier row.
        let cursor = dwarf.line_at(0x4011a4).unwrap();
        assert_eq!(cursor.line(), 7);

        assert!(dwarf.line_at(0x1000).is_none());
    }

    #[test]
    fn cursor_advances_monotonically() {
        let dwarf = sample();
        let mut cursor = dwarf.line_at(0x4011a0).unwrap();
        let mut addresses = vec![cursor.address()];
        while cursor.advance() {
            addresses.push(cursor.address());
        }
        assert_eq!(addresses, vec![0x4011a0, 0x4011a8, 0x4011b4]);
    }

    #[test]
    fn enclosing_subprogram_respects_half_open_range() {
        let dwarf = sample();
        assert_eq!(dwarf.enclosing_subprogram(0x4011a0).unwrap().name, "main");
        assert_eq!(dwarf.enclosing_subprogram(0x4011bf).unwrap().name, "main");
        assert!(dwarf.enclosing_subprogram(0x4011c0).is_none());
    }

    #[test]
    fn empty_index_reports_empty() {
        let dwarf = DwarfData { units: vec![] };
        assert!(dwarf.is_empty());
    }
}
