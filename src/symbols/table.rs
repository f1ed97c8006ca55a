use std::collections::BTreeMap;
use std::io::BufRead;

use super::SymbolResolver;
use crate::error::{HeapError, Result};

#[derive(Debug, Clone)]
struct Symbol {
    name: String,
    size: Option<u64>,
}

/// Symbols ordered by start address.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<u64, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol. The first name registered for an address wins.
    pub fn insert(&mut self, address: u64, name: impl Into<String>, size: Option<u64>) {
        self.symbols.entry(address).or_insert_with(|| Symbol {
            name: name.into(),
            size,
        });
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Read an oid file: one `<hex address> <name>` pair per line.
    ///
    /// Blank lines and `#` comments are ignored. Returns the number of entries read.
    pub fn read_oids<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let mut count = 0;
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (address, name) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| HeapError::SymbolParse {
                    line: idx + 1,
                    reason: format!("expected `<address> <name>`, got {line:?}"),
                })?;
            let address = parse_hex(address).ok_or_else(|| HeapError::SymbolParse {
                line: idx + 1,
                reason: format!("invalid address {address:?}"),
            })?;
            self.insert(address, name.trim(), None);
            count += 1;
        }
        Ok(count)
    }

    /// Read `go tool nm` output: `address [size] kind name` per line.
    ///
    /// Undefined (`U`) symbols have no address and are skipped.
    pub fn read_nm<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let mut count = 0;
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 3 {
                continue;
            }
            let address = parse_hex(tokens[0]).ok_or_else(|| HeapError::SymbolParse {
                line: idx + 1,
                reason: format!("invalid address {:?}", tokens[0]),
            })?;
            // With `-size` a decimal size column precedes the kind.
            let (size, kind, name) = match tokens[1].parse::<u64>() {
                Ok(size) if tokens.len() >= 4 => (Some(size), tokens[2], &tokens[3..]),
                _ => (None, tokens[1], &tokens[2..]),
            };
            if kind == "U" {
                continue;
            }
            self.insert(address, name.join(" "), size);
            count += 1;
        }
        Ok(count)
    }
}

impl SymbolResolver for SymbolTable {
    fn lookup(&self, address: u64) -> Option<&str> {
        self.symbols.get(&address).map(|s| s.name.as_str())
    }

    /// The nearest symbol at or below `address`, bounded by its size when
    /// known and otherwise by the start of the next symbol.
    fn lookup_containing(&self, address: u64) -> Option<(&str, u64)> {
        let (&start, symbol) = self.symbols.range(..=address).next_back()?;
        let offset = address - start;
        if offset == 0 {
            return Some((symbol.name.as_str(), 0));
        }
        let end = match symbol.size {
            Some(size) => start.saturating_add(size),
            None => *self.symbols.range(address..).next()?.0,
        };
        (address < end).then_some((symbol.name.as_str(), offset))
    }
}

fn parse_hex(text: &str) -> Option<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}
