//! Address-to-name resolution.
//!
//! The graph and renderers only see the [`SymbolResolver`] trait; where the
//! names come from (an oid file, `go tool nm`, nothing at all) is up to the
//! caller that builds the resolver.

pub mod nm;
mod table;

pub use nm::{load_program_symbols, locate_go};
pub use table::SymbolTable;

/// Resolves addresses to human-readable names.
pub trait SymbolResolver: Sync {
    /// Name of the symbol starting exactly at `address`.
    fn lookup(&self, address: u64) -> Option<&str>;

    /// Name of the symbol covering `address`, with the offset into it.
    fn lookup_containing(&self, address: u64) -> Option<(&str, u64)> {
        self.lookup(address).map(|name| (name, 0))
    }
}

/// A resolver that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn lookup(&self, _address: u64) -> Option<&str> {
        None
    }
}

/// `name` or `name+0x10`.
pub fn describe(name: &str, offset: u64) -> String {
    if offset == 0 {
        name.to_string()
    } else {
        format!("{name}+{offset:#x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_symbols_resolves_nothing() {
        assert_eq!(NoSymbols.lookup(0x1000), None);
        assert_eq!(NoSymbols.lookup_containing(0x1000), None);
    }

    #[test]
    fn describe_offsets() {
        assert_eq!(describe("main.cache", 0), "main.cache");
        assert_eq!(describe("main.cache", 16), "main.cache+0x10");
    }
}
