//! Entity name to market-identifier resolution
//!
//! The intent resolver treats this as an external collaborator: exact match
//! first, substring-contains second, else unresolved.

/// Resolves display names to canonical entity codes (6 digits + exchange)
pub trait SymbolLookup: Send + Sync {
    /// Resolve a display name to an entity code
    fn lookup(&self, name: &str) -> Option<String>;

    /// Find the first known display name occurring inside free text
    fn scan(&self, text: &str) -> Option<(String, String)>;
}

/// Built-in static table of common A-share names
#[derive(Debug, Clone)]
pub struct StaticSymbolTable {
    entries: Vec<(String, String)>,
}

impl Default for StaticSymbolTable {
    fn default() -> Self {
        let entries = [
            ("平安银行", "000001.SZ"),
            ("万科A", "000002.SZ"),
            ("五粮液", "000858.SZ"),
            ("比亚迪", "002594.SZ"),
            ("宁德时代", "300750.SZ"),
            ("中国平安", "601318.SH"),
            ("工商银行", "601398.SH"),
            ("招商银行", "600036.SH"),
            ("贵州茅台", "600519.SH"),
            ("中国石油", "601857.SH"),
        ]
        .into_iter()
        .map(|(name, code)| (name.to_string(), code.to_string()))
        .collect();

        Self { entries }
    }
}

impl StaticSymbolTable {
    /// Create a table with the built-in entries
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, overriding an existing name
    pub fn insert(&mut self, name: impl Into<String>, code: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(n, _)| *n != name);
        self.entries.push((name, code.into()));
    }
}

impl SymbolLookup for StaticSymbolTable {
    fn lookup(&self, name: &str) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        // Exact match first
        if let Some((_, code)) = self.entries.iter().find(|(n, _)| n == name) {
            return Some(code.clone());
        }

        // Then substring containment in either direction
        self.entries
            .iter()
            .find(|(n, _)| n.contains(name) || name.contains(n.as_str()))
            .map(|(_, code)| code.clone())
    }

    fn scan(&self, text: &str) -> Option<(String, String)> {
        self.entries
            .iter()
            .find(|(name, _)| text.contains(name.as_str()))
            .map(|(name, code)| (name.clone(), code.clone()))
    }
}
