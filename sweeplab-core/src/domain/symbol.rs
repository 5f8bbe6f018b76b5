//! Ticker symbols as they appear in file names.
//!
//! Symbols are trimmed and upper-cased. They name `{symbol}.csv` price files
//! and every per-symbol artifact, so only ASCII letters, digits and `. - _ ^ =`
//! are accepted and `..` never is.

use std::collections::HashSet;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("empty symbol")]
    Empty,

    #[error("invalid symbol '{0}': only letters, digits and . - _ ^ = are allowed")]
    InvalidChar(String),

    #[error("invalid symbol '{0}': '..' is not allowed")]
    ParentRef(String),

    #[error("no symbols given")]
    NoSymbols,
}

/// Canonical form of one symbol.
pub fn normalize_symbol(raw: &str) -> Result<String, SymbolError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(SymbolError::Empty);
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '='))
    {
        return Err(SymbolError::InvalidChar(raw.trim().to_string()));
    }
    if symbol.contains("..") {
        return Err(SymbolError::ParentRef(raw.trim().to_string()));
    }
    Ok(symbol)
}

/// Normalize every symbol and drop repeats, keeping first-seen order.
pub fn normalize_symbols<S: AsRef<str>>(raw: &[S]) -> Result<Vec<String>, SymbolError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for s in raw {
        let symbol = normalize_symbol(s.as_ref())?;
        if seen.insert(symbol.clone()) {
            out.push(symbol);
        }
    }
    if out.is_empty() {
        return Err(SymbolError::NoSymbols);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_uppercases_and_dedups() {
        let symbols = normalize_symbols(&[" aapl", "MSFT", "AAPL ", "brk.b"]).unwrap();
        assert_eq!(symbols, vec!["AAPL", "MSFT", "BRK.B"]);
    }

    #[test]
    fn rejects_path_like_symbols() {
        assert!(matches!(
            normalize_symbol("../../evil"),
            Err(SymbolError::InvalidChar(_))
        ));
        assert!(matches!(normalize_symbol("a\\b"), Err(SymbolError::InvalidChar(_))));
        assert!(matches!(normalize_symbol(".."), Err(SymbolError::ParentRef(_))));
        assert_eq!(normalize_symbol("   "), Err(SymbolError::Empty));
    }

    #[test]
    fn index_and_fx_tickers_pass() {
        assert_eq!(normalize_symbol("^gspc").unwrap(), "^GSPC");
        assert_eq!(normalize_symbol("eurusd=x").unwrap(), "EURUSD=X");
    }

    #[test]
    fn empty_list_is_rejected() {
        let none: [&str; 0] = [];
        assert_eq!(normalize_symbols(&none), Err(SymbolError::NoSymbols));
    }
}
