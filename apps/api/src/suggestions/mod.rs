//! User-submitted asset suggestions and the admin review queue.

pub mod handlers;

/// Base symbol for a suggested contract symbol: `PEPEUSDT` → `PEPE`.
/// Symbols without a known quote suffix are taken as already-base.
pub fn base_from_symbol(symbol: &str) -> &str {
    for quote in ["USDT", "USDC", "BUSD"] {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return base;
            }
        }
    }
    symbol
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_usdt_suffix() {
        assert_eq!(base_from_symbol("PEPEUSDT"), "PEPE");
        assert_eq!(base_from_symbol("BTCUSDC"), "BTC");
    }

    #[test]
    fn test_bare_base_passes_through() {
        assert_eq!(base_from_symbol("PEPE"), "PEPE");
    }

    #[test]
    fn test_suffix_only_is_not_stripped() {
        assert_eq!(base_from_symbol("USDT"), "USDT");
    }
}
