// Mezo token tables

/// Synthetic pool name for protocol-wide rows.
pub const ALL_POOLS: &str = "ALL_POOLS";

pub const MUSD_SYMBOL: &str = "MUSD";
pub const BTC_SYMBOL: &str = "BTC";

/// Stablecoins preferred as the volume leg when only one side is stable.
pub const STABLE_SYMBOLS: [&str; 3] = ["USDC", "USDT", "upMUSD"];

/// BTC wrappers priced off BTC; BTC is preferred when paired with one.
pub const BTC_DERIVATIVE_SYMBOLS: [&str; 5] = ["SolvBTC", "xSolvBTC", "swBTC", "FBTC", "tBTC"];

/// Derivatives that take the BTC leg in Tigris cumulative pool stats.
/// Other wrappers there fall through to the larger leg.
pub const TIGRIS_BTC_DERIVATIVE_SYMBOLS: [&str; 2] = ["SolvBTC", "xSolvBTC"];

/// Mezo-native stables pegged at exactly 1 USD regardless of the feed.
pub const PEGGED_SYMBOLS: [&str; 2] = ["MUSD", "upMUSD"];

pub const DEFAULT_DECIMALS: u32 = 18;

// Decimal places
pub const STABLE_DECIMALS: u32 = 6;
pub const BTC_WRAPPER_DECIMALS: u32 = 8;

/// Mezo bridged asset symbol -> canonical symbol used for pricing.
pub const MEZO_ASSET_NAMES: [(&str, &str); 8] = [
    ("mUSDC", "USDC"),
    ("mUSDT", "USDT"),
    ("mT", "T"),
    ("mSolvBTC", "SolvBTC"),
    ("mxSolvBTC", "xSolvBTC"),
    ("mFBTC", "FBTC"),
    ("mcbBTC", "cbBTC"),
    ("mswBTC", "swBTC"),
];

/// Canonical symbol -> CoinGecko id.
pub const PRICE_FEED_IDS: [(&str, &str); 16] = [
    ("BTC", "bitcoin"),
    ("WBTC", "wrapped-bitcoin"),
    ("tBTC", "tbtc"),
    ("FBTC", "ignition-fbtc"),
    ("SolvBTC", "solv-btc"),
    ("xSolvBTC", "solv-protocol-solvbtc-bbn"),
    ("swBTC", "swell-restaked-btc"),
    ("cbBTC", "coinbase-wrapped-btc"),
    ("LBTC", "lombard-staked-btc"),
    ("USDC", "usd-coin"),
    ("USDT", "tether"),
    ("USDe", "ethena-usde"),
    ("crvUSD", "crvusd"),
    ("thUSD", "threshold-usd"),
    ("DAI", "dai"),
    ("T", "threshold-network-token"),
];

/// Decimal places for a raw token symbol (before standardization).
pub fn token_decimals(symbol: &str) -> u32 {
    match symbol {
        "USDC" | "USDT" | "mUSDC" | "mUSDT" => STABLE_DECIMALS,
        "WBTC" | "FBTC" | "cbBTC" | "swBTC" => BTC_WRAPPER_DECIMALS,
        _ => DEFAULT_DECIMALS,
    }
}

/// Strip the Mezo `m` prefix from bridged assets. Unknown symbols pass through.
pub fn standardize_symbol(symbol: &str) -> &str {
    MEZO_ASSET_NAMES
        .iter()
        .find(|(mezo, _)| *mezo == symbol)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(symbol)
}

pub fn price_feed_id(symbol: &str) -> Option<&'static str> {
    PRICE_FEED_IDS
        .iter()
        .find(|(sym, _)| *sym == symbol)
        .map(|(_, id)| *id)
}

pub fn is_pegged(symbol: &str) -> bool {
    PEGGED_SYMBOLS.contains(&symbol)
}

pub fn is_stable(symbol: &str) -> bool {
    STABLE_SYMBOLS.contains(&symbol)
}
