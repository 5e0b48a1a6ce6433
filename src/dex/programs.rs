use std::collections::HashSet;

pub const JUPITER_PROGRAM_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";
pub const RAYDIUM_AMM_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const RAYDIUM_CLMM_PROGRAM_ID: &str = "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK";
pub const ORCA_WHIRLPOOL_PROGRAM_ID: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";
pub const OPENBOOK_PROGRAM_ID: &str = "srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX";

pub fn default_dex_programs() -> HashSet<String> {
    [
        JUPITER_PROGRAM_ID,
        RAYDIUM_AMM_PROGRAM_ID,
        RAYDIUM_CLMM_PROGRAM_ID,
        ORCA_WHIRLPOOL_PROGRAM_ID,
        OPENBOOK_PROGRAM_ID,
    ]
    .iter()
    .map(|id| id.to_string())
    .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DexProtocol {
    Jupiter,
    Raydium,
    Orca,
    OpenBook,
    Unknown,
}

pub fn identify_protocol(program_id: &str) -> DexProtocol {
    match program_id {
        JUPITER_PROGRAM_ID => DexProtocol::Jupiter,
        RAYDIUM_AMM_PROGRAM_ID | RAYDIUM_CLMM_PROGRAM_ID => DexProtocol::Raydium,
        ORCA_WHIRLPOOL_PROGRAM_ID => DexProtocol::Orca,
        OPENBOOK_PROGRAM_ID => DexProtocol::OpenBook,
        _ => DexProtocol::Unknown,
    }
}
