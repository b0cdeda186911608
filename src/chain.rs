// src/chain.rs
use std::path::Path;

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::error::{GaslessError, Result};

pub const AVALANCHE_C_CHAIN_ID: u64 = 43114;
const AVALANCHE_RPC_URL: &str = "https://api.avax.network/ext/bc/C/rpc";
const SNOWTRACE_URL: &str = "https://snowtrace.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEndpoints {
    pub default: Vec<String>,
    #[serde(default)]
    pub public: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockExplorer {
    pub name: String,
    pub url: String,
}

/// Static description of the network every component talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDescriptor {
    pub id: u64,
    pub name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: RpcEndpoints,
    pub block_explorer: BlockExplorer,
}

impl ChainDescriptor {
    /// Avalanche C-Chain mainnet.
    pub fn avalanche() -> Self {
        Self {
            id: AVALANCHE_C_CHAIN_ID,
            name: "Avalanche C-Chain".to_string(),
            native_currency: NativeCurrency {
                name: "Avalanche".to_string(),
                symbol: "AVAX".to_string(),
                decimals: 18,
            },
            rpc_urls: RpcEndpoints {
                default: vec![AVALANCHE_RPC_URL.to_string()],
                public: vec![AVALANCHE_RPC_URL.to_string()],
            },
            block_explorer: BlockExplorer {
                name: "Snowtrace".to_string(),
                url: SNOWTRACE_URL.to_string(),
            },
        }
    }

    /// Loads a descriptor from a JSON file using the same camelCase layout
    /// the descriptor serializes to.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GaslessError::InvalidParameters(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            GaslessError::InvalidParameters(format!("invalid chain descriptor: {}", e))
        })
    }

    /// First default RPC URL, falling back to the public set.
    pub fn default_rpc_url(&self) -> Option<&str> {
        self.rpc_urls
            .default
            .first()
            .or_else(|| self.rpc_urls.public.first())
            .map(String::as_str)
    }

    pub fn explorer_tx_url(&self, hash: H256) -> String {
        format!("{}/tx/{:?}", self.explorer_base(), hash)
    }

    pub fn explorer_address_url(&self, address: Address) -> String {
        format!("{}/address/{:?}", self.explorer_base(), address)
    }

    fn explorer_base(&self) -> &str {
        self.block_explorer.url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avalanche_descriptor_matches_network() {
        let chain = ChainDescriptor::avalanche();
        assert_eq!(chain.id, 43114);
        assert_eq!(chain.native_currency.symbol, "AVAX");
        assert_eq!(chain.native_currency.decimals, 18);
        assert_eq!(chain.default_rpc_url(), Some(AVALANCHE_RPC_URL));
    }

    #[test]
    fn default_rpc_falls_back_to_public() {
        let mut chain = ChainDescriptor::avalanche();
        chain.rpc_urls.default.clear();
        chain.rpc_urls.public = vec!["https://public.example".to_string()];
        assert_eq!(chain.default_rpc_url(), Some("https://public.example"));

        chain.rpc_urls.public.clear();
        assert_eq!(chain.default_rpc_url(), None);
    }

    #[test]
    fn explorer_links_use_full_hex() {
        let chain = ChainDescriptor::avalanche();
        let address: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        assert_eq!(
            chain.explorer_address_url(address),
            "https://snowtrace.io/address/0x00000000000000000000000000000000000000aa"
        );
        assert!(chain.explorer_tx_url(H256::zero()).starts_with("https://snowtrace.io/tx/0x0000"));
    }

    #[test]
    fn descriptor_json_uses_camel_case() {
        let json = serde_json::to_value(ChainDescriptor::avalanche()).unwrap();
        assert_eq!(json["nativeCurrency"]["symbol"], "AVAX");
        assert_eq!(json["rpcUrls"]["default"][0], AVALANCHE_RPC_URL);
        assert_eq!(json["blockExplorer"]["name"], "Snowtrace");

        let parsed: ChainDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, ChainDescriptor::avalanche());
    }
}
