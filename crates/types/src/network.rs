use serde::Serialize;

#[derive(clap::ValueEnum, Clone, Default, Debug, Serialize)]
pub enum Network {
    #[default]
    Mainnet,

    Sepolia,
}

impl Network {
    pub fn url(&self) -> String {
        match self {
            Network::Mainnet => "wss://ethereum-rpc.publicnode.com".to_string(),
            Network::Sepolia => "wss://ethereum-sepolia-rpc.publicnode.com".to_string(),
        }
    }
}
