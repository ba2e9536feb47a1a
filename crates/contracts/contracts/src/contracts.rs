use ethers::types::{Address, U256};
use types::{EventFilter, RawEvent};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log was emitted by {0:#x}, not by the watched token")]
    ForeignContract(Address),
    #[error("log is not a transfer event")]
    NotTransfer,
    #[error("expected 3 topics, got {0}")]
    TopicCount(usize),
    #[error("expected 32 bytes of data, got {0}")]
    DataLength(usize),
    #[error("invalid account identifier {0:?}")]
    InvalidAddress(String),
}

/// Transfer payload of a decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferData {
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

pub trait TokenContract: Send + Sync {
    fn get_address(&self) -> Address;
    fn get_symbol(&self) -> String;
    fn get_decimals(&self) -> u32;

    /// Filter selecting this contract's transfer events, optionally narrowed
    /// to an exact sender and/or recipient.
    fn transfer_filter(
        &self,
        sender: Option<&str>,
        recipient: Option<&str>,
    ) -> Result<EventFilter, DecodeError>;

    fn decode_transfer(&self, event: &RawEvent) -> Result<TransferData, DecodeError>;

    /// Scales a raw on-chain value down by the token decimals.
    fn format_amount(&self, value: U256) -> String;
}

/// Lowercase `0x` prefixed hex form used for every account identifier.
pub fn address_hex(address: &Address) -> String {
    format!("{:#x}", address)
}

pub fn parse_address(value: &str) -> Result<Address, DecodeError> {
    value
        .parse::<Address>()
        .map_err(|_| DecodeError::InvalidAddress(value.to_string()))
}
