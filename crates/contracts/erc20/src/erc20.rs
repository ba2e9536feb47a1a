use contracts::{parse_address, DecodeError, TokenContract, TransferData};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use types::{group_digits, EventFilter, RawEvent};

/// Fraction digits kept when a raw value is scaled for display.
pub const AMOUNT_FRACTION_DIGITS: usize = 3;

pub fn transfer_signature() -> H256 {
    H256::from(keccak256("Transfer(address,address,uint256)"))
}

#[derive(Debug, Clone)]
pub struct Erc20 {
    address: Address,
    symbol: String,
    decimals: u32,
    transfer_signature: H256,
}

impl Erc20 {
    pub fn new(address: Address, symbol: String, decimals: u32) -> Self {
        Erc20 {
            address,
            symbol,
            decimals,
            transfer_signature: transfer_signature(),
        }
    }
}

impl TokenContract for Erc20 {
    fn get_address(&self) -> Address {
        self.address
    }

    fn get_symbol(&self) -> String {
        self.symbol.clone()
    }

    fn get_decimals(&self) -> u32 {
        self.decimals
    }

    fn transfer_filter(
        &self,
        sender: Option<&str>,
        recipient: Option<&str>,
    ) -> Result<EventFilter, DecodeError> {
        Ok(EventFilter {
            address: self.address,
            signature: self.transfer_signature,
            sender: sender.map(parse_address).transpose()?,
            recipient: recipient.map(parse_address).transpose()?,
        })
    }

    // Transfer(address indexed from, address indexed to, uint256 value)
    // topics: [signature, from (left padded), to (left padded)], data: value
    fn decode_transfer(&self, event: &RawEvent) -> Result<TransferData, DecodeError> {
        if event.address != self.address {
            return Err(DecodeError::ForeignContract(event.address));
        }
        match event.topics.first() {
            Some(topic) if *topic == self.transfer_signature => {}
            _ => return Err(DecodeError::NotTransfer),
        }
        if event.topics.len() != 3 {
            return Err(DecodeError::TopicCount(event.topics.len()));
        }
        if event.data.len() != 32 {
            return Err(DecodeError::DataLength(event.data.len()));
        }

        Ok(TransferData {
            from: Address::from_slice(&event.topics[1].as_bytes()[12..]),
            to: Address::from_slice(&event.topics[2].as_bytes()[12..]),
            value: U256::from_big_endian(&event.data),
        })
    }

    fn format_amount(&self, value: U256) -> String {
        format_units(value, self.decimals)
    }
}

/// Scales `value` down by `10^decimals`, groups the integer part with `,`
/// and truncates the fraction to [`AMOUNT_FRACTION_DIGITS`] digits without
/// trailing zeros.
/// `decimals` above 77 overflows `U256`.
pub fn format_units(value: U256, decimals: u32) -> String {
    let divisor = U256::exp10(decimals as usize);
    let integer = group_digits(&(value / divisor).to_string());
    if decimals == 0 {
        return integer;
    }

    let fraction = format!("{:0>width$}", (value % divisor).to_string(), width = decimals as usize);
    let kept = fraction[..AMOUNT_FRACTION_DIGITS.min(fraction.len())].trim_end_matches('0');
    if kept.is_empty() {
        integer
    } else {
        format!("{}.{}", integer, kept)
    }
}
