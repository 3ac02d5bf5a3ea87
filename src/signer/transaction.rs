//! Transaction model and canonical encoding

use crate::crypto::{keccak256, Address, Signature};
use crate::errors::{Result, VaultError};
use rlp::RlpStream;

/// Fractional digits in a base unit
pub const DECIMALS: u32 = 8;

const UNIT: u128 = 10u128.pow(DECIMALS);

/// Fee rates are expressed in parts per million
const PPM: u128 = 1_000_000;

/// Transfer to be signed. Amounts are in base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: Address,
    pub amount: u128,
    pub token: String,
    pub nonce: u64,
    pub fee: u128,
}

impl TransactionRequest {
    pub fn validate(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(VaultError::InvalidRequest(
                "Amount must be greater than zero".to_string(),
            ));
        }
        validate_token(&self.token)
    }

    /// `RLP[chainId, nonce, to, amount, token, fee]`
    pub fn encode(&self, chain_id: u64) -> Vec<u8> {
        let mut stream = RlpStream::new_list(6);
        stream.append(&chain_id);
        stream.append(&self.nonce);
        stream.append(&self.to.as_bytes().as_slice());
        stream.append(&trimmed_be(self.amount).as_slice());
        stream.append(&self.token.as_bytes());
        stream.append(&trimmed_be(self.fee).as_slice());
        stream.out().to_vec()
    }
}

/// Signed, immutable transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub payload: Vec<u8>,
    pub signature: Signature,
    pub hash: [u8; 32],
}

impl SignedTransaction {
    pub fn new(payload: Vec<u8>, signature: Signature) -> Self {
        let hash = keccak256(&Self::concat(&payload, &signature));
        Self {
            payload,
            signature,
            hash,
        }
    }

    fn concat(payload: &[u8], signature: &Signature) -> Vec<u8> {
        let mut raw = Vec::with_capacity(payload.len() + 65);
        raw.extend_from_slice(payload);
        raw.extend_from_slice(&signature.to_bytes());
        raw
    }

    /// `payload || signature`, hex
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(Self::concat(&self.payload, &self.signature)))
    }

    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash))
    }
}

fn trimmed_be(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

/// Token symbols are 1-16 ASCII alphanumerics
pub fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() || token.len() > 16 || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(VaultError::InvalidRequest(format!("Invalid token symbol: {:?}", token)));
    }
    Ok(())
}

/// Parse a decimal amount such as `"1.5"` into base units
pub fn parse_amount(text: &str) -> Result<u128> {
    let invalid = |msg: &str| VaultError::InvalidRequest(msg.to_string());
    let text = text.trim();

    let (whole, frac) = match text.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (text, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("Invalid amount format"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("Invalid amount format"));
    }
    if frac.len() > DECIMALS as usize {
        return Err(invalid("Too many decimal places"));
    }

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| invalid("Amount too large"))?
    };

    let mut frac_units = 0u128;
    for (i, digit) in frac.bytes().enumerate() {
        frac_units += u128::from(digit - b'0') * 10u128.pow(DECIMALS - 1 - i as u32);
    }

    let amount = whole_units
        .checked_mul(UNIT)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(|| invalid("Amount too large"))?;

    if amount == 0 {
        return Err(invalid("Amount must be greater than zero"));
    }
    Ok(amount)
}

/// Render base units as a decimal string without trailing zeros
pub fn format_amount(units: u128) -> String {
    let whole = units / UNIT;
    let frac = units % UNIT;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = DECIMALS as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// `amount * rate_ppm / 1_000_000`, rounded down
pub fn calculate_fee(amount: u128, fee_rate_ppm: u32) -> u128 {
    let rate = u128::from(fee_rate_ppm);
    match amount.checked_mul(rate) {
        Some(product) => product / PPM,
        None => amount / PPM * rate,
    }
}
