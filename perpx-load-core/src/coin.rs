use crate::ConfigError;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::fmt;
use std::str::FromStr;

/// An amount of a single denomination.
///
/// Amounts travel as decimal strings on the wire (`{"denom":"aperpx","amount":"1000"}`).
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    #[serde_as(as = "DisplayFromStr")]
    pub amount: u128,
}

impl Coin {
    pub fn new(amount: u128, denom: &str) -> Self {
        Self {
            denom: denom.to_string(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl FromStr for Coin {
    type Err = ConfigError;

    /// Parses the compact `<amount><denom>` form, e.g. `1000000aperpx`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| invalid_coin(s, "missing denom"))?;
        let (amount, denom) = s.split_at(split);

        if amount.is_empty() {
            return Err(invalid_coin(s, "missing amount"));
        }
        let amount = amount
            .parse::<u128>()
            .map_err(|_| invalid_coin(s, "amount out of range"))?;
        validate_denom(denom)?;

        Ok(Self {
            denom: denom.to_string(),
            amount,
        })
    }
}

fn invalid_coin(input: &str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidCoin {
        input: input.to_string(),
        reason,
    }
}

/// Denoms are 3-128 characters, start with a letter and may contain `/:._-`.
pub fn validate_denom(denom: &str) -> Result<(), ConfigError> {
    if denom.is_empty() {
        return Err(ConfigError::Empty { field: "denom" });
    }

    let mut chars = denom.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || "/:._-".contains(c));

    if !(3..=128).contains(&denom.len()) || !starts_with_letter || !valid_rest {
        return Err(ConfigError::InvalidDenom(denom.to_string()));
    }
    Ok(())
}

/// Sum of every entry of `denom` in a balance list.
pub fn amount_of(coins: &[Coin], denom: &str) -> u128 {
    coins
        .iter()
        .filter(|coin| coin.denom == denom)
        .fold(0u128, |acc, coin| acc.saturating_add(coin.amount))
}
