//! Shared serde helpers for the stage model.

use serde::{de::Error, Deserialize, Deserializer};
use std::str::FromStr;

use crate::stages::ParsedStage;

/// Deserialize an enum from its wire literal through `FromStr`, so that every spelling the
/// parser accepts (any case, extra whitespace, `<>` for `!=`) is accepted on the wire too
pub(crate) fn deserialize_literal<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = String>,
{
    let literal = String::deserialize(deserializer)?;
    T::from_str(&literal).map_err(D::Error::custom)
}

/// Implement `Deserialize` for enums with a `FromStr` impl over their wire literals
macro_rules! deserialize_from_literal {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl<'de> serde::Deserialize<'de> for $ty {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: serde::Deserializer<'de>,
                {
                    $crate::serde_helpers::deserialize_literal(deserializer)
                }
            }
        )+
    };
}

pub(crate) use deserialize_from_literal;

/// Structured stages sent by the reasoning service are optional. When any of them does not
/// decode, the list is treated as absent and the stages are recovered from the SQL instead.
pub(crate) fn deserialize_lenient_stages<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<ParsedStage>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}
