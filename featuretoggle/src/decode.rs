//! Decoding of untagged raw values for the generic accessor.
//!
//! A destination type chooses how it is read by implementing [`Decode`]:
//! textual types take the raw value verbatim, everything else is decoded
//! from JSON. Types without an implementation can be read through [`Json`].

use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// A destination for [`FeatureToggle::get`](crate::FeatureToggle::get).
pub trait Decode: Sized {
    fn decode(raw: &str) -> Result<Self, DecodeError>;
}

impl Decode for String {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        Ok(raw.to_string())
    }
}

impl Decode for Box<str> {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        Ok(raw.into())
    }
}

impl Decode for Arc<str> {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        Ok(raw.into())
    }
}

fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, DecodeError> {
    Ok(serde_json::from_str(raw)?)
}

macro_rules! decode_json {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Decode for $ty {
                fn decode(raw: &str) -> Result<Self, DecodeError> {
                    from_json(raw)
                }
            }
        )*
    };
}

decode_json!(
    bool,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    serde_json::Value,
);

impl<T: DeserializeOwned> Decode for Vec<T> {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        from_json(raw)
    }
}

impl<T: DeserializeOwned> Decode for VecDeque<T> {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        from_json(raw)
    }
}

impl<T, S> Decode for HashSet<T, S>
where
    T: DeserializeOwned + Eq + Hash,
    S: BuildHasher + Default,
{
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        from_json(raw)
    }
}

impl<T: DeserializeOwned + Ord> Decode for BTreeSet<T> {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        from_json(raw)
    }
}

impl<K, V, S> Decode for HashMap<K, V, S>
where
    K: DeserializeOwned + Eq + Hash,
    V: DeserializeOwned,
    S: BuildHasher + Default,
{
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        from_json(raw)
    }
}

impl<K, V> Decode for BTreeMap<K, V>
where
    K: DeserializeOwned + Ord,
    V: DeserializeOwned,
{
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        from_json(raw)
    }
}

/// Decodes any deserializable type from a JSON value.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct Limits { burst: u32 }
///
/// let Json(limits) = toggles.get("limits", Json(Limits { burst: 10 }));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> Decode for Json<T> {
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        from_json(raw).map(Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_textual_is_verbatim() {
        // Would not be valid JSON, and must not be unquoted if it were
        assert_eq!(String::decode("plain text").unwrap(), "plain text");
        assert_eq!(String::decode("\"quoted\"").unwrap(), "\"quoted\"");
        assert_eq!(&*Arc::<str>::decode(" padded ").unwrap(), " padded ");
    }

    #[test]
    fn test_generic_map_numbers_are_floats() {
        let map = HashMap::<String, serde_json::Value>::decode(r#"{"a":"x","b":2}"#).unwrap();
        assert_eq!(map["a"], serde_json::json!("x"));
        assert_eq!(map["b"].as_f64(), Some(2.0));

        let map = HashMap::<String, f64>::decode(r#"{"b":2}"#).unwrap();
        assert_eq!(map["b"], 2.0);
    }

    #[test]
    fn test_structured() {
        assert_eq!(Vec::<u32>::decode("[1, 2, 3]").unwrap(), vec![1, 2, 3]);
        assert!(bool::decode("true").unwrap());
        assert_eq!(f64::decode("2000.76").unwrap(), 2000.76);
        assert!(u8::decode("300").is_err());
        assert!(Vec::<u32>::decode("1,2,3").is_err());
    }

    #[test]
    fn test_json_wrapper() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Limits {
            burst: u32,
            regions: Vec<String>,
        }

        let Json(limits) =
            Json::<Limits>::decode(r#"{"burst": 5, "regions": ["us", "de"]}"#).unwrap();
        assert_eq!(
            limits,
            Limits {
                burst: 5,
                regions: vec!["us".into(), "de".into()],
            }
        );
        assert!(Json::<Limits>::decode(r#"{"burst": "five"}"#).is_err());
    }
}
