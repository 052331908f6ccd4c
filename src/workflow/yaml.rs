//! Serde helpers for the YAML workflow syntax.
//!
//! Workflow files lean on YAML's loose scalars: `interpreter: [3.11]` is a
//! float, `experimental: true` is a bool, and `needs: build` is a bare
//! string where a list is also allowed. The helpers below absorb those
//! shapes so the typed schema only ever sees strings, and keep `jobs:` in
//! declaration order instead of collapsing it into a `HashMap`.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// A string deserialized from any YAML scalar.
///
/// Note that unquoted floats keep their canonical rendering: `3.10` becomes
/// `"3.1"`, which is why version-like values should be quoted in YAML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScalarString(String);

impl ScalarString {
    pub(crate) fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for ScalarString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ScalarVisitor;

        impl Visitor<'_> for ScalarVisitor {
            type Value = ScalarString;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a string, number or boolean")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                Ok(ScalarString(value.to_string()))
            }

            fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
                Ok(ScalarString(value.to_string()))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                Ok(ScalarString(value.to_string()))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(ScalarString(value.to_string()))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
                Ok(ScalarString(value.to_string()))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

/// Deserializes a map whose values may be any scalar into string pairs
pub(crate) fn string_map<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: HashMap<String, ScalarString> = HashMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| (k, v.into_inner()))
        .collect())
}

/// Deserializes an optional field where an explicit null still counts as
/// present: `dispatch:` with no body declares the trigger with defaults
pub(crate) fn null_is_default<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let inner: Option<T> = Option::deserialize(deserializer)?;
    Ok(Some(inner.unwrap_or_default()))
}

/// Deserializes either a single string or a sequence of strings
pub(crate) fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrSeq;

    impl<'de> Visitor<'de> for StringOrSeq {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a string or a sequence of strings")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(vec![value.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut values = Vec::new();
            while let Some(item) = seq.next_element::<ScalarString>()? {
                values.push(item.into_inner());
            }
            Ok(values)
        }
    }

    deserializer.deserialize_any(StringOrSeq)
}

/// Serde adapter keeping a YAML map in declaration order as `Vec<(String, V)>`
pub(crate) mod ordered_map {
    use super::{fmt, MapAccess, PhantomData, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(crate) fn serialize<S, V>(entries: &[(String, V)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub(crate) fn deserialize<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = Vec<(String, V)>;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[test]
    fn test_scalar_string_accepts_any_scalar() {
        let values: Vec<ScalarString> =
            serde_yaml::from_str("[hello, 42, true, \"3.10\"]").unwrap();
        let values: Vec<String> = values.into_iter().map(ScalarString::into_inner).collect();
        assert_eq!(values, vec!["hello", "42", "true", "3.10"]);
    }

    #[test]
    fn test_string_map_coerces_scalars() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(deserialize_with = "string_map")]
            env: HashMap<String, String>,
        }

        let holder: Holder =
            serde_yaml::from_str("env:\n  RETRIES: 3\n  VERBOSE: true\n  NAME: ci\n").unwrap();
        assert_eq!(holder.env.get("RETRIES").map(String::as_str), Some("3"));
        assert_eq!(holder.env.get("VERBOSE").map(String::as_str), Some("true"));
        assert_eq!(holder.env.get("NAME").map(String::as_str), Some("ci"));
    }

    #[test]
    fn test_string_or_seq() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(deserialize_with = "string_or_seq")]
            needs: Vec<String>,
        }

        let single: Holder = serde_yaml::from_str("needs: build\n").unwrap();
        assert_eq!(single.needs, vec!["build"]);

        let many: Holder = serde_yaml::from_str("needs: [build, lint]\n").unwrap();
        assert_eq!(many.needs, vec!["build", "lint"]);
    }

    #[test]
    fn test_ordered_map_preserves_declaration_order() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            #[serde(with = "ordered_map")]
            jobs: Vec<(String, u32)>,
        }

        let holder: Holder =
            serde_yaml::from_str("jobs:\n  zeta: 1\n  alpha: 2\n  mid: 3\n").unwrap();
        let names: Vec<&str> = holder.jobs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);

        let yaml = serde_yaml::to_string(&holder).unwrap();
        assert!(yaml.find("zeta").unwrap() < yaml.find("alpha").unwrap());
    }
}
