//! YAML with enums written as single-key maps (`call: net/http.Get`)

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::with::singleton_map_recursive;

pub fn from_str<T: DeserializeOwned>(source: &str) -> Result<T, serde_yaml::Error> {
    singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_str(source))
}

pub fn to_string<T: Serialize>(value: &T) -> Result<String, serde_yaml::Error> {
    let mut out = Vec::new();
    let mut serializer = serde_yaml::Serializer::new(&mut out);
    singleton_map_recursive::serialize(value, &mut serializer)?;
    String::from_utf8(out).map_err(serde::ser::Error::custom)
}
